//! Cache command - list and remove cached disk images

use crate::cache::{list_entries, remove_entry, CacheEntry, EntryState, RemoveOutcome};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::Config;
use crate::disk::format_bytes;
use crate::error::{BootdiskError, BootdiskResult};
use crate::ui::{self, UiContext};
use console::style;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> BootdiskResult<()> {
    let cache_root = config.cache_dir();
    let run_dir = config.run_dir();
    debug!(
        "Cache root {}, lock dir {}",
        cache_root.display(),
        run_dir.display()
    );

    match args.action {
        CacheAction::List { format } => list(&cache_root, &run_dir, format),
        CacheAction::Rm {
            image_ids,
            all,
            yes,
        } => remove(&cache_root, &run_dir, image_ids, all, yes).await,
    }
}

fn list(cache_root: &Path, run_dir: &Path, format: OutputFormat) -> BootdiskResult<()> {
    let entries = list_entries(cache_root, run_dir)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Table if entries.is_empty() => println!("No cached disk images."),
        OutputFormat::Table => print_table(&entries),
    }
    Ok(())
}

fn print_table(entries: &[CacheEntry]) {
    println!(
        "{:<20} {:<10} {:>10} {:<17}",
        "IMAGE ID", "STATE", "SIZE", "MODIFIED"
    );
    println!("{}", "-".repeat(60));

    for entry in entries {
        let state = match entry.state {
            EntryState::Ready => style("ready").green().to_string(),
            EntryState::Building => style("building").yellow().to_string(),
            EntryState::Invalid => style("invalid").dim().to_string(),
        };
        let size = entry
            .size_bytes
            .map(format_bytes)
            .unwrap_or_else(|| "-".to_string());
        let modified = entry
            .modified_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<20} {:<10} {:>10} {:<17}",
            truncate_id(&entry.image_id),
            state,
            size,
            modified
        );
    }

    println!();
    println!("Total: {} entr{}", entries.len(), if entries.len() == 1 { "y" } else { "ies" });
}

fn truncate_id(id: &str) -> &str {
    id.char_indices().nth(20).map_or(id, |(i, _)| &id[..i])
}

/// Resolve `ids` to cache directories. Prefixes are accepted when unambiguous.
fn resolve_targets(cache_root: &Path, run_dir: &Path, ids: &[String]) -> BootdiskResult<Vec<PathBuf>> {
    let entries = list_entries(cache_root, run_dir)?;
    let mut targets = Vec::new();

    for id in ids {
        let matches: Vec<&CacheEntry> = entries
            .iter()
            .filter(|e| e.image_id.starts_with(id.as_str()))
            .collect();
        match matches.as_slice() {
            [entry] => targets.push(entry.directory.clone()),
            [] => return Err(BootdiskError::User(format!("No cached disk for {}", id))),
            _ => {
                return Err(BootdiskError::User(format!(
                    "{} matches {} cached disks; use a longer id",
                    id,
                    matches.len()
                )))
            }
        }
    }

    targets.sort();
    targets.dedup();
    Ok(targets)
}

async fn remove(
    cache_root: &Path,
    run_dir: &Path,
    image_ids: Vec<String>,
    all: bool,
    yes: bool,
) -> BootdiskResult<()> {
    let ctx = UiContext::detect().with_auto_yes(yes);

    let targets = if all {
        list_entries(cache_root, run_dir)?
            .into_iter()
            .map(|e| e.directory)
            .collect()
    } else {
        resolve_targets(cache_root, run_dir, &image_ids)?
    };

    if targets.is_empty() {
        println!("No cached disk images.");
        return Ok(());
    }

    let prompt = format!("Remove {} cached disk image(s)?", targets.len());
    if !ui::confirm(&ctx, &prompt, false).await? {
        println!("Aborted.");
        return Ok(());
    }

    let mut busy = 0;
    let mut failed = 0;
    for dir in &targets {
        let name = dir
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        match remove_entry(run_dir, dir) {
            Ok(RemoveOutcome::Removed) => ui::step_ok_detail(&ctx, "Removed", &name),
            Ok(RemoveOutcome::NotFound) => debug!("{} already gone", dir.display()),
            Err(e) => {
                failed += 1;
                ui::step_error_detail(&ctx, &format!("Failed to remove {}", name), &e.to_string());
            }
            Ok(RemoveOutcome::Busy) => {
                busy += 1;
                ui::step_warn_hint(
                    &ctx,
                    &format!("Skipped {}", name),
                    "a build is in progress",
                );
            }
        }
    }

    if busy > 0 {
        ui::step_info(&ctx, &format!("{} entr(ies) busy; retry later", busy));
    }
    if failed > 0 {
        return Err(BootdiskError::User(format!(
            "{} cached disk(s) could not be removed",
            failed
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn seed(root: &Path, ids: &[&str]) {
        for id in ids {
            fs::create_dir_all(root.join(id)).unwrap();
        }
    }

    #[test]
    fn targets_accept_unique_prefix() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("cache");
        let run = dir.path().join("run");
        seed(&root, &["abc123", "abd456", "ffff00"]);

        let targets = resolve_targets(&root, &run, &["ff".to_string(), "abc".to_string()]).unwrap();
        assert_eq!(targets, vec![root.join("abc123"), root.join("ffff00")]);
    }

    #[test]
    fn targets_reject_ambiguous_and_unknown() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("cache");
        let run = dir.path().join("run");
        seed(&root, &["abc123", "abd456"]);

        assert!(matches!(
            resolve_targets(&root, &run, &["ab".to_string()]),
            Err(BootdiskError::User(_))
        ));
        assert!(matches!(
            resolve_targets(&root, &run, &["zz".to_string()]),
            Err(BootdiskError::User(_))
        ));
    }

    #[tokio::test]
    async fn remove_all_with_yes() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("cache");
        let run = dir.path().join("run");
        seed(&root, &["abc123", "def456"]);

        remove(&root, &run, vec![], true, true).await.unwrap();

        assert!(fs::read_dir(&root).unwrap().next().is_none());
    }

    #[test]
    fn long_ids_are_truncated() {
        assert_eq!(truncate_id("short"), "short");
        assert_eq!(truncate_id(&"a".repeat(64)).len(), 20);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_id("aéééééééééé"), "aéééééééééé");
        let long = "é".repeat(25);
        assert_eq!(truncate_id(&long).chars().count(), 20);
    }
}
