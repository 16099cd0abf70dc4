//! Config command - show or initialize configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::BootdiskResult;
use crate::ui::{self, UiContext};

/// Execute the config command
pub async fn execute(args: ConfigArgs, config: &Config, manager: &ConfigManager) -> BootdiskResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
    }
    Ok(())
}

fn show_config(config: &Config) -> BootdiskResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    println!("# effective cache_dir = {:?}", config.cache_dir().display().to_string());
    println!("# effective run_dir = {:?}", config.run_dir().display().to_string());
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> BootdiskResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    ui::step_ok_detail(&ctx, "Configuration initialized", &path.display().to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn init_writes_defaults_and_respects_force() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bootdisk").join("config.toml");
        let manager = ConfigManager::with_path(path.clone());

        init_config(&manager, false).await.unwrap();
        assert!(path.exists());

        std::fs::write(&path, "[disk]\nfilesystem = \"ext4\"\n").unwrap();
        init_config(&manager, false).await.unwrap();
        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.disk.filesystem.as_deref(), Some("ext4"));

        init_config(&manager, true).await.unwrap();
        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.disk.filesystem, None);
    }
}
