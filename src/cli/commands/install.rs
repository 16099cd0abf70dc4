//! Install command - build or reuse the disk image for a container image

use crate::cli::args::{InstallArgs, OutputFormat};
use crate::config::Config;
use crate::disk::{format_bytes, DiskDescriptor, DiskImageConfig, DiskManager};
use crate::error::{BootdiskError, BootdiskResult};
use crate::orchestration::PodmanRuntime;
use crate::ui::{self, InstallProgress, UiContext};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Execute the install command
pub async fn execute(args: InstallArgs, config: &Config) -> BootdiskResult<()> {
    let ctx = UiContext::detect().with_quiet(args.quiet);

    let podman = Arc::new(PodmanRuntime::new());
    podman.ensure_ready().await?;

    let disk_config = DiskImageConfig::from_config(&config.disk).with_overrides(
        args.filesystem,
        args.root_size_max,
        args.disk_size,
    );

    let progress = Arc::new(Mutex::new(InstallProgress::new(&ctx, &args.image)));
    let observer = Arc::clone(&progress);

    let mut manager = DiskManager::new(
        args.image.as_str(),
        config.cache_dir(),
        config.run_dir(),
        podman.clone(),
        podman,
        config.installer.clone(),
    )
    .with_observer(move |state, image| {
        if let Ok(mut progress) = observer.lock() {
            progress.on_state(state, image);
        }
    });

    let result = tokio::select! {
        result = manager.install(&disk_config, args.quiet) => result,
        _ = tokio::signal::ctrl_c() => Err(BootdiskError::Interrupted),
    };

    if let Ok(mut progress) = progress.lock() {
        progress.finish();
    }

    let disk = match result {
        Ok(disk) => disk,
        Err(e) => {
            debug!("Install ended in state {}, cleaning up", manager.state());
            if let Err(cleanup_err) = manager.cleanup().await {
                warn!("Cleanup failed: {}", cleanup_err);
            }
            return Err(e);
        }
    };

    match args.format {
        OutputFormat::Table => print_disk(&ctx, &disk),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&disk)?),
    }

    Ok(())
}

fn print_disk(ctx: &UiContext, disk: &DiskDescriptor) {
    let headline = if disk.reused {
        "Disk image up to date"
    } else {
        "Disk image created"
    };
    ui::step_ok(ctx, headline);
    ui::key_value(ctx, "image", &disk.repo_tag);
    ui::key_value(ctx, "id", &disk.image_id);
    ui::key_value(ctx, "disk", &disk.disk_path.display().to_string());
    ui::key_value(ctx, "size", &format_bytes(disk.size));
    ui::key_value(ctx, "created", &disk.created_at.format("%Y-%m-%d %H:%M:%S").to_string());

    // Quiet still prints the path so scripts can consume it
    if ctx.is_quiet() {
        println!("{}", disk.disk_path.display());
    }
}
