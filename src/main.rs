//! bootdisk CLI entry point

use bootdisk::cli::{Cli, Commands};
use bootdisk::config::ConfigManager;
use bootdisk::error::BootdiskResult;
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8, json: bool) {
    // 0 = warn, 1 = info, 2+ = debug
    let filter = match verbose {
        0 => EnvFilter::new("bootdisk=warn"),
        1 => EnvFilter::new("bootdisk=info"),
        _ => EnvFilter::new("bootdisk=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}

async fn run() -> BootdiskResult<()> {
    let cli = Cli::parse();

    // Completions need neither config nor logging
    if let Commands::Completions { shell } = cli.command {
        bootdisk::cli::commands::completions(shell);
        return Ok(());
    }

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, config.general.log_format == "json");
    debug!("Loaded configuration from {}", config_manager.path().display());

    match cli.command {
        Commands::Install(args) => bootdisk::cli::commands::install(args, &config).await,
        Commands::Cache(args) => bootdisk::cli::commands::cache(args, &config).await,
        Commands::Config(args) => {
            bootdisk::cli::commands::config(args, &config, &config_manager).await
        }
        Commands::Completions { .. } => Ok(()),
    }
}
