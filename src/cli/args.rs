//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// bootdisk - turn bootc container images into cached bootable disk images
#[derive(Parser, Debug)]
#[command(name = "bootdisk")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "BOOTDISK_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build (or reuse) the disk image for a bootc container image
    Install(InstallArgs),

    /// Inspect and prune cached disk images
    Cache(CacheArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),

    /// Print shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

/// Arguments for the install command
#[derive(Parser, Debug)]
pub struct InstallArgs {
    /// Container image name or id
    pub image: String,

    /// Root filesystem type (e.g. xfs, ext4)
    #[arg(long)]
    pub filesystem: Option<String>,

    /// Maximum size of the root partition (e.g. 10G)
    #[arg(long)]
    pub root_size_max: Option<String>,

    /// Minimum disk size (e.g. 20GB); the disk is never smaller than policy
    #[arg(long)]
    pub disk_size: Option<String>,

    /// Do not stream installer output
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format for the resulting disk
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write the default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached disk images
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove cached disk images
    #[command(group(clap::ArgGroup::new("target").required(true).args(["image_ids", "all"])))]
    Rm {
        /// Image ids of the entries to remove
        image_ids: Vec<String>,

        /// Remove every entry
        #[arg(long)]
        all: bool,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn cli_parses_install() {
        let cli = Cli::parse_from([
            "bootdisk",
            "install",
            "quay.io/fedora/fedora-bootc:41",
            "--filesystem",
            "xfs",
            "--disk-size",
            "20GB",
            "-q",
        ]);
        match cli.command {
            Commands::Install(args) => {
                assert_eq!(args.image, "quay.io/fedora/fedora-bootc:41");
                assert_eq!(args.filesystem.as_deref(), Some("xfs"));
                assert_eq!(args.disk_size.as_deref(), Some("20GB"));
                assert!(args.root_size_max.is_none());
                assert!(args.quiet);
                assert_eq!(args.format, OutputFormat::Table);
            }
            _ => panic!("expected Install command"),
        }
    }

    #[test]
    fn cli_install_requires_image() {
        assert!(Cli::try_parse_from(["bootdisk", "install"]).is_err());
    }

    #[test]
    fn cli_parses_cache_list_json() {
        let cli = Cli::parse_from(["bootdisk", "cache", "list", "--format", "json"]);
        match cli.command {
            Commands::Cache(CacheArgs {
                action: CacheAction::List { format },
            }) => assert_eq!(format, OutputFormat::Json),
            _ => panic!("expected cache list"),
        }
    }

    #[test]
    fn cli_cache_rm_needs_target() {
        assert!(Cli::try_parse_from(["bootdisk", "cache", "rm"]).is_err());
        assert!(Cli::try_parse_from(["bootdisk", "cache", "rm", "--all", "abc"]).is_err());

        let cli = Cli::parse_from(["bootdisk", "cache", "rm", "abc", "def", "-y"]);
        match cli.command {
            Commands::Cache(CacheArgs {
                action: CacheAction::Rm {
                    image_ids,
                    all,
                    yes,
                },
            }) => {
                assert_eq!(image_ids, vec!["abc", "def"]);
                assert!(!all);
                assert!(yes);
            }
            _ => panic!("expected cache rm"),
        }
    }

    #[test]
    fn cli_parses_config_init_force() {
        let cli = Cli::parse_from(["bootdisk", "config", "init", "--force"]);
        match cli.command {
            Commands::Config(ConfigArgs {
                action: Some(ConfigAction::Init { force }),
            }) => assert!(force),
            _ => panic!("expected config init"),
        }
    }

    #[test]
    fn cli_verbose_is_global() {
        let cli = Cli::parse_from(["bootdisk", "cache", "list", "-vv"]);
        assert_eq!(cli.verbose, 2);
    }
}
