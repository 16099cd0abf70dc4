//! Configuration schema for bootdisk
//!
//! Configuration is stored at `~/.config/bootdisk/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache and runtime directory overrides
    pub paths: PathsConfig,

    /// Default disk image settings
    pub disk: DiskConfig,

    /// Installer container settings
    pub installer: InstallerConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Directory overrides. Unset entries fall back to XDG locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of the per-image disk cache
    pub cache_dir: Option<PathBuf>,

    /// Directory holding lock files
    pub run_dir: Option<PathBuf>,
}

/// Defaults applied to every disk build unless overridden on the command line
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskConfig {
    /// Root filesystem type (e.g. "xfs", "ext4")
    pub filesystem: Option<String>,

    /// Maximum root partition size (passed to `bootc install --root-size`)
    pub root_size_max: Option<String>,

    /// Minimum total disk size, human readable (e.g. "20GB")
    pub disk_size: Option<String>,
}

/// Installer container configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    /// Host container storage bind-mounted into the installer
    pub container_storage: PathBuf,

    /// Replace losetup inside the installer with a wrapper that drops --direct-io
    pub losetup_shim: bool,

    /// Host environment variable forwarded as RUST_LOG to the installer
    pub log_env: String,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            container_storage: PathBuf::from("/var/lib/containers"),
            losetup_shim: true,
            log_env: "BOOTC_INSTALL_LOG".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[installer]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.general.log_format, "text");
        assert!(config.installer.losetup_shim);
        assert!(config.disk.disk_size.is_none());
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [disk]
            filesystem = "xfs"
            disk_size = "40GB"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.disk.filesystem.as_deref(), Some("xfs"));
        assert_eq!(config.disk.disk_size.as_deref(), Some("40GB"));
        assert_eq!(
            config.installer.container_storage,
            PathBuf::from("/var/lib/containers")
        ); // default preserved
    }
}
