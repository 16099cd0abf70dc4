//! Configuration management for bootdisk

pub mod schema;

pub use schema::Config;

use crate::error::{BootdiskError, BootdiskResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bootdisk")
            .join("config.toml")
    }

    /// Get the default disk cache root (`~/.cache/bootdisk`)
    pub fn default_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bootdisk")
    }

    /// Get the default runtime directory holding lock files
    ///
    /// Prefers `$XDG_RUNTIME_DIR/bootdisk`, falling back to the state dir.
    pub fn default_run_dir() -> PathBuf {
        dirs::runtime_dir()
            .or_else(dirs::state_dir)
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bootdisk")
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> BootdiskResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> BootdiskResult<Config> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            BootdiskError::io(format!("reading config from {}", path.display()), e)
        })?;

        toml::from_str(&content).map_err(|e| BootdiskError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> BootdiskResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            BootdiskError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> BootdiskResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BootdiskError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Effective disk cache root
    pub fn cache_dir(&self) -> PathBuf {
        self.paths
            .cache_dir
            .clone()
            .unwrap_or_else(ConfigManager::default_cache_dir)
    }

    /// Effective lock-file directory
    pub fn run_dir(&self) -> PathBuf {
        self.paths
            .run_dir
            .clone()
            .unwrap_or_else(ConfigManager::default_run_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.toml");
        let manager = ConfigManager::with_path(path);

        let config = manager.load().await.unwrap();
        assert_eq!(config.general.log_format, "text");
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");
        let manager = ConfigManager::with_path(path);

        let mut config = Config::default();
        config.disk.filesystem = Some("ext4".to_string());

        manager.save(&config).await.unwrap();
        let loaded = manager.load().await.unwrap();

        assert_eq!(loaded.disk.filesystem.as_deref(), Some("ext4"));
    }

    #[tokio::test]
    async fn invalid_file_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[disk\nfilesystem = ").unwrap();
        let manager = ConfigManager::with_path(path.clone());

        match manager.load().await {
            Err(BootdiskError::ConfigInvalid { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected ConfigInvalid, got {:?}", other),
        }
    }

    #[test]
    fn path_overrides_take_precedence() {
        let mut config = Config::default();
        config.paths.cache_dir = Some(PathBuf::from("/srv/disks"));
        config.paths.run_dir = Some(PathBuf::from("/run/bootdisk-test"));

        assert_eq!(config.cache_dir(), PathBuf::from("/srv/disks"));
        assert_eq!(config.run_dir(), PathBuf::from("/run/bootdisk-test"));
    }

    #[test]
    fn default_dirs_end_with_app_name() {
        assert!(ConfigManager::default_cache_dir().ends_with("bootdisk"));
        assert!(ConfigManager::default_run_dir().ends_with("bootdisk"));
    }
}
