//! Inputs and outputs of a disk build

use crate::config::schema::DiskConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// User-facing disk options. Empty strings are treated as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskImageConfig {
    filesystem: Option<String>,
    root_size_max: Option<String>,
    disk_size: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl DiskImageConfig {
    /// Build from raw values
    pub fn new(
        filesystem: Option<String>,
        root_size_max: Option<String>,
        disk_size: Option<String>,
    ) -> Self {
        Self {
            filesystem: non_empty(filesystem),
            root_size_max: non_empty(root_size_max),
            disk_size: non_empty(disk_size),
        }
    }

    /// Defaults from the `[disk]` config section
    pub fn from_config(config: &DiskConfig) -> Self {
        Self::new(
            config.filesystem.clone(),
            config.root_size_max.clone(),
            config.disk_size.clone(),
        )
    }

    /// Replace values with any non-empty overrides
    pub fn with_overrides(
        self,
        filesystem: Option<String>,
        root_size_max: Option<String>,
        disk_size: Option<String>,
    ) -> Self {
        Self {
            filesystem: non_empty(filesystem).or(self.filesystem),
            root_size_max: non_empty(root_size_max).or(self.root_size_max),
            disk_size: non_empty(disk_size).or(self.disk_size),
        }
    }

    /// Root filesystem type
    pub fn filesystem(&self) -> Option<&str> {
        self.filesystem.as_deref()
    }

    /// Maximum root partition size
    pub fn root_size_max(&self) -> Option<&str> {
        self.root_size_max.as_deref()
    }

    /// Requested minimum disk size
    pub fn disk_size(&self) -> Option<&str> {
        self.disk_size.as_deref()
    }
}

/// A resolved container image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDescriptor {
    /// Content digest identifying the image
    pub id: String,
    /// Display tag
    pub repo_tag: String,
    /// Size reported by the image store, in bytes
    pub declared_size: u64,
}

/// A published disk image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskDescriptor {
    /// Per-image cache directory
    pub directory: PathBuf,
    /// Path of the disk image file
    pub disk_path: PathBuf,
    /// Image id the disk was installed from
    pub image_id: String,
    /// Repository tag of the image
    pub repo_tag: String,
    /// Virtual size of the disk in bytes; actual usage may be lower
    pub size: u64,
    /// When this build session started
    pub created_at: DateTime<Utc>,
    /// Whether an existing disk was reused
    pub reused: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_strings_are_unset() {
        let config = DiskImageConfig::new(
            Some(String::new()),
            Some("  ".to_string()),
            Some("20GB".to_string()),
        );
        assert_eq!(config.filesystem(), None);
        assert_eq!(config.root_size_max(), None);
        assert_eq!(config.disk_size(), Some("20GB"));
    }

    #[test]
    fn overrides_replace_config_defaults() {
        let defaults = DiskConfig {
            filesystem: Some("xfs".to_string()),
            root_size_max: Some("8G".to_string()),
            disk_size: None,
        };

        let config = DiskImageConfig::from_config(&defaults).with_overrides(
            Some("ext4".to_string()),
            Some(String::new()),
            Some("30GB".to_string()),
        );

        assert_eq!(config.filesystem(), Some("ext4"));
        assert_eq!(config.root_size_max(), Some("8G"));
        assert_eq!(config.disk_size(), Some("30GB"));
    }
}
