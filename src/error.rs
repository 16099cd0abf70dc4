//! Error types for bootdisk
//!
//! All modules use `BootdiskResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for bootdisk operations
pub type BootdiskResult<T> = Result<T, BootdiskError>;

/// All errors that can occur in bootdisk
#[derive(Error, Debug)]
pub enum BootdiskError {
    // Environment errors
    #[error("Podman not found. Install it with your package manager (e.g. dnf install podman)")]
    PodmanNotFound,

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Image errors
    #[error("Image not found: {image}: {reason}")]
    ImageNotFound { image: String, reason: String },

    #[error("Ambiguous image {image}: pull returned {count} ids")]
    AmbiguousImage { image: String, count: usize },

    #[error("Image pull failed: {image}: {reason}")]
    ImagePull { image: String, reason: String },

    // Cache errors
    #[error("Disk cache for image {image_id} is busy: {path} is locked by another process")]
    CacheBusy { image_id: String, path: PathBuf },

    #[error("Failed to lock {path}: {source}")]
    CacheLock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt cache metadata: {0}")]
    CorruptMetadata(String),

    #[error("Invalid size specification {spec:?}: {reason}")]
    InvalidSizeSpec { spec: String, reason: String },

    // Install errors
    #[error("Failed to create disk image from {image}: {detail}")]
    InstallFailed {
        image: String,
        exit_code: Option<i32>,
        detail: String,
    },

    #[error("Installer {stage} failed: {reason}")]
    Installer { stage: &'static str, reason: String },

    #[error("Failed to publish disk image to {path}: {source}")]
    PublishFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Interrupted")]
    Interrupted,

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl BootdiskError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Create an installer lifecycle error
    pub fn installer(stage: &'static str, reason: impl Into<String>) -> Self {
        Self::Installer {
            stage,
            reason: reason.into(),
        }
    }

    /// Check if error is retryable by the caller
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CacheBusy { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::PodmanNotFound => Some("Install podman: sudo dnf install -y podman"),
            Self::CacheBusy { .. } => {
                Some("Another bootdisk process is building this image; retry once it finishes")
            }
            Self::InvalidSizeSpec { .. } => Some("Use a size such as 20G, 20GB or 21474836480"),
            Self::InstallFailed { .. } => {
                Some("Set BOOTC_INSTALL_LOG=debug to get installer logs")
            }
            _ => None,
        }
    }
}
