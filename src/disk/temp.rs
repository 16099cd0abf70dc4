//! Temporary disk file used while a build is in flight
//!
//! The file is created next to its final location so that publishing is a
//! same-filesystem rename. It is deleted on drop unless it has been
//! published.

use crate::error::{BootdiskError, BootdiskResult};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Prefix of in-progress disk files inside a cache directory
pub const TEMP_DISK_PREFIX: &str = "bootdisk-tempdisk-";

/// Uniquely named, exclusively owned disk file that removes itself on drop
#[derive(Debug)]
pub struct TempDisk {
    path: PathBuf,
    file: File,
    keep: bool,
}

impl TempDisk {
    /// Create a new empty file with a unique name inside `dir`
    pub fn create(dir: &Path) -> BootdiskResult<Self> {
        let path = dir.join(format!("{}{}", TEMP_DISK_PREFIX, Uuid::new_v4().simple()));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| BootdiskError::io(format!("creating {}", path.display()), e))?;

        Ok(Self {
            path,
            file,
            keep: false,
        })
    }

    /// Set the logical size without allocating blocks
    pub fn allocate(&self, size: u64) -> BootdiskResult<()> {
        self.file
            .set_len(size)
            .map_err(|e| BootdiskError::io(format!("truncating {}", self.path.display()), e))?;
        debug!("Created {} with size {}", self.path.display(), size);
        Ok(())
    }

    /// Path of the temporary file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name, as seen from inside the installer's output mount
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Open handle to the file
    pub fn file(&self) -> &File {
        &self.file
    }

    /// Atomically rename the file to `target`.
    ///
    /// On failure the temporary file is still owned and removed on drop.
    pub fn persist(mut self, target: &Path) -> BootdiskResult<()> {
        fs::rename(&self.path, target).map_err(|e| BootdiskError::PublishFailed {
            path: target.to_path_buf(),
            source: e,
        })?;
        self.keep = true;
        Ok(())
    }
}

impl Drop for TempDisk {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove {}: {}", self.path.display(), e);
            }
        } else {
            debug!("Removed {}", self.path.display());
        }
    }
}
