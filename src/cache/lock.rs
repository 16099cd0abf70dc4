//! Advisory cross-process locking for cache directories
//!
//! Each cache directory gets a lock file under the runtime directory, named
//! after a hash of the cache directory path. Keeping the lock outside the
//! cache directory means it survives the directory being deleted and
//! recreated. Locks are `flock(2)` based and released when the holding
//! process exits.

use crate::error::{BootdiskError, BootdiskResult};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lock acquisition mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Readers; any number may hold the lock together
    Shared,
    /// Writer; excludes every other holder
    Exclusive,
}

impl LockMode {
    fn flock_op(self) -> libc::c_int {
        match self {
            Self::Shared => libc::LOCK_SH,
            Self::Exclusive => libc::LOCK_EX,
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared => write!(f, "shared"),
            Self::Exclusive => write!(f, "exclusive"),
        }
    }
}

/// Lock file name for a cache directory: `<dir name>-<first 12 hex chars of sha256(path)>.lock`
fn lock_file_name(cache_dir: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(cache_dir.as_os_str().as_encoded_bytes());
    let hash = hex::encode(&hasher.finalize()[..6]);

    let stem = cache_dir
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "root".to_string());

    format!("{}-{}.lock", stem, hash)
}

/// Advisory lock scoped to one cache directory
#[derive(Debug)]
pub struct CacheLock {
    lock_path: PathBuf,
    cache_dir: PathBuf,
    held: Option<(File, LockMode)>,
}

impl CacheLock {
    /// Create a lock handle for `cache_dir` whose lock file lives in `run_dir`.
    ///
    /// Nothing is touched on disk until [`CacheLock::try_lock`] is called.
    pub fn new(run_dir: &Path, cache_dir: &Path) -> Self {
        Self {
            lock_path: run_dir.join(lock_file_name(cache_dir)),
            cache_dir: cache_dir.to_path_buf(),
            held: None,
        }
    }

    /// Make a single non-blocking attempt to take the lock.
    ///
    /// Returns `Ok(false)` when another holder conflicts with `mode`. Retrying
    /// is left to the caller.
    pub fn try_lock(&mut self, mode: LockMode) -> BootdiskResult<bool> {
        if let Some((_, held_mode)) = &self.held {
            return Err(BootdiskError::Internal(format!(
                "lock on {} already held ({})",
                self.cache_dir.display(),
                held_mode
            )));
        }

        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent).map_err(|e| BootdiskError::CacheLock {
                path: self.lock_path.clone(),
                source: e,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|e| BootdiskError::CacheLock {
                path: self.lock_path.clone(),
                source: e,
            })?;

        let ret = unsafe { libc::flock(file.as_raw_fd(), mode.flock_op() | libc::LOCK_NB) };
        if ret != 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::WouldBlock {
                debug!("{} lock on {} is held elsewhere", mode, self.cache_dir.display());
                return Ok(false);
            }
            return Err(BootdiskError::CacheLock {
                path: self.lock_path.clone(),
                source: err,
            });
        }

        debug!("Acquired {} lock on {}", mode, self.cache_dir.display());
        self.held = Some((file, mode));
        Ok(true)
    }

    /// Release the lock. Calling this when nothing is held is a no-op.
    pub fn unlock(&mut self) -> BootdiskResult<()> {
        let Some((file, mode)) = self.held.take() else {
            return Ok(());
        };

        let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
        if ret != 0 {
            return Err(BootdiskError::CacheLock {
                path: self.lock_path.clone(),
                source: std::io::Error::last_os_error(),
            });
        }

        debug!("Released {} lock on {}", mode, self.cache_dir.display());
        Ok(())
    }

    /// Mode currently held, if any
    pub fn mode(&self) -> Option<LockMode> {
        self.held.as_ref().map(|(_, mode)| *mode)
    }

    /// Path of the backing lock file
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Cache directory this lock guards
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}
