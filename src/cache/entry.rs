//! Cached disk entries
//!
//! One directory per image id under the cache root, holding `disk.raw`
//! stamped with the validity attribute.

use crate::cache::lock::{CacheLock, LockMode};
use crate::cache::meta;
use crate::error::{BootdiskError, BootdiskResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of the disk image inside each per-image directory
pub const DISK_IMAGE_NAME: &str = "disk.raw";

/// Outcome of checking a cached disk against an image digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheValidity {
    /// No disk at the canonical path
    Missing,
    /// Disk exists and its attribute names the expected digest
    Valid,
    /// Disk exists but cannot be trusted for the expected digest
    Stale(String),
}

/// Check the disk at `disk_path` against `expected_digest`.
///
/// Only the metadata attribute is consulted; size and timestamps are ignored.
pub fn check(disk_path: &Path, expected_digest: &str) -> BootdiskResult<CacheValidity> {
    let file = match File::open(disk_path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No existing disk image found");
            return Ok(CacheValidity::Missing);
        }
        Err(e) => {
            return Err(BootdiskError::io(
                format!("opening {}", disk_path.display()),
                e,
            ))
        }
    };

    debug!("Found existing disk image, comparing digest");
    match meta::read_digest(&file) {
        Ok(Some(digest)) if digest == expected_digest => Ok(CacheValidity::Valid),
        Ok(Some(digest)) => {
            debug!(
                "previous disk digest: {} current digest: {}",
                digest, expected_digest
            );
            Ok(CacheValidity::Stale(format!("built from {}", digest)))
        }
        Ok(None) => {
            debug!(
                "No {} xattr found on {}",
                meta::IMAGE_META_XATTR.to_string_lossy(),
                disk_path.display()
            );
            Ok(CacheValidity::Stale("no metadata attribute".to_string()))
        }
        Err(BootdiskError::CorruptMetadata(reason)) => {
            warn!(
                "Failed to parse serialized meta from {}: {}",
                disk_path.display(),
                reason
            );
            Ok(CacheValidity::Stale(reason))
        }
        Err(e) => Err(e),
    }
}

/// Remove a disk file, treating an already-missing file as success
pub fn remove_disk(disk_path: &Path) -> BootdiskResult<()> {
    match fs::remove_file(disk_path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BootdiskError::io(
            format!("removing stale disk {}", disk_path.display()),
            e,
        )),
    }
}

/// State of a cache entry as seen by `cache list`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    /// Disk published with a matching validity attribute
    Ready,
    /// A writer currently holds the lock
    Building,
    /// No disk, or the disk cannot be trusted
    Invalid,
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::Building => write!(f, "building"),
            Self::Invalid => write!(f, "invalid"),
        }
    }
}

/// A per-image cache directory found on disk
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry {
    /// Image id (the directory name)
    pub image_id: String,
    /// Per-image directory
    pub directory: PathBuf,
    /// Virtual size of the disk image, if present
    pub size_bytes: Option<u64>,
    /// Last modification of the disk image, if present
    pub modified_at: Option<DateTime<Utc>>,
    /// Validity as of listing
    pub state: EntryState,
}

impl CacheEntry {
    /// Canonical disk path inside this entry
    pub fn disk_path(&self) -> PathBuf {
        self.directory.join(DISK_IMAGE_NAME)
    }

    /// Inspect a single per-image directory.
    ///
    /// Takes a shared lock for the duration of the check; if a writer holds
    /// the directory the entry is reported as building without reading it.
    pub fn inspect(run_dir: &Path, directory: &Path) -> BootdiskResult<Self> {
        let image_id = directory
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let disk_path = directory.join(DISK_IMAGE_NAME);

        let mut lock = CacheLock::new(run_dir, directory);
        if !lock.try_lock(LockMode::Shared)? {
            return Ok(Self {
                image_id,
                directory: directory.to_path_buf(),
                size_bytes: None,
                modified_at: None,
                state: EntryState::Building,
            });
        }

        let (size_bytes, modified_at) = match fs::metadata(&disk_path) {
            Ok(m) => (
                Some(m.len()),
                m.modified().ok().map(DateTime::<Utc>::from),
            ),
            Err(_) => (None, None),
        };

        let state = match check(&disk_path, &image_id)? {
            CacheValidity::Valid => EntryState::Ready,
            CacheValidity::Missing | CacheValidity::Stale(_) => EntryState::Invalid,
        };

        if let Err(e) = lock.unlock() {
            warn!("unable to unlock {}: {}", directory.display(), e);
        }

        Ok(Self {
            image_id,
            directory: directory.to_path_buf(),
            size_bytes,
            modified_at,
            state,
        })
    }
}

/// List every per-image directory under `cache_root`, sorted by image id
pub fn list_entries(cache_root: &Path, run_dir: &Path) -> BootdiskResult<Vec<CacheEntry>> {
    let read_dir = match fs::read_dir(cache_root) {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => {
            return Err(BootdiskError::io(
                format!("reading cache directory {}", cache_root.display()),
                e,
            ))
        }
    };

    let mut entries = Vec::new();
    for dirent in read_dir {
        let dirent = dirent.map_err(|e| BootdiskError::io("reading cache entry", e))?;
        let path = dirent.path();
        if path.is_dir() {
            entries.push(CacheEntry::inspect(run_dir, &path)?);
        }
    }

    entries.sort_by(|a, b| a.image_id.cmp(&b.image_id));
    Ok(entries)
}

/// Result of trying to remove an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Directory and its contents were deleted
    Removed,
    /// Another process holds the lock; nothing was touched
    Busy,
    /// No such entry
    NotFound,
}

/// Delete a per-image directory under an exclusive lock
pub fn remove_entry(run_dir: &Path, directory: &Path) -> BootdiskResult<RemoveOutcome> {
    if !directory.exists() {
        return Ok(RemoveOutcome::NotFound);
    }

    let mut lock = CacheLock::new(run_dir, directory);
    if !lock.try_lock(LockMode::Exclusive)? {
        return Ok(RemoveOutcome::Busy);
    }

    let result = fs::remove_dir_all(directory)
        .map_err(|e| BootdiskError::io(format!("removing {}", directory.display()), e));

    if let Err(e) = lock.unlock() {
        warn!("unable to unlock {}: {}", directory.display(), e);
    }

    result.map(|()| RemoveOutcome::Removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::meta::{write_digest, write_raw, xattrs_supported};
    use tempfile::TempDir;

    fn make_disk(dir: &Path, image_id: &str, digest: Option<&str>) -> PathBuf {
        let entry_dir = dir.join(image_id);
        fs::create_dir_all(&entry_dir).unwrap();
        let disk = entry_dir.join(DISK_IMAGE_NAME);
        let file = File::create(&disk).unwrap();
        file.set_len(1 << 20).unwrap();
        if let Some(digest) = digest {
            write_digest(&file, digest).unwrap();
        }
        disk
    }

    #[test]
    fn missing_disk() {
        let dir = TempDir::new().unwrap();
        let validity = check(&dir.path().join(DISK_IMAGE_NAME), "abc").unwrap();
        assert_eq!(validity, CacheValidity::Missing);
    }

    #[test]
    fn matching_digest_is_valid() {
        let dir = TempDir::new().unwrap();
        if !xattrs_supported(dir.path()) {
            eprintln!("skipping: user xattrs unsupported on this filesystem");
            return;
        }
        let disk = make_disk(dir.path(), "abc", Some("abc"));
        assert_eq!(check(&disk, "abc").unwrap(), CacheValidity::Valid);
    }

    #[test]
    fn mismatched_digest_is_stale() {
        let dir = TempDir::new().unwrap();
        if !xattrs_supported(dir.path()) {
            eprintln!("skipping: user xattrs unsupported on this filesystem");
            return;
        }
        let disk = make_disk(dir.path(), "abc", Some("old"));
        assert!(matches!(check(&disk, "abc").unwrap(), CacheValidity::Stale(_)));
    }

    #[test]
    fn unstamped_or_corrupt_disk_is_stale() {
        let dir = TempDir::new().unwrap();
        if !xattrs_supported(dir.path()) {
            eprintln!("skipping: user xattrs unsupported on this filesystem");
            return;
        }
        let bare = make_disk(dir.path(), "bare", None);
        assert!(matches!(check(&bare, "bare").unwrap(), CacheValidity::Stale(_)));

        let corrupt = make_disk(dir.path(), "corrupt", None);
        let file = File::options().write(true).open(&corrupt).unwrap();
        write_raw(&file, b"][").unwrap();
        assert!(matches!(
            check(&corrupt, "corrupt").unwrap(),
            CacheValidity::Stale(_)
        ));
    }

    #[test]
    fn remove_disk_tolerates_missing() {
        let dir = TempDir::new().unwrap();
        remove_disk(&dir.path().join("nope.raw")).unwrap();
    }

    #[test]
    fn list_reports_states() {
        let dir = TempDir::new().unwrap();
        if !xattrs_supported(dir.path()) {
            eprintln!("skipping: user xattrs unsupported on this filesystem");
            return;
        }
        let cache_root = dir.path().join("cache");
        let run_dir = dir.path().join("run");
        make_disk(&cache_root, "aaa", Some("aaa"));
        make_disk(&cache_root, "bbb", Some("other"));
        fs::create_dir_all(cache_root.join("ccc")).unwrap();

        let mut writer = CacheLock::new(&run_dir, &cache_root.join("ccc"));
        assert!(writer.try_lock(LockMode::Exclusive).unwrap());

        let entries = list_entries(&cache_root, &run_dir).unwrap();
        let states: Vec<_> = entries
            .iter()
            .map(|e| (e.image_id.as_str(), e.state))
            .collect();

        assert_eq!(
            states,
            vec![
                ("aaa", EntryState::Ready),
                ("bbb", EntryState::Invalid),
                ("ccc", EntryState::Building),
            ]
        );
        assert_eq!(entries[0].size_bytes, Some(1 << 20));
    }

    #[test]
    fn list_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let entries = list_entries(&dir.path().join("none"), dir.path()).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn remove_respects_lock() {
        let dir = TempDir::new().unwrap();
        let run_dir = dir.path().join("run");
        let entry_dir = dir.path().join("cache").join("abc");
        fs::create_dir_all(&entry_dir).unwrap();

        let mut writer = CacheLock::new(&run_dir, &entry_dir);
        assert!(writer.try_lock(LockMode::Exclusive).unwrap());
        assert_eq!(
            remove_entry(&run_dir, &entry_dir).unwrap(),
            RemoveOutcome::Busy
        );
        assert!(entry_dir.exists());

        writer.unlock().unwrap();
        assert_eq!(
            remove_entry(&run_dir, &entry_dir).unwrap(),
            RemoveOutcome::Removed
        );
        assert!(!entry_dir.exists());
        assert_eq!(
            remove_entry(&run_dir, &entry_dir).unwrap(),
            RemoveOutcome::NotFound
        );
    }
}
