//! On-disk cache of built disk images
//!
//! Disk images are cached per container image id. An entry is trusted only
//! when its validity attribute names the image id it is being requested for.
//!
//! # Layout
//!
//! ```text
//! <cache root>/<image id>/disk.raw      sparse disk, xattr user.bootc.meta
//! <run dir>/<image id>-<hash>.lock      flock guarding the directory above
//! ```
//!
//! # Entry States
//!
//! | State | Description |
//! |-------|-------------|
//! | Ready | Published, attribute matches the directory's image id |
//! | Building | Exclusive lock held by a writer |
//! | Invalid | Missing disk, missing/corrupt attribute, or digest mismatch |

pub mod entry;
pub mod lock;
pub mod meta;

pub use entry::{
    list_entries, remove_entry, CacheEntry, CacheValidity, EntryState, RemoveOutcome,
    DISK_IMAGE_NAME,
};
pub use lock::{CacheLock, LockMode};
pub use meta::DiskMeta;
