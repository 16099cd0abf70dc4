//! Disk image construction
//!
//! - [`manager`]: build state machine producing cached disks
//! - [`size`]: disk sizing policy
//! - [`temp`]: in-flight disk file
//! - [`descriptor`]: build inputs and outputs

pub mod descriptor;
pub mod manager;
pub mod size;
pub mod temp;

pub use descriptor::{DiskDescriptor, DiskImageConfig, ImageDescriptor};
pub use manager::{BuildState, DiskManager};
pub use size::{disk_size_for, format_bytes, parse_size};
pub use temp::TempDisk;
