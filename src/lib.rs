//! bootdisk - bootable disk images from bootc container images
//!
//! Installs a bootc container image onto a sparse raw disk with
//! `bootc install to-disk`, and caches the result per image id so repeated
//! requests for unchanged images are free.

pub mod cache;
pub mod cli;
pub mod config;
pub mod disk;
pub mod error;
pub mod orchestration;
pub mod ui;

pub use error::{BootdiskError, BootdiskResult};
