//! Installer orchestration
//!
//! Resolves images and runs the bootc installer container:
//! - [`runtime`]: traits the disk manager drives
//! - [`podman`]: Podman CLI implementation
//! - [`install`]: installer container specification
//! - [`shim`]: command wrappers mounted into the installer

pub mod install;
pub mod podman;
pub mod runtime;
pub mod shim;

pub use install::{InstallSpec, Mount};
pub use podman::PodmanRuntime;
pub use runtime::{ImageInspect, ImageResolver, InstallerRuntime};
pub use shim::{CommandShim, ShimFile};
