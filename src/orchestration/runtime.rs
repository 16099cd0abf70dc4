//! Container runtime abstraction
//!
//! The disk manager only talks to images and the installer through these
//! traits, so builds can be driven by Podman in production and by an
//! in-memory fake in tests.

use crate::error::BootdiskResult;
use crate::orchestration::install::InstallSpec;
use async_trait::async_trait;

/// Image metadata returned by [`ImageResolver::inspect`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInspect {
    /// Image id
    pub id: String,
    /// Repository tags, most specific first
    pub repo_tags: Vec<String>,
    /// Image size in bytes
    pub size: u64,
}

/// Fetches and describes container images
#[async_trait]
pub trait ImageResolver: Send + Sync {
    /// Pull the image if missing, returning the resolved image ids
    async fn pull(&self, image: &str) -> BootdiskResult<Vec<String>>;

    /// Inspect a local image
    async fn inspect(&self, image: &str) -> BootdiskResult<ImageInspect>;
}

/// Runs the installer container
///
/// Lifecycle: `create` → `start` → (`attach`) → `wait` → `remove`.
/// `attach` only forwards output; it may be abandoned at any point without
/// affecting `wait`.
#[async_trait]
pub trait InstallerRuntime: Send + Sync {
    /// Create the installer container, returning its id
    async fn create(&self, spec: &InstallSpec) -> BootdiskResult<String>;

    /// Start a created container
    async fn start(&self, session_id: &str) -> BootdiskResult<()>;

    /// Forward container stdout/stderr to ours until it exits
    async fn attach(&self, session_id: &str) -> BootdiskResult<()>;

    /// Block until the container exits, returning its exit code
    async fn wait(&self, session_id: &str) -> BootdiskResult<i32>;

    /// Remove the container; a container that no longer exists is not an error
    async fn remove(&self, session_id: &str, force: bool) -> BootdiskResult<()>;

    /// Get the human-readable runtime name for display
    fn runtime_name(&self) -> &'static str;
}
