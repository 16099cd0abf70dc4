//! Disk build orchestration
//!
//! A [`DiskManager`] turns one container image into one cached disk image:
//!
//! ```text
//! Idle → Resolving → Locking → CacheCheck ─┬─ Reuse ─────────────────────┬→ Done
//!                                          └─ Building → Publishing ─────┘
//! ```
//!
//! Any step may end in `Failed`. The per-image cache directory is held under
//! an exclusive lock for the whole build, and a disk only becomes visible
//! under its canonical name through an atomic rename once the installer has
//! succeeded and the validity attribute has been written.

use crate::cache::entry::{self, CacheValidity, DISK_IMAGE_NAME};
use crate::cache::lock::{CacheLock, LockMode};
use crate::cache::meta;
use crate::config::schema::InstallerConfig;
use crate::disk::descriptor::{DiskDescriptor, DiskImageConfig, ImageDescriptor};
use crate::disk::size::{self, format_bytes};
use crate::disk::temp::TempDisk;
use crate::error::{BootdiskError, BootdiskResult};
use crate::orchestration::install::InstallSpec;
use crate::orchestration::runtime::{ImageResolver, InstallerRuntime};
use crate::orchestration::shim::{CommandShim, ShimFile};
use chrono::{DateTime, Utc};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long to let attached output drain after the installer exits
const ATTACH_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Build state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Idle,
    Resolving,
    Locking,
    CacheCheck,
    Reuse,
    Building,
    Publishing,
    Done,
    Failed,
}

impl BuildState {
    /// No further transitions happen from this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving",
            Self::Locking => "locking",
            Self::CacheCheck => "cache-check",
            Self::Reuse => "reuse",
            Self::Building => "building",
            Self::Publishing => "publishing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Callback invoked on every state transition
pub type StateObserver = Box<dyn Fn(BuildState, Option<&ImageDescriptor>) + Send + Sync>;

/// State of one build, populated once the image is resolved
#[derive(Debug)]
struct BuildSession {
    image: ImageDescriptor,
    directory: PathBuf,
    created_at: DateTime<Utc>,
    size: Option<u64>,
    installer_id: Option<String>,
    temp: Option<TempDisk>,
}

/// Builds or reuses the cached disk image for one container image
pub struct DiskManager {
    image: String,
    cache_root: PathBuf,
    run_dir: PathBuf,
    resolver: Arc<dyn ImageResolver>,
    installer: Arc<dyn InstallerRuntime>,
    installer_config: InstallerConfig,
    state: BuildState,
    session: Option<BuildSession>,
    lock: Option<CacheLock>,
    observer: Option<StateObserver>,
}

impl DiskManager {
    /// Manager for `image` (name or id) caching under `cache_root`, with lock
    /// files in `run_dir`
    pub fn new(
        image: impl Into<String>,
        cache_root: impl Into<PathBuf>,
        run_dir: impl Into<PathBuf>,
        resolver: Arc<dyn ImageResolver>,
        installer: Arc<dyn InstallerRuntime>,
        installer_config: InstallerConfig,
    ) -> Self {
        Self {
            image: image.into(),
            cache_root: cache_root.into(),
            run_dir: run_dir.into(),
            resolver,
            installer,
            installer_config,
            state: BuildState::Idle,
            session: None,
            lock: None,
            observer: None,
        }
    }

    /// Register a callback for state transitions
    pub fn with_observer(
        mut self,
        observer: impl Fn(BuildState, Option<&ImageDescriptor>) + Send + Sync + 'static,
    ) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Current state
    pub fn state(&self) -> BuildState {
        self.state
    }

    /// Per-image cache directory, once resolved
    pub fn directory(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.directory.as_path())
    }

    /// Resolved image id
    pub fn image_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.image.id.as_str())
    }

    /// Resolved repository tag
    pub fn repo_tag(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.image.repo_tag.as_str())
    }

    /// Virtual size of the disk, once known
    pub fn size(&self) -> Option<u64> {
        self.session.as_ref().and_then(|s| s.size)
    }

    /// When the build session started
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.session.as_ref().map(|s| s.created_at)
    }

    /// Produce the disk image, reusing a valid cached one.
    ///
    /// A manager runs a single build; calling this again is an error.
    pub async fn install(
        &mut self,
        config: &DiskImageConfig,
        quiet: bool,
    ) -> BootdiskResult<DiskDescriptor> {
        if self.state != BuildState::Idle {
            return Err(BootdiskError::Internal(format!(
                "disk manager for {} already used (state: {})",
                self.image, self.state
            )));
        }

        let started = Utc::now();
        let result = self.run(config, quiet, started).await;
        if result.is_err() {
            if let Some(session) = self.session.as_mut() {
                session.temp.take();
            }
        }
        self.release_lock();

        match result {
            Ok(descriptor) => {
                self.transition(BuildState::Done);
                let elapsed = Utc::now().signed_duration_since(started);
                debug!("installImage elapsed: {}ms", elapsed.num_milliseconds());
                Ok(descriptor)
            }
            Err(e) => {
                self.transition(BuildState::Failed);
                Err(e)
            }
        }
    }

    /// Tear down whatever a failed or interrupted build left behind.
    ///
    /// Force-removes the installer container if one was created, deletes an
    /// unpublished temporary disk and releases the lock, in that order. The
    /// lock is released even when removal fails. Safe to call more than once,
    /// and a no-op before anything was started.
    pub async fn cleanup(&mut self) -> BootdiskResult<()> {
        let mut result = Ok(());

        if let Some(session) = self.session.as_mut() {
            if let Some(id) = session.installer_id.clone() {
                debug!("Removing install container {}", id);
                match self.installer.remove(&id, true).await {
                    Ok(()) => session.installer_id = None,
                    Err(e) => {
                        result = Err(BootdiskError::installer(
                            "remove",
                            format!("{}: {}", id, e),
                        ))
                    }
                }
            }
            session.temp.take();
        }

        self.release_lock();
        result
    }

    fn transition(&mut self, next: BuildState) {
        debug!("Disk build for {}: {} -> {}", self.image, self.state, next);
        self.state = next;
        if let Some(observer) = &self.observer {
            observer(next, self.session.as_ref().map(|s| &s.image));
        }
    }

    fn session_mut(&mut self) -> BootdiskResult<&mut BuildSession> {
        self.session
            .as_mut()
            .ok_or_else(|| BootdiskError::Internal("no build session".to_string()))
    }

    fn release_lock(&mut self) {
        if let Some(mut lock) = self.lock.take() {
            if let Err(e) = lock.unlock() {
                error!(
                    "unable to unlock disk cache {}: {}",
                    lock.cache_dir().display(),
                    e
                );
            }
        }
    }

    async fn run(
        &mut self,
        config: &DiskImageConfig,
        quiet: bool,
        started: DateTime<Utc>,
    ) -> BootdiskResult<DiskDescriptor> {
        self.transition(BuildState::Resolving);
        let image = self.resolve().await?;
        let target_size = size::disk_size_for(image.declared_size, config.disk_size())?;
        let directory = self.cache_root.join(&image.id);
        self.session = Some(BuildSession {
            image: image.clone(),
            directory: directory.clone(),
            created_at: started,
            size: None,
            installer_id: None,
            temp: None,
        });

        self.transition(BuildState::Locking);
        let mut lock = CacheLock::new(&self.run_dir, &directory);
        if !lock.try_lock(LockMode::Exclusive)? {
            return Err(BootdiskError::CacheBusy {
                image_id: image.id,
                path: directory,
            });
        }
        self.lock = Some(lock);
        fs::create_dir_all(&directory).map_err(|e| {
            BootdiskError::io(format!("creating disk directory {}", directory.display()), e)
        })?;

        self.transition(BuildState::CacheCheck);
        let disk_path = directory.join(DISK_IMAGE_NAME);
        let reused = match entry::check(&disk_path, &image.id)? {
            CacheValidity::Valid => true,
            CacheValidity::Stale(reason) => {
                info!("Discarding cached disk {}: {}", disk_path.display(), reason);
                entry::remove_disk(&disk_path)?;
                false
            }
            CacheValidity::Missing => false,
        };

        let disk_size = if reused {
            self.transition(BuildState::Reuse);
            fs::metadata(&disk_path)
                .map_err(|e| BootdiskError::io(format!("reading {}", disk_path.display()), e))?
                .len()
        } else {
            self.transition(BuildState::Building);
            self.build(config, quiet, &image, &directory, target_size)
                .await?;
            self.transition(BuildState::Publishing);
            self.publish(&disk_path)?;
            target_size
        };
        self.session_mut()?.size = Some(disk_size);

        Ok(DiskDescriptor {
            directory,
            disk_path,
            image_id: image.id,
            repo_tag: image.repo_tag,
            size: disk_size,
            created_at: started,
            reused,
        })
    }

    async fn resolve(&self) -> BootdiskResult<ImageDescriptor> {
        let ids = self.resolver.pull(&self.image).await?;
        let id = match ids.as_slice() {
            [id] => id.clone(),
            [] => {
                return Err(BootdiskError::ImageNotFound {
                    image: self.image.clone(),
                    reason: "no ids returned from image pull".to_string(),
                })
            }
            _ => {
                return Err(BootdiskError::AmbiguousImage {
                    image: self.image.clone(),
                    count: ids.len(),
                })
            }
        };

        let inspect = self.resolver.inspect(&self.image).await?;
        let repo_tag = inspect.repo_tags.into_iter().next().ok_or_else(|| {
            BootdiskError::ImageNotFound {
                image: self.image.clone(),
                reason: "image has no repository tag".to_string(),
            }
        })?;

        debug!("Resolved {} to {} ({})", self.image, id, repo_tag);
        Ok(ImageDescriptor {
            id,
            repo_tag,
            declared_size: inspect.size,
        })
    }

    async fn build(
        &mut self,
        config: &DiskImageConfig,
        quiet: bool,
        image: &ImageDescriptor,
        directory: &Path,
        target_size: u64,
    ) -> BootdiskResult<()> {
        info!(
            "container size: {}, disk size: {}",
            format_bytes(image.declared_size),
            format_bytes(target_size)
        );

        let temp = TempDisk::create(directory)?;
        temp.allocate(target_size)?;
        let file_name = temp.file_name();
        self.session_mut()?.temp = Some(temp);

        let shim = if self.installer_config.losetup_shim {
            Some(CommandShim::losetup().materialize(directory)?)
        } else {
            None
        };
        let log_level = std::env::var(&self.installer_config.log_env).ok();
        let spec = InstallSpec::for_disk(
            &self.image,
            directory,
            &file_name,
            config,
            &self.installer_config,
            shim.iter().map(ShimFile::mount).collect(),
            log_level,
        );

        let exit_code = self
            .run_installer(&spec, quiet)
            .await
            .map_err(|e| BootdiskError::InstallFailed {
                image: image.repo_tag.clone(),
                exit_code: None,
                detail: e.to_string(),
            })?;
        drop(shim);

        if exit_code != 0 {
            return Err(BootdiskError::InstallFailed {
                image: image.repo_tag.clone(),
                exit_code: Some(exit_code),
                detail: format!("bootc install exited with code {}", exit_code),
            });
        }

        let temp = self
            .session_mut()?
            .temp
            .as_ref()
            .ok_or_else(|| BootdiskError::Internal("temporary disk missing".to_string()))?;
        meta::write_digest(temp.file(), &image.id)?;
        Ok(())
    }

    /// Create, start and wait for the installer, returning its exit code
    async fn run_installer(&mut self, spec: &InstallSpec, quiet: bool) -> BootdiskResult<i32> {
        let id = self.installer.create(spec).await?;
        debug!("Created install container, id={}", id);
        self.session_mut()?.installer_id = Some(id.clone());

        self.installer.start(&id).await?;
        debug!("Started install container");

        let attach = if quiet {
            None
        } else {
            let installer = Arc::clone(&self.installer);
            let attach_id = id.clone();
            Some(AttachTask(tokio::spawn(async move {
                if let Err(e) = installer.attach(&attach_id).await {
                    warn!("Lost installer output: {}", e);
                }
            })))
        };

        let exit_code = self.installer.wait(&id).await;

        if let Some(attach) = attach {
            attach.drain(ATTACH_DRAIN_TIMEOUT).await;
        }

        let exit_code = exit_code?;
        debug!("Install container exited with {}", exit_code);
        Ok(exit_code)
    }

    fn publish(&mut self, disk_path: &Path) -> BootdiskResult<()> {
        let temp = self
            .session_mut()?
            .temp
            .take()
            .ok_or_else(|| BootdiskError::Internal("temporary disk missing".to_string()))?;
        let temp_path = temp.path().to_path_buf();
        temp.persist(disk_path)?;
        debug!(
            "Published {} as {}",
            temp_path.display(),
            disk_path.display()
        );
        Ok(())
    }
}

/// Output forwarding for a running installer, aborted when dropped
struct AttachTask(JoinHandle<()>);

impl AttachTask {
    async fn drain(mut self, limit: Duration) {
        if tokio::time::timeout(limit, &mut self.0).await.is_err() {
            debug!("Installer output still attached after {:?}", limit);
        }
    }
}

impl Drop for AttachTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}
