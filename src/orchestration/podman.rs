//! Podman CLI backend
//!
//! Implements image resolution and the installer lifecycle by shelling out
//! to `podman`. The installer needs host devices and container storage, so
//! this is expected to run as root.

use crate::error::{BootdiskError, BootdiskResult};
use crate::orchestration::install::InstallSpec;
use crate::orchestration::runtime::{ImageInspect, ImageResolver, InstallerRuntime};
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Image inspect record as printed by `podman image inspect --format json`
#[derive(Debug, Deserialize)]
struct InspectRecord {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "RepoTags", default)]
    repo_tags: Option<Vec<String>>,
    #[serde(rename = "Size", default)]
    size: u64,
}

/// Image ids printed by `podman pull -q`, one per line
pub(crate) fn parse_pull_output(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `podman image inspect` JSON for `image`
pub(crate) fn parse_inspect(image: &str, json: &str) -> BootdiskResult<ImageInspect> {
    let mut records: Vec<InspectRecord> = serde_json::from_str(json)?;
    match records.len() {
        0 => Err(BootdiskError::ImageNotFound {
            image: image.to_string(),
            reason: "inspect returned no images".to_string(),
        }),
        1 => {
            let record = records.remove(0);
            Ok(ImageInspect {
                id: record.id,
                repo_tags: record.repo_tags.unwrap_or_default(),
                size: record.size,
            })
        }
        count => Err(BootdiskError::AmbiguousImage {
            image: image.to_string(),
            count,
        }),
    }
}

fn is_missing_image(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    stderr.contains("image not known") || stderr.contains("no such image")
}

fn is_missing_container(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    stderr.contains("no such container") || stderr.contains("no container with name or id")
}

/// Arguments for `podman create`
pub(crate) fn create_args(spec: &InstallSpec) -> Vec<String> {
    let mut args = vec!["create".to_string()];

    if spec.privileged {
        args.push("--privileged".to_string());
    }
    if spec.pid_host {
        args.push("--pid=host".to_string());
    }
    if spec.auto_remove {
        args.push("--rm".to_string());
    }
    if spec.tty {
        args.push("-t".to_string());
    }

    args.push("--network".to_string());
    args.push(spec.network.clone());

    for opt in &spec.security_opt {
        args.push("--security-opt".to_string());
        args.push(opt.clone());
    }

    for (k, v) in &spec.annotations {
        args.push("--annotation".to_string());
        args.push(format!("{}={}", k, v));
    }

    for mount in &spec.mounts {
        args.push("-v".to_string());
        args.push(mount.volume_arg());
    }

    for (k, v) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{}={}", k, v));
    }

    args.push(spec.image.clone());
    args.extend(spec.command.iter().cloned());
    args
}

fn short_id(id: &str) -> &str {
    &id[..12.min(id.len())]
}

/// Image resolver and installer runtime backed by the `podman` CLI
pub struct PodmanRuntime;

impl PodmanRuntime {
    /// Create a new Podman runtime
    pub fn new() -> Self {
        Self
    }

    /// Check if Podman is installed
    pub async fn is_available(&self) -> bool {
        Command::new("podman")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Fail with [`BootdiskError::PodmanNotFound`] if Podman is missing
    pub async fn ensure_ready(&self) -> BootdiskResult<()> {
        if !self.is_available().await {
            return Err(BootdiskError::PodmanNotFound);
        }
        Ok(())
    }

    /// Execute a Podman command and return the output
    async fn exec(&self, args: &[&str]) -> BootdiskResult<std::process::Output> {
        debug!("Executing: podman {:?}", args);

        Command::new("podman")
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| BootdiskError::command_failed(format!("podman {:?}", args), e))
    }
}

impl Default for PodmanRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageResolver for PodmanRuntime {
    async fn pull(&self, image: &str) -> BootdiskResult<Vec<String>> {
        info!("Pulling image: {}", image);

        let output = self
            .exec(&["pull", "--policy", "missing", "-q", image])
            .await?;

        if output.status.success() {
            Ok(parse_pull_output(&String::from_utf8_lossy(&output.stdout)))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(BootdiskError::ImagePull {
                image: image.to_string(),
                reason: stderr.trim().to_string(),
            })
        }
    }

    async fn inspect(&self, image: &str) -> BootdiskResult<ImageInspect> {
        let output = self
            .exec(&["image", "inspect", "--format", "json", image])
            .await?;

        if output.status.success() {
            parse_inspect(image, &String::from_utf8_lossy(&output.stdout))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_missing_image(&stderr) {
                Err(BootdiskError::ImageNotFound {
                    image: image.to_string(),
                    reason: stderr.trim().to_string(),
                })
            } else {
                Err(BootdiskError::command_exec("podman image inspect", stderr))
            }
        }
    }
}

#[async_trait]
impl InstallerRuntime for PodmanRuntime {
    async fn create(&self, spec: &InstallSpec) -> BootdiskResult<String> {
        let args = create_args(spec);
        debug!("Creating installer: podman {:?}", args);

        let args_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.exec(&args_refs).await?;

        if output.status.success() {
            let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
            info!("Installer created: {}", short_id(&id));
            Ok(id)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(BootdiskError::installer("create", stderr.trim()))
        }
    }

    async fn start(&self, session_id: &str) -> BootdiskResult<()> {
        debug!("Starting installer: {}", session_id);

        let output = self.exec(&["start", session_id]).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(BootdiskError::installer("start", stderr.trim()))
        }
    }

    async fn attach(&self, session_id: &str) -> BootdiskResult<()> {
        debug!("Attaching to installer: {}", session_id);

        let status = Command::new("podman")
            .args(["attach", "--no-stdin", session_id])
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| BootdiskError::command_failed("podman attach", e))?;

        if status.success() {
            Ok(())
        } else {
            Err(BootdiskError::installer(
                "attach",
                format!("exited with {}", status.code().unwrap_or(-1)),
            ))
        }
    }

    async fn wait(&self, session_id: &str) -> BootdiskResult<i32> {
        let output = self.exec(&["wait", session_id]).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BootdiskError::installer("wait", stderr.trim()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout.trim().parse::<i32>().map_err(|_| {
            BootdiskError::installer("wait", format!("unexpected exit code {:?}", stdout.trim()))
        })
    }

    async fn remove(&self, session_id: &str, force: bool) -> BootdiskResult<()> {
        debug!("Removing installer: {}", session_id);

        let mut args = vec!["rm"];
        if force {
            args.push("-f");
        }
        args.push(session_id);
        let output = self.exec(&args).await?;

        if output.status.success() {
            Ok(())
        } else {
            // --rm may already have removed it
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_missing_container(&stderr) {
                Ok(())
            } else {
                Err(BootdiskError::command_exec("podman rm", stderr))
            }
        }
    }

    fn runtime_name(&self) -> &'static str {
        "Podman"
    }
}
