//! Installer container specification
//!
//! Describes the privileged container that runs `bootc install to-disk`
//! against a sparse file bind-mounted from the cache directory.

use crate::config::schema::InstallerConfig;
use crate::disk::DiskImageConfig;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Mount point of the cache directory inside the installer
pub const OUTPUT_DIR: &str = "/output";

/// SELinux label the installer runs with
const UNCONFINED_LABEL: &str = "type:unconfined_t";

/// A bind mount into the installer container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    /// Host path
    pub source: PathBuf,
    /// Path inside the container
    pub destination: PathBuf,
    /// Mount read-only
    pub read_only: bool,
}

impl Mount {
    /// Read-write bind mount
    pub fn bind(source: impl AsRef<Path>, destination: impl AsRef<Path>) -> Self {
        Self {
            source: source.as_ref().to_path_buf(),
            destination: destination.as_ref().to_path_buf(),
            read_only: false,
        }
    }

    /// Make this mount read-only
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Render as a `-v` argument
    pub fn volume_arg(&self) -> String {
        let ro = if self.read_only { ":ro" } else { "" };
        format!(
            "{}:{}{}",
            self.source.display(),
            self.destination.display(),
            ro
        )
    }
}

/// Everything needed to create the installer container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallSpec {
    /// Image to install (also the image the installer runs from)
    pub image: String,
    /// Command executed inside the container
    pub command: Vec<String>,
    /// Bind mounts
    pub mounts: Vec<Mount>,
    /// Environment variables
    pub env: BTreeMap<String, String>,
    /// Container annotations
    pub annotations: BTreeMap<String, String>,
    /// `--security-opt` values
    pub security_opt: Vec<String>,
    /// Run privileged with host device access
    pub privileged: bool,
    /// Share the host PID namespace
    pub pid_host: bool,
    /// Allocate a TTY so progress output renders
    pub tty: bool,
    /// Remove the container once it exits
    pub auto_remove: bool,
    /// Network mode
    pub network: String,
}

/// Arguments for `bootc install to-disk` writing to `disk_file_name` under [`OUTPUT_DIR`]
pub fn bootc_install_args(config: &DiskImageConfig, disk_file_name: &str) -> Vec<String> {
    let mut args: Vec<String> = [
        "bootc",
        "install",
        "to-disk",
        "--via-loopback",
        "--generic-image",
        "--skip-fetch-check",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    if let Some(fs) = config.filesystem() {
        args.push("--filesystem".to_string());
        args.push(fs.to_string());
    }
    if let Some(root_size) = config.root_size_max() {
        args.push(format!("--root-size={}", root_size));
    }
    args.push(format!("{}/{}", OUTPUT_DIR, disk_file_name));
    args
}

impl InstallSpec {
    /// Spec installing `image` onto `disk_file_name` inside `output_dir`.
    ///
    /// `extra_mounts` typically carries the losetup shim; `log_level` is
    /// forwarded as `RUST_LOG` when set.
    pub fn for_disk(
        image: &str,
        output_dir: &Path,
        disk_file_name: &str,
        disk_config: &DiskImageConfig,
        installer: &InstallerConfig,
        extra_mounts: Vec<Mount>,
        log_level: Option<String>,
    ) -> Self {
        let mut mounts = vec![
            Mount::bind(&installer.container_storage, "/var/lib/containers"),
            Mount::bind("/dev", "/dev"),
            Mount::bind(output_dir, OUTPUT_DIR),
        ];
        mounts.extend(extra_mounts);

        let mut env = BTreeMap::new();
        if let Some(level) = log_level {
            env.insert("RUST_LOG".to_string(), level);
        }

        let mut annotations = BTreeMap::new();
        annotations.insert(
            "io.podman.annotations.label".to_string(),
            UNCONFINED_LABEL.to_string(),
        );

        Self {
            image: image.to_string(),
            command: bootc_install_args(disk_config, disk_file_name),
            mounts,
            env,
            annotations,
            security_opt: vec![
                format!("label={}", UNCONFINED_LABEL),
                "label=nested".to_string(),
            ],
            privileged: true,
            pid_host: true,
            tty: true,
            auto_remove: true,
            network: "bridge".to_string(),
        }
    }
}
