//! Command-rewriting shims injected into the installer container
//!
//! Some installer images call `losetup --direct-io=on`, which fails on
//! kernels and filesystems without direct I/O support for loop devices. The
//! default shim is bind-mounted over `/usr/local/sbin/losetup` (ahead of
//! `/usr/sbin` in `$PATH`), drops any `--direct-io=*` argument and execs the
//! real binary with `--direct-io=off`.

use crate::error::{BootdiskError, BootdiskResult};
use crate::orchestration::install::Mount;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A wrapper script replacing one binary inside the installer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandShim {
    /// Path the shim is mounted at inside the container
    pub destination: PathBuf,
    /// Binary the shim execs
    pub target: PathBuf,
    /// Arguments always passed first
    pub fixed_args: Vec<String>,
    /// Arguments starting with any of these prefixes are dropped
    pub drop_prefixes: Vec<String>,
}

/// Quote a string for inclusion in a POSIX shell script
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

impl CommandShim {
    /// The losetup wrapper that neutralizes `--direct-io`
    pub fn losetup() -> Self {
        Self {
            destination: PathBuf::from("/usr/local/sbin/losetup"),
            target: PathBuf::from("/usr/sbin/losetup"),
            fixed_args: vec!["--direct-io=off".to_string()],
            drop_prefixes: vec!["--direct-io=".to_string()],
        }
    }

    /// Render the bash wrapper script
    pub fn script(&self) -> String {
        let mut base = vec![shell_quote(&self.target.to_string_lossy())];
        base.extend(self.fixed_args.iter().map(|a| shell_quote(a)));

        let mut script = String::from("#!/bin/bash\nset -euo pipefail\n");
        script.push_str(&format!("args=({})\n", base.join(" ")));
        script.push_str("for arg in \"$@\"; do\n\tcase $arg in\n");
        for prefix in &self.drop_prefixes {
            script.push_str(&format!(
                "\t\t{}*) echo \"ignoring: $arg\" 1>&2;;\n",
                shell_quote(prefix)
            ));
        }
        script.push_str("\t\t*) args+=(\"$arg\") ;;\n\tesac\ndone\nexec \"${args[@]}\"\n");
        script
    }

    /// Write the script to an executable temporary file inside `dir`
    pub fn materialize(&self, dir: &Path) -> BootdiskResult<ShimFile> {
        use std::os::unix::fs::PermissionsExt;

        let name = self
            .target
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "shim".to_string());
        let path = dir.join(format!("{}-wrapper-{}", name, uuid::Uuid::new_v4().simple()));

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| BootdiskError::io(format!("temp {} wrapper", name), e))?;
        let shim = ShimFile {
            path,
            destination: self.destination.clone(),
        };

        file.write_all(self.script().as_bytes())
            .map_err(|e| BootdiskError::io(format!("temp {} wrapper copy", name), e))?;
        fs::set_permissions(&shim.path, fs::Permissions::from_mode(0o755))
            .map_err(|e| BootdiskError::io(format!("temp {} wrapper chmod", name), e))?;

        debug!("Wrote {} shim to {}", name, shim.path.display());
        Ok(shim)
    }
}

/// A materialized shim on the host; removed on drop
#[derive(Debug)]
pub struct ShimFile {
    path: PathBuf,
    destination: PathBuf,
}

impl ShimFile {
    /// Host path of the script
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read-only bind mount placing the script at its destination
    pub fn mount(&self) -> Mount {
        Mount::bind(&self.path, &self.destination).read_only()
    }
}

impl Drop for ShimFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove {}: {}", self.path.display(), e);
            }
        }
    }
}
