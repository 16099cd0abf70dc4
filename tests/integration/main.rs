//! Integration tests for bootdisk

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn bootdisk() -> Command {
        cargo_bin_cmd!("bootdisk")
    }

    /// Write a config whose cache and lock dirs live inside `dir`
    fn sandbox_config(dir: &Path) -> PathBuf {
        let path = dir.join("config.toml");
        let content = format!(
            "[paths]\ncache_dir = {:?}\nrun_dir = {:?}\n",
            dir.join("cache").display().to_string(),
            dir.join("run").display().to_string()
        );
        fs::write(&path, content).unwrap();
        path
    }

    fn sandboxed(dir: &Path) -> Command {
        let mut cmd = bootdisk();
        cmd.env("BOOTDISK_CONFIG", sandbox_config(dir));
        cmd
    }

    #[test]
    fn help_displays() {
        bootdisk()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("bootable disk images"));
    }

    #[test]
    fn version_displays() {
        bootdisk()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("bootdisk"));
    }

    #[test]
    fn install_requires_image() {
        bootdisk()
            .arg("install")
            .assert()
            .failure()
            .stderr(predicate::str::contains("<IMAGE>"));
    }

    #[test]
    fn config_path_honors_flag() {
        let dir = TempDir::new().unwrap();
        let path = sandbox_config(dir.path());
        bootdisk()
            .args(["config", "path", "--config"])
            .arg(&path)
            .assert()
            .success()
            .stdout(predicate::str::contains(path.display().to_string()));
    }

    #[test]
    fn config_show() {
        let dir = TempDir::new().unwrap();
        sandboxed(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[installer]"))
            .stdout(predicate::str::contains("losetup_shim = true"));
    }

    #[test]
    fn config_init_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        bootdisk()
            .env("BOOTDISK_CONFIG", &path)
            .args(["config", "init"])
            .assert()
            .success();
        assert!(path.exists());
    }

    #[test]
    fn invalid_config_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[disk\n").unwrap();
        bootdisk()
            .env("BOOTDISK_CONFIG", &path)
            .args(["cache", "list"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn cache_list_empty() {
        let dir = TempDir::new().unwrap();
        sandboxed(dir.path())
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached disk images"));
    }

    #[test]
    fn cache_list_json_empty() {
        let dir = TempDir::new().unwrap();
        sandboxed(dir.path())
            .args(["cache", "list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::starts_with("[]"));
    }

    #[test]
    fn cache_list_reports_entry_without_disk_as_invalid() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("cache").join("4bd2c5a0e1f3")).unwrap();
        sandboxed(dir.path())
            .args(["cache", "list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"image_id\": \"4bd2c5a0e1f3\""))
            .stdout(predicate::str::contains("\"state\": \"invalid\""));
    }

    #[test]
    fn cache_rm_all() {
        let dir = TempDir::new().unwrap();
        let entry = dir.path().join("cache").join("4bd2c5a0e1f3");
        fs::create_dir_all(&entry).unwrap();
        sandboxed(dir.path())
            .args(["cache", "rm", "--all", "--yes"])
            .assert()
            .success();
        assert!(!entry.exists());
    }

    #[test]
    fn cache_rm_unknown_id() {
        let dir = TempDir::new().unwrap();
        sandboxed(dir.path())
            .args(["cache", "rm", "deadbeef", "-y"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No cached disk for deadbeef"));
    }

    #[test]
    fn completions_for_bash() {
        bootdisk()
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("bootdisk"));
    }
}
