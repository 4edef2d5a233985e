//! Integration tests running the `addonsync` binary against a temporary
//! game install and data directory.
//!
//! These tests verify that:
//! - Help and argument errors exit with the right status
//! - Bulk operations refuse to run without confirmation
//! - Capture, list, apply and offline sync work end to end

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

/// Temporary home with a game install and a data directory
struct Sandbox {
    temp_dir: TempDir,
    game_path: PathBuf,
    data_dir: PathBuf,
}

impl Sandbox {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let game_path = temp_dir.path().join("wow");
        let data_dir = temp_dir.path().join("data");
        Self {
            temp_dir,
            game_path,
            data_dir,
        }
    }

    fn saved_variables(&self) -> PathBuf {
        self.game_path.join("_retail_/WTF/Account/MAIN/SavedVariables")
    }

    fn write_live(&self, file: &str, contents: &str) {
        fs::create_dir_all(self.saved_variables()).expect("Failed to create SavedVariables");
        fs::write(self.saved_variables().join(file), contents).expect("Failed to write");
    }

    fn run(&self, args: &[&str]) -> Output {
        let home = self.temp_dir.path();
        Command::new(env!("CARGO_BIN_EXE_addonsync"))
            .args(args)
            .arg("--game-path")
            .arg(&self.game_path)
            .args(["--account", "MAIN"])
            .arg("--data-dir")
            .arg(&self.data_dir)
            .env("HOME", home)
            .env("XDG_CONFIG_HOME", home.join("config"))
            .env_remove("ADDONSYNC_ACCESS_TOKEN")
            .output()
            .expect("Failed to run addonsync")
    }

    fn run_json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "addonsync {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
    }
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).expect("Failed to read file")
}

#[test]
fn test_help_lists_commands() {
    let output = Command::new(env!("CARGO_BIN_EXE_addonsync"))
        .arg("--help")
        .output()
        .expect("Failed to run addonsync");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["capture", "apply", "sync", "push-all", "pull-all", "restore"] {
        assert!(stdout.contains(command), "help is missing {}", command);
    }
}

#[test]
fn test_bad_arguments_exit_with_usage_error() {
    let sandbox = Sandbox::new();
    assert_eq!(sandbox.run(&["frobnicate"]).status.code(), Some(2));
    assert_eq!(sandbox.run(&["push-all", "--offline"]).status.code(), Some(2));
    assert_eq!(sandbox.run(&["pull-all", "--offline"]).status.code(), Some(2));
}

#[cfg(target_os = "linux")]
#[test]
fn test_capture_list_and_apply() {
    let sandbox = Sandbox::new();
    sandbox.write_live("Plater.lua", "captured");

    let captured = sandbox.run_json(&["capture", "Raid", "--addons", "plater,details", "--json"]);
    let id = captured["id"].as_str().expect("id").to_string();
    assert_eq!(captured["addons"], serde_json::json!(["Plater"]));
    assert_eq!(captured["files"], 1);

    let listed = sandbox.run_json(&["list", "--json"]);
    assert_eq!(listed.as_array().map(|a| a.len()), Some(1));
    assert_eq!(listed[0]["name"], "Raid");

    sandbox.write_live("Plater.lua", "changed since capture");
    let outcome = sandbox.run_json(&["apply", &id, "--json"]);
    assert_eq!(outcome["files_written"], 1);
    assert_eq!(outcome["files_backed_up"], 1);
    assert_eq!(read(&sandbox.saved_variables().join("Plater.lua")), "captured");

    let backups = sandbox.run_json(&["backups", "--json"]);
    assert_eq!(backups.as_array().map(|a| a.len()), Some(1));
    assert_eq!(backups[0]["account"], "MAIN");

    let activity = sandbox.run_json(&["activity", "--json"]);
    assert_eq!(activity[0]["activity_type"], "Apply");
}

#[cfg(target_os = "linux")]
#[test]
fn test_offline_sync_and_missing_profile() {
    let sandbox = Sandbox::new();
    sandbox.write_live("DBM-Core.lua", "dbm");
    sandbox.run_json(&["capture", "Dungeons", "--addons", "dbm", "--json"]);

    let result = sandbox.run_json(&["sync", "--offline", "--json"]);
    assert_eq!(result["uploaded"], serde_json::json!(["Dungeons"]));
    assert_eq!(result["conflicts"], serde_json::json!([]));

    let status = sandbox.run_json(&["status", "--json"]);
    assert_eq!(status["configured"], false);

    let missing = sandbox.run(&["show", "no-such-profile"]);
    assert!(!missing.status.success());
    assert!(String::from_utf8_lossy(&missing.stderr).contains("Not found"));
}
