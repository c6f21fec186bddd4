use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

pub struct TestBoard {
    dir: TempDir,
}

impl TestBoard {
    pub fn init() -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    #[allow(dead_code)]
    pub fn write_config(&self, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join(".taskboard.toml");
        fs::write(&path, contents)?;
        Ok(path)
    }

    #[allow(dead_code)]
    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().join(".taskboard")
    }
}

pub fn tb_cmd(board: &TestBoard) -> Command {
    let mut cmd = Command::cargo_bin("tb").expect("binary");
    cmd.current_dir(board.path());
    cmd
}

/// Create a task via the CLI and return its store-assigned id.
#[allow(dead_code)]
pub fn create_task(board: &TestBoard, extra_args: &[&str]) -> i64 {
    let output = tb_cmd(board)
        .args(["task", "new", "--json"])
        .args(extra_args)
        .output()
        .expect("run tb task new");
    assert!(output.status.success(), "task new failed: {output:?}");

    let envelope: Value = serde_json::from_slice(&output.stdout).expect("json envelope");
    envelope["data"]["id"].as_i64().expect("task id")
}
