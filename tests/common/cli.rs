//! CLI test runner with fluent assertions.
//!
//! Runs the `brcodes` binary against a private storage directory and
//! settings file so tests never touch the user's real codes.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

use super::fixtures::HUB;

/// Main test runner for the `brcodes` CLI binary.
///
/// # Example
///
/// ```ignore
/// let cli = CliRunner::new();
/// cli.run_robot(&["devices"])
///    .assert_success()
///    .assert_json_field("/devices/0/name", &json!("tv"));
/// ```
pub struct CliRunner {
    temp: TempDir,
    hub: Option<String>,
}

impl Default for CliRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CliRunner {
    /// Runner with a fresh storage directory and an empty settings file.
    #[must_use]
    pub fn new() -> Self {
        let temp = TempDir::new().expect("create temp dir");
        std::fs::create_dir_all(temp.path().join("storage")).expect("create storage dir");
        std::fs::write(temp.path().join("config.toml"), "").expect("write settings");
        Self {
            temp,
            hub: Some(HUB.to_string()),
        }
    }

    /// Do not pass `--hub`.
    #[must_use]
    pub fn without_hub(mut self) -> Self {
        self.hub = None;
        self
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.temp.path().join("storage")
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("brcodes").expect("binary built");
        cmd.env_remove("BRCODES_HUB")
            .env_remove("BRCODES_STORAGE_DIR")
            .env_remove("BRCODES_FORMAT")
            .env("RUST_LOG", "off")
            .arg("--config")
            .arg(self.temp.path().join("config.toml"))
            .arg("--storage-dir")
            .arg(self.storage_dir());
        if let Some(hub) = &self.hub {
            cmd.arg("--hub").arg(hub);
        }
        cmd
    }

    /// Execute the command with the given arguments.
    ///
    /// # Panics
    ///
    /// Panics if the command fails to execute.
    #[must_use]
    pub fn run(&self, args: &[&str]) -> CliResult {
        let output = self.command().args(args).output().expect("run brcodes");
        CliResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            args: args.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Execute with `--robot` flag for JSON output.
    #[must_use]
    pub fn run_robot(&self, args: &[&str]) -> CliResult {
        let mut full_args = vec!["--robot"];
        full_args.extend(args);
        self.run(&full_args)
    }
}

/// Captured output from CLI execution with fluent assertions.
#[derive(Debug, Clone)]
pub struct CliResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub args: Vec<String>,
}

impl CliResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Assert the command succeeded.
    ///
    /// # Panics
    ///
    /// Panics if the command did not exit with code 0.
    pub fn assert_success(&self) -> &Self {
        assert!(
            self.success(),
            "Command {:?} failed with exit code {}: {}",
            self.args,
            self.exit_code,
            self.stderr
        );
        self
    }

    /// Assert the command failed.
    ///
    /// # Panics
    ///
    /// Panics if the command exited with code 0.
    pub fn assert_failure(&self) -> &Self {
        assert!(
            !self.success(),
            "Command {:?} unexpectedly succeeded",
            self.args
        );
        self
    }

    /// Assert stdout contains the given text.
    ///
    /// # Panics
    ///
    /// Panics if stdout doesn't contain the text.
    pub fn assert_stdout_contains(&self, text: &str) -> &Self {
        assert!(
            self.stdout.contains(text),
            "stdout does not contain \"{text}\"\nActual stdout:\n{}",
            self.stdout
        );
        self
    }

    /// Assert stderr contains the given text.
    ///
    /// # Panics
    ///
    /// Panics if stderr doesn't contain the text.
    pub fn assert_stderr_contains(&self, text: &str) -> &Self {
        assert!(
            self.stderr.contains(text),
            "stderr does not contain \"{text}\"\nActual stderr:\n{}",
            self.stderr
        );
        self
    }

    /// Parse stdout as JSON.
    ///
    /// # Panics
    ///
    /// Panics if stdout is not valid JSON.
    pub fn json(&self) -> Value {
        serde_json::from_str(self.stdout.trim())
            .unwrap_or_else(|_| panic!("Failed to parse JSON from stdout:\n{}", self.stdout))
    }

    /// Parse stderr as the robot-mode error object.
    ///
    /// # Panics
    ///
    /// Panics if stderr is not valid JSON.
    pub fn error_json(&self) -> Value {
        serde_json::from_str(self.stderr.trim())
            .unwrap_or_else(|_| panic!("Failed to parse JSON from stderr:\n{}", self.stderr))
    }

    /// Assert a JSON field matches an expected value using JSON pointer syntax.
    ///
    /// # Panics
    ///
    /// Panics if the field doesn't exist or doesn't match.
    pub fn assert_json_field(&self, json_pointer: &str, expected: &Value) -> &Self {
        let json = self.json();
        let actual = json.pointer(json_pointer).unwrap_or_else(|| {
            panic!(
                "JSON path {json_pointer} not found in:\n{}",
                serde_json::to_string_pretty(&json).unwrap_or_default()
            )
        });
        assert_eq!(actual, expected, "JSON field {json_pointer} mismatch");
        self
    }
}
