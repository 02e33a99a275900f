//! Subprocess invocation for the deterministic helper scripts
//! (`analyzer.py`, `context.py`, `planner.py`).
//!
//! Scripts are looked up in the configured scripts directory first, then on
//! `PATH`. Python scripts run under the first interpreter found
//! (python3 > python). Every run is bounded by a wall-clock timeout; a
//! timeout is a failed outcome, never a panic.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::{ForgeError, Result};

/// Result of one script run: `output` is stdout on success, stderr (or the
/// failure reason) otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptOutcome {
    pub ok: bool,
    pub output: String,
}

impl ScriptOutcome {
    fn failed(output: impl Into<String>) -> Self {
        Self {
            ok: false,
            output: output.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScriptRunner {
    scripts_dir: PathBuf,
    timeout: Duration,
}

impl ScriptRunner {
    pub fn new(scripts_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Locate `name` in the scripts directory, then on `PATH`.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let local = self.scripts_dir.join(name);
        if local.is_file() {
            return Ok(local);
        }
        which::which(name).map_err(|_| ForgeError::ScriptNotFound(name.to_string()))
    }

    /// Run `name` with `args` in `cwd`.
    pub async fn run(&self, name: &str, args: &[String], cwd: &Path) -> ScriptOutcome {
        let script = match self.resolve(name) {
            Ok(p) => p,
            Err(e) => return ScriptOutcome::failed(e.to_string()),
        };
        let mut cmd = match build_command(&script) {
            Some(c) => c,
            None => return ScriptOutcome::failed("no python interpreter found on PATH"),
        };
        cmd.args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(script = %script.display(), ?args, "running script");

        let child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => return ScriptOutcome::failed(format!("failed to spawn {name}: {e}")),
        };

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Err(_) => ScriptOutcome::failed(format!(
                "{name} timed out after {}s",
                self.timeout.as_secs()
            )),
            Ok(Err(e)) => ScriptOutcome::failed(format!("{name} failed: {e}")),
            Ok(Ok(output)) if output.status.success() => ScriptOutcome {
                ok: true,
                output: String::from_utf8_lossy(&output.stdout).into_owned(),
            },
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                let reason = if stderr.trim().is_empty() {
                    format!("{name} exited with {}", output.status)
                } else {
                    stderr
                };
                ScriptOutcome::failed(reason)
            }
        }
    }
}

fn python() -> Option<&'static str> {
    ["python3", "python"]
        .into_iter()
        .find(|exe| which::which(exe).is_ok())
}

fn build_command(script: &Path) -> Option<Command> {
    let is_python = script.extension().map(|e| e == "py").unwrap_or(false);
    if is_python {
        let mut cmd = Command::new(python()?);
        cmd.arg(script);
        Some(cmd)
    } else {
        Some(Command::new(script))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[cfg(unix)]
    fn write_script(dir: &Path, name: &str, body: &str) {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[tokio::test]
    async fn missing_script_is_a_failed_outcome() {
        let dir = TempDir::new().unwrap();
        let runner = ScriptRunner::new(dir.path(), Duration::from_secs(5));
        let out = runner
            .run("definitely-not-a-script-xyz.py", &[], dir.path())
            .await;
        assert!(!out.ok);
        assert!(out.output.contains("script not found"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn success_returns_stdout() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "hello.sh", "echo indexed");
        let runner = ScriptRunner::new(dir.path(), Duration::from_secs(5));
        let out = runner.run("hello.sh", &[], dir.path()).await;
        assert!(out.ok);
        assert_eq!(out.output.trim(), "indexed");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failure_returns_stderr() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "bad.sh", "echo boom >&2; exit 2");
        let runner = ScriptRunner::new(dir.path(), Duration::from_secs(5));
        let out = runner.run("bad.sh", &[], dir.path()).await;
        assert!(!out.ok);
        assert!(out.output.contains("boom"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_is_a_failed_outcome() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "slow.sh", "sleep 5");
        let runner = ScriptRunner::new(dir.path(), Duration::from_millis(200));
        let out = runner.run("slow.sh", &[], dir.path()).await;
        assert!(!out.ok);
        assert!(out.output.contains("timed out"));
    }
}
