//! Deterministic phase steps: work that needs no agent.

use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use crate::script::ScriptRunner;
use crate::store::ArtifactStore;

/// What a step may touch while it runs.
pub struct StepContext<'a> {
    pub store: &'a ArtifactStore,
    pub project_dir: &'a Path,
    pub scripts: &'a ScriptRunner,
}

/// One deterministic attempt. Failures are reported as strings and count as
/// a failed attempt, the same as a failed agent turn.
pub trait DeterministicStep: Send + Sync {
    fn run<'a>(&'a self, cx: &'a StepContext<'a>) -> BoxFuture<'a, Result<(), String>>;
}

// ---------------------------------------------------------------------------
// CopyFile
// ---------------------------------------------------------------------------

/// Seed an artifact from a file outside the task directory.
pub struct CopyFile {
    pub from: PathBuf,
    pub artifact: &'static str,
}

impl DeterministicStep for CopyFile {
    fn run<'a>(&'a self, cx: &'a StepContext<'a>) -> BoxFuture<'a, Result<(), String>> {
        let res = match cx.store.copy_from(&self.from, self.artifact) {
            Ok(_) => {
                tracing::info!(from = %self.from.display(), artifact = self.artifact, "copied existing artifact");
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        };
        futures::future::ready(res).boxed()
    }
}

// ---------------------------------------------------------------------------
// RunScript
// ---------------------------------------------------------------------------

/// Run a helper script in the project directory.
pub struct RunScript {
    pub script: &'static str,
    pub args: Vec<String>,
}

impl DeterministicStep for RunScript {
    fn run<'a>(&'a self, cx: &'a StepContext<'a>) -> BoxFuture<'a, Result<(), String>> {
        async move {
            let outcome = cx.scripts.run(self.script, &self.args, cx.project_dir).await;
            if outcome.ok {
                Ok(())
            } else {
                Err(truncate(outcome.output.trim(), 500))
            }
        }
        .boxed()
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

// ---------------------------------------------------------------------------
// WriteJson
// ---------------------------------------------------------------------------

/// Persist content computed before the phase started.
pub struct WriteJson {
    pub artifact: &'static str,
    pub value: Value,
}

impl DeterministicStep for WriteJson {
    fn run<'a>(&'a self, cx: &'a StepContext<'a>) -> BoxFuture<'a, Result<(), String>> {
        let res = cx
            .store
            .write_json(self.artifact, &self.value)
            .map(|_| ())
            .map_err(|e| e.to_string());
        futures::future::ready(res).boxed()
    }
}

// ---------------------------------------------------------------------------
// OrElse
// ---------------------------------------------------------------------------

/// Try `first`; run `second` only if it fails.
pub struct OrElse {
    pub first: Box<dyn DeterministicStep>,
    pub second: Box<dyn DeterministicStep>,
}

impl DeterministicStep for OrElse {
    fn run<'a>(&'a self, cx: &'a StepContext<'a>) -> BoxFuture<'a, Result<(), String>> {
        async move {
            match self.first.run(cx).await {
                Ok(()) => Ok(()),
                Err(first) => {
                    tracing::debug!(error = %first, "first step failed, trying fallback");
                    self.second.run(cx).await
                }
            }
        }
        .boxed()
    }
}
