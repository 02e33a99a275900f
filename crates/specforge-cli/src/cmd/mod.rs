pub mod assess;
pub mod ideation;
pub mod list;
pub mod roadmap;
pub mod spec;
pub mod validate;

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::Context;
use specforge_agent::ClaudeGateway;
use specforge_core::config::ForgeConfig;
use specforge_core::pipeline::{PipelineKind, RunSummary};
use specforge_core::preflight;

use crate::output::{print_json, print_summary};

// ---------------------------------------------------------------------------
// PipelineExit: typed non-zero exits for pipeline commands
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum PipelineExit {
    PhaseFailed {
        kind: PipelineKind,
        phase: String,
        dir: PathBuf,
    },
    Cancelled {
        resume: Option<String>,
    },
}

impl PipelineExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineExit::PhaseFailed { .. } | PipelineExit::Cancelled { .. } => 1,
        }
    }
}

impl std::fmt::Display for PipelineExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineExit::PhaseFailed { kind, phase, dir } => write!(
                f,
                "{kind} pipeline failed at phase '{phase}' (artifacts kept in {})",
                dir.display()
            ),
            PipelineExit::Cancelled { resume: Some(cmd) } => {
                write!(f, "cancelled by user; resume with: {cmd}")
            }
            PipelineExit::Cancelled { resume: None } => f.write_str("cancelled by user"),
        }
    }
}

impl std::error::Error for PipelineExit {}

// ---------------------------------------------------------------------------
// Shared pipeline plumbing
// ---------------------------------------------------------------------------

/// Flags shared by every pipeline command.
pub struct Session {
    pub root: PathBuf,
    pub config: ForgeConfig,
    pub gateway: ClaudeGateway,
    pub json: bool,
}

impl Session {
    /// Preflight checks, then config with CLI overrides applied.
    pub fn open(root: &Path, model: Option<String>, json: bool) -> anyhow::Result<Self> {
        preflight::check_project(root)?;
        preflight::check_credentials(|k| std::env::var(k).ok())?;
        let mut config = ForgeConfig::load(root).context("failed to load config")?;
        if let Some(model) = model {
            config.model = model;
        }
        Ok(Self {
            root: root.to_path_buf(),
            config,
            gateway: ClaudeGateway::default(),
            json,
        })
    }
}

/// Drives a pipeline future to completion on a fresh runtime. `Ok(None)`
/// means Ctrl-C arrived first; dropping the future ends the agent session.
pub fn block_on_pipeline<F>(fut: F) -> anyhow::Result<Option<RunSummary>>
where
    F: Future<Output = specforge_core::Result<RunSummary>>,
{
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        tokio::select! {
            res = fut => Ok(Some(res?)),
            _ = tokio::signal::ctrl_c() => Ok(None),
        }
    })
}

/// Prints the summary and turns a failed run into a [`PipelineExit`].
pub fn report(summary: &RunSummary, json: bool, resume: Option<String>) -> anyhow::Result<()> {
    if json {
        print_json(summary)?;
    } else {
        print_summary(summary);
    }
    match summary.failed_phase() {
        None => Ok(()),
        Some(failed) => {
            if let Some(cmd) = resume {
                eprintln!("Resume with: {cmd}");
            }
            Err(PipelineExit::PhaseFailed {
                kind: summary.kind,
                phase: failed.phase.clone(),
                dir: summary.task_dir.clone(),
            }
            .into())
        }
    }
}

pub fn cancelled(resume: Option<String>) -> anyhow::Error {
    if let Some(cmd) = &resume {
        println!("\nInterrupted. Resume with: {cmd}");
    }
    PipelineExit::Cancelled { resume }.into()
}
