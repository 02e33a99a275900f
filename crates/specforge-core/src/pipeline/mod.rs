//! Pipeline orchestrators.
//!
//! A pipeline is an ordered list of phases run through the
//! [`PhaseExecutor`](crate::executor::PhaseExecutor). The first unsuccessful
//! phase stops the run; re-running the same pipeline against the same task
//! directory re-enters at the first incomplete phase, since completed phases
//! are no-ops.

pub mod ideation;
pub mod roadmap;
pub mod spec;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use specforge_agent::AgentGateway;

use crate::config::{FallbackPolicy, ForgeConfig, IdeationSettings};
use crate::driver::AgentDriver;
use crate::executor::{ContentCheck, PhaseDef, Strategy};
use crate::paths;
use crate::prompt::PromptLibrary;
use crate::script::ScriptRunner;
use crate::step::{CopyFile, OrElse, RunScript};
use crate::store::ArtifactStore;
use crate::types::PhaseResult;

pub use ideation::{IdeationCategory, IdeationOptions, IdeationPipeline};
pub use roadmap::{RoadmapOptions, RoadmapPipeline};
pub use spec::{RequirementsPrompter, SpecOptions, SpecPipeline};

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Everything a pipeline needs from the outside world.
pub struct PipelineEnv<'a> {
    pub project_dir: PathBuf,
    pub gateway: &'a dyn AgentGateway,
    pub prompts: PromptLibrary,
    pub scripts: ScriptRunner,
    pub model: Option<String>,
    pub max_attempts: u32,
    pub fallback_policy: FallbackPolicy,
    pub ideation: IdeationSettings,
}

impl<'a> PipelineEnv<'a> {
    pub fn from_config(
        project_dir: impl Into<PathBuf>,
        gateway: &'a dyn AgentGateway,
        config: &ForgeConfig,
    ) -> Self {
        let project_dir = project_dir.into();
        Self {
            prompts: PromptLibrary::new(config.prompts_dir(&project_dir)),
            scripts: ScriptRunner::new(
                config.scripts_dir(&project_dir),
                Duration::from_secs(config.script_timeout_secs),
            ),
            model: Some(config.model.clone()),
            max_attempts: config.max_attempts,
            fallback_policy: config.fallback_policy,
            ideation: config.ideation.clone(),
            project_dir,
            gateway,
        }
    }

    pub(crate) fn driver(&self) -> AgentDriver<'_> {
        AgentDriver::new(
            self.gateway,
            &self.prompts,
            &self.project_dir,
            self.model.clone(),
        )
    }
}

/// Seed `project_index.json` from the shared project index, or run the
/// analyzer when there is none.
pub(crate) fn project_index_def(name: &str, project_dir: &Path, store: &ArtifactStore) -> PhaseDef {
    let output = store.path(paths::PROJECT_INDEX).display().to_string();
    PhaseDef::new(
        name,
        Strategy::Deterministic(Box::new(OrElse {
            first: Box::new(CopyFile {
                from: paths::shared_project_index(project_dir),
                artifact: paths::PROJECT_INDEX,
            }),
            second: Box::new(RunScript {
                script: "analyzer.py",
                args: vec!["--output".to_string(), output],
            }),
        })),
    )
    .artifact(paths::PROJECT_INDEX)
    .check(ContentCheck::JsonKeys(Vec::new()))
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    Spec,
    Roadmap,
    Ideation,
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineKind::Spec => "spec",
            PipelineKind::Roadmap => "roadmap",
            PipelineKind::Ideation => "ideation",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    NotStarted,
    RunningPhase { index: usize },
    Failed { phase: String },
    Completed,
}

/// Records phase results in order and stops the run at the first failure.
#[derive(Debug)]
pub(crate) struct PhaseTracker {
    state: PipelineState,
    results: Vec<PhaseResult>,
}

impl PhaseTracker {
    pub(crate) fn new() -> Self {
        Self {
            state: PipelineState::NotStarted,
            results: Vec::new(),
        }
    }

    pub(crate) fn begin(&mut self, phase: &str) {
        let index = self.results.len();
        tracing::info!(phase, index, "phase started");
        self.state = PipelineState::RunningPhase { index };
    }

    /// Returns `false` once the pipeline has failed.
    pub(crate) fn record(&mut self, result: PhaseResult) -> bool {
        let ok = result.success;
        if !ok {
            tracing::error!(phase = %result.phase, errors = ?result.errors, "phase failed; stopping pipeline");
            self.state = PipelineState::Failed {
                phase: result.phase.clone(),
            };
        }
        self.results.push(result);
        ok
    }

    pub(crate) fn finish(
        mut self,
        kind: PipelineKind,
        task_dir: &Path,
        details: Vec<(String, String)>,
    ) -> RunSummary {
        if !matches!(self.state, PipelineState::Failed { .. }) {
            self.state = PipelineState::Completed;
        }
        RunSummary {
            kind,
            task_dir: task_dir.to_path_buf(),
            state: self.state,
            results: self.results,
            details,
        }
    }
}

/// Outcome of one pipeline invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub kind: PipelineKind,
    pub task_dir: PathBuf,
    pub state: PipelineState,
    pub results: Vec<PhaseResult>,
    /// Pipeline-specific summary lines, in display order.
    pub details: Vec<(String, String)>,
}

impl RunSummary {
    pub fn success(&self) -> bool {
        self.state == PipelineState::Completed
    }

    pub fn total_retries(&self) -> u32 {
        self.results.iter().map(|r| r.retries).sum()
    }

    pub fn files_created(&self) -> Vec<&Path> {
        let mut files: Vec<&Path> = self
            .results
            .iter()
            .flat_map(|r| r.output_files.iter().map(PathBuf::as_path))
            .collect();
        files.sort();
        files.dedup();
        files
    }

    pub fn failed_phase(&self) -> Option<&PhaseResult> {
        self.results.iter().find(|r| !r.success)
    }

    pub fn phases_run(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.phase.as_str()).collect()
    }

    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}
