//! Spec creation: discovery, requirements, a complexity assessment that
//! picks the remaining phases, then those phases in order.

use std::path::Path;

use serde_json::{json, Value};

use super::{project_index_def, PhaseTracker, PipelineEnv, PipelineKind, RunSummary};
use crate::complexity::{
    parse_agent_assessment, AgentAssessor, AssessmentInput, Assessor, ComplexityAssessment,
    HeuristicAnalyzer, TryAgentThenHeuristic,
};
use crate::driver::AgentDriver;
use crate::error::{ForgeError, Result};
use crate::executor::{AgentTask, ContentCheck, PhaseDef, PhaseExecutor, Strategy};
use crate::paths;
use crate::plan::minimal_plan;
use crate::step::{RunScript, WriteJson};
use crate::store::ArtifactStore;
use crate::types::{Complexity, PhaseName, PhaseResult, ProjectIndex, Requirements};
use crate::validate::{ArtifactKind, Validator};

/// Source of requirements when they are gathered interactively.
pub trait RequirementsPrompter: Send + Sync {
    /// `Ok(None)` when the user cancels.
    fn gather(&self, task: Option<&str>) -> std::io::Result<Option<Requirements>>;
}

#[derive(Debug, Clone, Default)]
pub struct SpecOptions {
    pub task: Option<String>,
    /// Resume an existing spec directory instead of creating a new one.
    pub spec_dir: Option<std::path::PathBuf>,
    pub complexity_override: Option<Complexity>,
    pub use_agent_assessment: bool,
    pub dev_mode: bool,
}

pub struct SpecPipeline<'e> {
    env: &'e PipelineEnv<'e>,
    prompter: Option<&'e dyn RequirementsPrompter>,
}

impl<'e> SpecPipeline<'e> {
    pub fn new(env: &'e PipelineEnv<'e>) -> Self {
        Self {
            env,
            prompter: None,
        }
    }

    pub fn with_prompter(mut self, prompter: &'e dyn RequirementsPrompter) -> Self {
        self.prompter = Some(prompter);
        self
    }

    /// The `--continue` directory, or a fresh `NNN-pending` one.
    pub fn open_task_dir(&self, opts: &SpecOptions) -> Result<ArtifactStore> {
        match &opts.spec_dir {
            Some(dir) => {
                let dir = if dir.is_absolute() {
                    dir.clone()
                } else {
                    paths::specs_dir(&self.env.project_dir, opts.dev_mode).join(dir)
                };
                if !dir.is_dir() {
                    return Err(ForgeError::SpecNotFound(dir));
                }
                ArtifactStore::open(dir)
            }
            None => {
                let specs = paths::specs_dir(&self.env.project_dir, opts.dev_mode);
                ArtifactStore::open(paths::next_spec_dir(&specs))
            }
        }
    }

    pub async fn run(&self, opts: &SpecOptions) -> Result<RunSummary> {
        let mut store = self.open_task_dir(opts)?;
        tracing::info!(dir = %store.dir().display(), "spec directory");

        if let Some(task) = opts.task.as_deref() {
            preliminary(task, opts.complexity_override);
        }

        let driver = self.env.driver();
        let exec = PhaseExecutor::new(&driver, &self.env.scripts, self.env.max_attempts);
        let mut tracker = PhaseTracker::new();

        tracker.begin(PhaseName::Discovery.as_str());
        let def = project_index_def(
            PhaseName::Discovery.as_str(),
            &self.env.project_dir,
            &store,
        );
        if !tracker.record(exec.execute(&store, &def).await) {
            return Ok(tracker.finish(PipelineKind::Spec, store.dir(), Vec::new()));
        }

        tracker.begin(PhaseName::Requirements.as_str());
        let result = match self.requirements_def(&store, opts) {
            Ok(def) => exec.execute(&store, &def).await,
            Err(msg) => PhaseResult::failed(PhaseName::Requirements.as_str(), vec![msg], 0),
        };
        if !tracker.record(result) {
            return Ok(tracker.finish(PipelineKind::Spec, store.dir(), Vec::new()));
        }
        let requirements: Requirements = store.read_as(paths::REQUIREMENTS)?;

        store.rename_from_placeholder(&paths::generate_spec_name(
            &requirements.task_description,
        ))?;

        tracker.begin(PhaseName::ComplexityAssessment.as_str());
        let assessment = match self.assess(&driver, &store, &requirements, opts).await {
            Ok((assessment, result)) => {
                tracker.record(result);
                assessment
            }
            Err(result) => {
                tracker.record(result);
                return Ok(tracker.finish(PipelineKind::Spec, store.dir(), Vec::new()));
            }
        };

        let phases = assessment.phases_to_run();
        tracing::info!(complexity = %assessment.complexity, phases = ?phases, "phases selected");

        for name in &phases {
            let phase: PhaseName = match name.parse() {
                Ok(p) => p,
                Err(_) => {
                    tracing::warn!(phase = %name, "skipping unknown phase");
                    continue;
                }
            };
            let Some(def) = phase_def(phase, &store, &requirements) else {
                continue;
            };
            tracker.begin(phase.as_str());
            if !tracker.record(exec.execute(&store, &def).await) {
                break;
            }
        }

        let details = vec![
            ("complexity".to_string(), assessment.complexity.to_string()),
            (
                "confidence".to_string(),
                format!("{:.0}%", assessment.confidence * 100.0),
            ),
            ("reasoning".to_string(), assessment.reasoning.clone()),
            ("phases".to_string(), phases.join(", ")),
        ];
        Ok(tracker.finish(PipelineKind::Spec, store.dir(), details))
    }

    fn requirements_def(
        &self,
        store: &ArtifactStore,
        opts: &SpecOptions,
    ) -> std::result::Result<PhaseDef, String> {
        // A valid file is reused by the executor; only gather when it is not.
        let value = if Validator::new(store).validate(ArtifactKind::Requirements).valid {
            Value::Null
        } else {
            let req = self.gather(opts)?;
            serde_json::to_value(&req).map_err(|e| e.to_string())?
        };
        Ok(PhaseDef::new(
            PhaseName::Requirements.as_str(),
            Strategy::Deterministic(Box::new(WriteJson {
                artifact: paths::REQUIREMENTS,
                value,
            })),
        )
        .artifact(paths::REQUIREMENTS)
        .check(ContentCheck::Validator(ArtifactKind::Requirements)))
    }

    fn gather(&self, opts: &SpecOptions) -> std::result::Result<Requirements, String> {
        let task = opts.task.as_deref().filter(|t| !t.trim().is_empty());
        match self.prompter {
            Some(prompter) => match prompter.gather(task) {
                Ok(Some(req)) => Ok(req),
                Ok(None) => Err("User cancelled".to_string()),
                Err(e) => Err(format!("Failed to read requirements: {e}")),
            },
            None => task
                .map(Requirements::from_task)
                .ok_or_else(|| "No task description provided".to_string()),
        }
    }

    /// Second, authoritative classification with the full requirements.
    /// An assessment already on disk is reused unless an override is given.
    async fn assess(
        &self,
        driver: &AgentDriver<'_>,
        store: &ArtifactStore,
        requirements: &Requirements,
        opts: &SpecOptions,
    ) -> std::result::Result<(ComplexityAssessment, PhaseResult), PhaseResult> {
        let phase = PhaseName::ComplexityAssessment.as_str();
        let output = vec![store.path(paths::COMPLEXITY_ASSESSMENT)];

        if opts.complexity_override.is_none() {
            if let Some(existing) = load_assessment(store) {
                tracing::info!(complexity = %existing.complexity, "already complete");
                return Ok((existing, PhaseResult::ok(phase, output, 0)));
            }
        }

        let index = store.read_as::<ProjectIndex>(paths::PROJECT_INDEX).ok();
        let input = AssessmentInput {
            task: &requirements.task_description,
            requirements: Some(requirements),
            project_index: index.as_ref(),
        };

        let mut retries = 0;
        let assessment = match opts.complexity_override {
            Some(c) => ComplexityAssessment::manual_override(c),
            None if opts.use_agent_assessment => {
                let assessor = TryAgentThenHeuristic::new(
                    AgentAssessor::new(driver, store),
                    self.env.fallback_policy,
                );
                let mut errors = Vec::new();
                let mut found = None;
                for attempt in 1..=self.env.max_attempts.max(1) {
                    match assessor.assess(&input).await {
                        Ok(a) => {
                            found = Some(a);
                            break;
                        }
                        Err(e) => {
                            tracing::warn!(phase, attempt, error = %e, "attempt failed");
                            errors.push(format!("Attempt {attempt}: {e}"));
                            retries = attempt;
                        }
                    }
                }
                match found {
                    Some(a) => a,
                    None => {
                        let retries = errors.len().saturating_sub(1) as u32;
                        return Err(PhaseResult::failed(phase, errors, retries));
                    }
                }
            }
            None => HeuristicAnalyzer.analyze(&input),
        };

        let persisted = assessment.persisted(opts.dev_mode);
        if let Err(e) = store.write_json(paths::COMPLEXITY_ASSESSMENT, &persisted) {
            return Err(PhaseResult::failed(phase, vec![e.to_string()], retries));
        }
        tracing::info!(
            complexity = %persisted.complexity,
            confidence = persisted.confidence,
            source = ?persisted.source,
            "complexity assessed"
        );
        Ok((persisted, PhaseResult::ok(phase, output, retries)))
    }
}

/// Logged only; the assessment after requirements supersedes it.
fn preliminary(task: &str, complexity_override: Option<Complexity>) {
    let assessment = match complexity_override {
        Some(c) => ComplexityAssessment::manual_override(c),
        None => HeuristicAnalyzer.analyze(&AssessmentInput {
            task,
            requirements: None,
            project_index: None,
        }),
    };
    tracing::info!(
        complexity = %assessment.complexity,
        confidence = assessment.confidence,
        "preliminary assessment"
    );
}

fn load_assessment(store: &ArtifactStore) -> Option<ComplexityAssessment> {
    let raw = store.read_json(paths::COMPLEXITY_ASSESSMENT).ok()?;
    if raw.get("source").is_some() {
        serde_json::from_value(raw).ok()
    } else {
        parse_agent_assessment(&raw).ok()
    }
}

// ---------------------------------------------------------------------------
// Phase definitions
// ---------------------------------------------------------------------------

fn file_line(label: &str, path: &Path) -> String {
    format!("**{label}**: {}\n", path.display())
}

pub(crate) fn minimal_context(task: &str, services: &[String]) -> Value {
    json!({
        "task_description": task,
        "scoped_services": services,
        "files_to_modify": [],
        "files_to_reference": [],
        "created_at": chrono::Utc::now().to_rfc3339(),
    })
}

/// Plan and context for a quick spec whose agent wrote only `spec.md`.
fn quick_spec_extras(store: &ArtifactStore, task: &str) -> Result<()> {
    if !store.exists(paths::IMPLEMENTATION_PLAN) {
        let name = store
            .dir()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        store.write_json(paths::IMPLEMENTATION_PLAN, &minimal_plan(&name, task))?;
        tracing::info!("wrote minimal implementation plan");
    }
    if !store.exists(paths::CONTEXT) {
        store.write_json(paths::CONTEXT, &minimal_context(task, &[]))?;
    }
    Ok(())
}

/// `None` for the phases that run ahead of the assessment.
fn phase_def(phase: PhaseName, store: &ArtifactStore, req: &Requirements) -> Option<PhaseDef> {
    let task = req.task_description.clone();
    let def = match phase {
        PhaseName::QuickSpec => PhaseDef::new(
            phase.as_str(),
            Strategy::Agent(AgentTask::new("spec_quick").with_context(format!(
                "**Task**: {task}\n**Complexity**: SIMPLE (1-2 files expected)\n\n\
                 This is a SIMPLE task. Create a minimal spec and implementation plan directly."
            ))),
        )
        .artifact(paths::SPEC_MD)
        .secondary(move |store| quick_spec_extras(store, &task)),

        PhaseName::Research => {
            let context = file_line("Requirements File", &store.path(paths::REQUIREMENTS))
                + &file_line("Research Output", &store.path(paths::RESEARCH));
            PhaseDef::new(
                phase.as_str(),
                Strategy::Agent(AgentTask::new("spec_researcher").with_context(context)),
            )
            .artifact(paths::RESEARCH)
            .check(ContentCheck::JsonKeys(Vec::new()))
            .fill_missing(json!({
                "integrations_researched": [],
                "research_completed": true,
                "created_at": chrono::Utc::now().to_rfc3339(),
            }))
            .degradable("research_failed", json!({ "integrations_researched": [] }))
        }

        PhaseName::Context => {
            let mut args = vec![
                "--task".to_string(),
                task.clone(),
                "--output".to_string(),
                store.path(paths::CONTEXT).display().to_string(),
            ];
            if !req.services_involved.is_empty() {
                args.push("--services".to_string());
                args.push(req.services_involved.join(","));
            }
            PhaseDef::new(
                phase.as_str(),
                Strategy::Deterministic(Box::new(RunScript {
                    script: "context.py",
                    args,
                })),
            )
            .artifact(paths::CONTEXT)
            .check(ContentCheck::Validator(ArtifactKind::Context))
            .auto_fix(ArtifactKind::Context)
            .degradable(
                "context_failed",
                minimal_context(&task, &req.services_involved),
            )
        }

        PhaseName::SpecWriting => {
            let mut context = file_line("Requirements File", &store.path(paths::REQUIREMENTS))
                + &file_line("Context File", &store.path(paths::CONTEXT));
            if store.exists(paths::RESEARCH) {
                context += &file_line("Research File", &store.path(paths::RESEARCH));
            }
            context += &file_line("Output File", &store.path(paths::SPEC_MD));
            PhaseDef::new(
                phase.as_str(),
                Strategy::Agent(AgentTask::new("spec_writer").with_context(context)),
            )
            .artifact(paths::SPEC_MD)
            .check(ContentCheck::Validator(ArtifactKind::SpecDocument))
        }

        PhaseName::SelfCritique => {
            let mut context = file_line("Spec File", &store.path(paths::SPEC_MD));
            if store.exists(paths::RESEARCH) {
                context += &file_line("Research File", &store.path(paths::RESEARCH));
            }
            context += &file_line("Critique Output", &store.path(paths::CRITIQUE_REPORT));
            PhaseDef::new(
                phase.as_str(),
                Strategy::Agent(AgentTask::new("spec_critic").with_context(context)),
            )
            .artifact(paths::CRITIQUE_REPORT)
            .requires(paths::SPEC_MD, "spec.md does not exist")
            .check(ContentCheck::AllOf(vec![
                ContentCheck::AnyFlag(vec!["issues_fixed", "no_issues_found"]),
                ContentCheck::Validator(ArtifactKind::SpecDocument),
            ]))
            .fill_missing(json!({
                "issues_found": [],
                "no_issues_found": true,
                "critique_summary": "Agent completed without explicit issues",
            }))
            .degradable("critique_failed", json!({ "issues_found": [] }))
        }

        PhaseName::Planning => {
            let context = file_line("Spec File", &store.path(paths::SPEC_MD))
                + &file_line("Output File", &store.path(paths::IMPLEMENTATION_PLAN));
            PhaseDef::new(
                phase.as_str(),
                Strategy::DeterministicThenAgent(
                    Box::new(RunScript {
                        script: "planner.py",
                        args: vec![
                            "--spec-dir".to_string(),
                            store.dir().display().to_string(),
                        ],
                    }),
                    AgentTask::new("planner").with_context(context),
                ),
            )
            .artifact(paths::IMPLEMENTATION_PLAN)
            .check(ContentCheck::Validator(ArtifactKind::ImplementationPlan))
            .auto_fix(ArtifactKind::ImplementationPlan)
        }

        PhaseName::Validation => PhaseDef::new(
            phase.as_str(),
            Strategy::Agent(AgentTask::new("validation_fixer").with_validation_report()),
        )
        .check(ContentCheck::ValidateAll),

        // Already run before the assessment.
        PhaseName::Discovery | PhaseName::Requirements | PhaseName::ComplexityAssessment => {
            return None;
        }
    };
    Some(def)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ForgeConfig;
    use crate::test_support::FnGateway;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Cancel;

    impl RequirementsPrompter for Cancel {
        fn gather(&self, _task: Option<&str>) -> std::io::Result<Option<Requirements>> {
            Ok(None)
        }
    }

    fn seeded_project() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".specforge")).unwrap();
        std::fs::write(
            dir.path().join(".specforge/project_index.json"),
            r#"{"project_type":"single","services":{"web":{"language":"typescript"}}}"#,
        )
        .unwrap();
        dir
    }

    #[tokio::test]
    async fn cancelled_prompter_fails_requirements() {
        let dir = seeded_project();
        let gw = FnGateway::new(|_| Ok(()));
        let env = PipelineEnv::from_config(dir.path(), &gw, &ForgeConfig::default());
        let summary = SpecPipeline::new(&env)
            .with_prompter(&Cancel)
            .run(&SpecOptions::default())
            .await
            .unwrap();
        assert!(!summary.success());
        let failed = summary.failed_phase().unwrap();
        assert_eq!(failed.phase, "requirements");
        assert_eq!(failed.errors, vec!["User cancelled"]);
        assert_eq!(summary.phases_run(), vec!["discovery", "requirements"]);
    }

    #[tokio::test]
    async fn missing_continue_dir_is_an_error() {
        let dir = seeded_project();
        let gw = FnGateway::new(|_| Ok(()));
        let env = PipelineEnv::from_config(dir.path(), &gw, &ForgeConfig::default());
        let opts = SpecOptions {
            spec_dir: Some("042-nope".into()),
            ..SpecOptions::default()
        };
        let err = SpecPipeline::new(&env).run(&opts).await.unwrap_err();
        assert!(matches!(err, ForgeError::SpecNotFound(_)));
    }

    #[tokio::test]
    async fn override_skips_the_agent_assessor() {
        let dir = seeded_project();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let gw = FnGateway::new(move |prompt| {
            if prompt.starts_with("Assess the complexity") {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            Err(specforge_agent::AgentError::Process("offline".into()))
        });
        let env = PipelineEnv::from_config(dir.path(), &gw, &ForgeConfig::default());
        let opts = SpecOptions {
            task: Some("Build a payments platform".into()),
            complexity_override: Some(Complexity::Simple),
            use_agent_assessment: true,
            ..SpecOptions::default()
        };
        let summary = SpecPipeline::new(&env).run(&opts).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(summary.detail("complexity"), Some("simple"));
        // quick_spec fails: the agent is offline.
        assert_eq!(summary.failed_phase().unwrap().phase, "quick_spec");
        let store = ArtifactStore::open(summary.task_dir.clone()).unwrap();
        let persisted = store.read_json(paths::COMPLEXITY_ASSESSMENT).unwrap();
        assert_eq!(persisted["source"], "override");
        assert_eq!(
            persisted["phases_to_run"],
            json!(["discovery", "quick_spec", "validation"])
        );
    }

    #[test]
    fn legacy_agent_assessment_file_is_reused() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        store
            .write_json(
                paths::COMPLEXITY_ASSESSMENT,
                &json!({"complexity": "complex", "reasoning": "many services"}),
            )
            .unwrap();
        let a = load_assessment(&store).unwrap();
        assert_eq!(a.complexity, Complexity::Complex);
        assert_eq!(a.confidence, 0.75);
    }
}
