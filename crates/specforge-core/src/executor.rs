//! Runs one phase to a durable, checked artifact.
//!
//! Every phase goes through the same loop:
//!
//! 1. missing prerequisites fail immediately, without attempts;
//! 2. an artifact that already passes its check is reused (unless refreshing);
//! 3. up to `max_attempts` tries, each followed by the content check and,
//!    when the check fails, one deterministic auto-fix and a re-check;
//! 4. on exhaustion a critical phase fails, a degradable one writes a
//!    placeholder carrying `<marker>: true` and reports success.

use serde_json::{Map, Value};

use crate::driver::AgentDriver;
use crate::script::ScriptRunner;
use crate::step::{DeterministicStep, StepContext};
use crate::store::ArtifactStore;
use crate::types::PhaseResult;
use crate::validate::{render_failures, ArtifactKind, Validator};

// ---------------------------------------------------------------------------
// Phase definition
// ---------------------------------------------------------------------------

/// Written in place of the artifact when a degradable phase gives up.
#[derive(Debug, Clone, PartialEq)]
pub struct Placeholder {
    pub marker: String,
    pub base: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Criticality {
    Critical,
    Degradable(Placeholder),
}

/// Agent invocation: a prompt template plus the phase's context block.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentTask {
    pub template: &'static str,
    pub context: String,
    /// Append the current `validate_all` failures and the directory listing.
    pub validation_report: bool,
}

impl AgentTask {
    pub fn new(template: &'static str) -> Self {
        Self {
            template,
            context: String::new(),
            validation_report: false,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_validation_report(mut self) -> Self {
        self.validation_report = true;
        self
    }
}

pub enum Strategy {
    Deterministic(Box<dyn DeterministicStep>),
    Agent(AgentTask),
    /// One deterministic try outside the attempt budget, then the agent.
    DeterministicThenAgent(Box<dyn DeterministicStep>, AgentTask),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentCheck {
    /// The primary artifact exists.
    Exists,
    /// The primary artifact is a JSON object with these keys.
    JsonKeys(Vec<&'static str>),
    /// `key` holds an array of at least `min` items. Reports the length.
    MinItems {
        key: &'static str,
        min: usize,
        message: String,
    },
    /// At least one of these keys is `true`.
    AnyFlag(Vec<&'static str>),
    Validator(ArtifactKind),
    ValidateAll,
    AllOf(Vec<ContentCheck>),
}

type Secondary = Box<dyn Fn(&ArtifactStore) -> crate::Result<()> + Send + Sync>;

pub struct PhaseDef {
    pub name: String,
    pub artifact: Option<&'static str>,
    pub criticality: Criticality,
    pub strategy: Strategy,
    pub check: ContentCheck,
    pub auto_fix: Option<ArtifactKind>,
    /// Artifacts that must exist before the phase may start, with the
    /// message reported when one is missing.
    pub requires: Vec<(&'static str, String)>,
    /// Written as the artifact when a clean agent turn left none behind.
    pub fill_missing: Option<Value>,
    /// Idempotent follow-up run whenever the phase completes.
    pub secondary: Option<Secondary>,
}

impl PhaseDef {
    pub fn new(name: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            name: name.into(),
            artifact: None,
            criticality: Criticality::Critical,
            strategy,
            check: ContentCheck::Exists,
            auto_fix: None,
            requires: Vec::new(),
            fill_missing: None,
            secondary: None,
        }
    }

    pub fn artifact(mut self, name: &'static str) -> Self {
        self.artifact = Some(name);
        self
    }

    pub fn check(mut self, check: ContentCheck) -> Self {
        self.check = check;
        self
    }

    pub fn degradable(mut self, marker: impl Into<String>, base: Value) -> Self {
        self.criticality = Criticality::Degradable(Placeholder {
            marker: marker.into(),
            base,
        });
        self
    }

    pub fn auto_fix(mut self, kind: ArtifactKind) -> Self {
        self.auto_fix = Some(kind);
        self
    }

    pub fn requires(mut self, artifact: &'static str, message: impl Into<String>) -> Self {
        self.requires.push((artifact, message.into()));
        self
    }

    pub fn fill_missing(mut self, value: Value) -> Self {
        self.fill_missing = Some(value);
        self
    }

    pub fn secondary<F>(mut self, f: F) -> Self
    where
        F: Fn(&ArtifactStore) -> crate::Result<()> + Send + Sync + 'static,
    {
        self.secondary = Some(Box::new(f));
        self
    }
}

// ---------------------------------------------------------------------------
// Content checks
// ---------------------------------------------------------------------------

impl ContentCheck {
    /// `Ok` with an optional derived count when the check passes, otherwise
    /// the reason it failed.
    pub fn evaluate(
        &self,
        store: &ArtifactStore,
        artifact: Option<&str>,
    ) -> Result<Option<usize>, String> {
        match self {
            ContentCheck::Exists => {
                let name = require_name(artifact)?;
                if store.exists(name) {
                    Ok(None)
                } else {
                    Err(format!("{name} not found"))
                }
            }
            ContentCheck::JsonKeys(keys) => {
                let map = read_object(store, require_name(artifact)?)?;
                let missing: Vec<&str> = keys
                    .iter()
                    .copied()
                    .filter(|k| !map.contains_key(*k))
                    .collect();
                if missing.is_empty() {
                    Ok(None)
                } else {
                    Err(format!("Missing required fields: {missing:?}"))
                }
            }
            ContentCheck::MinItems { key, min, message } => {
                let map = read_object(store, require_name(artifact)?)?;
                let count = map.get(*key).and_then(Value::as_array).map_or(0, Vec::len);
                if count < *min {
                    Err(message.clone())
                } else {
                    Ok(Some(count))
                }
            }
            ContentCheck::AnyFlag(keys) => {
                let map = read_object(store, require_name(artifact)?)?;
                let set = keys
                    .iter()
                    .any(|k| map.get(*k).and_then(Value::as_bool).unwrap_or(false));
                if set {
                    Ok(None)
                } else {
                    Err(format!("none of {keys:?} is set"))
                }
            }
            ContentCheck::Validator(kind) => {
                let result = Validator::new(store).validate(*kind);
                if result.valid {
                    Ok(None)
                } else {
                    Err(format!("{} invalid: {}", kind, result.errors.join("; ")))
                }
            }
            ContentCheck::ValidateAll => {
                let failed: Vec<String> = Validator::new(store)
                    .validate_all()
                    .into_iter()
                    .filter(|r| !r.valid)
                    .map(|r| format!("{}: {}", r.checkpoint, r.errors.join("; ")))
                    .collect();
                if failed.is_empty() {
                    Ok(None)
                } else {
                    Err(failed.join(" | "))
                }
            }
            ContentCheck::AllOf(checks) => {
                let mut items = None;
                for check in checks {
                    if let Some(n) = check.evaluate(store, artifact)? {
                        items = Some(n);
                    }
                }
                Ok(items)
            }
        }
    }
}

fn require_name(artifact: Option<&str>) -> Result<&str, String> {
    artifact.ok_or_else(|| "check needs a primary artifact".to_string())
}

fn read_object(store: &ArtifactStore, name: &str) -> Result<Map<String, Value>, String> {
    if !store.exists(name) {
        return Err(format!("{name} not found"));
    }
    match store.read_json(name) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(format!("Invalid JSON: {name} is not an object")),
        Err(crate::ForgeError::CorruptArtifact { reason, .. }) => {
            Err(format!("Invalid JSON: {reason}"))
        }
        Err(e) => Err(e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// PhaseExecutor
// ---------------------------------------------------------------------------

pub struct PhaseExecutor<'a> {
    driver: &'a AgentDriver<'a>,
    scripts: &'a ScriptRunner,
    max_attempts: u32,
    refresh: bool,
}

impl<'a> PhaseExecutor<'a> {
    pub fn new(driver: &'a AgentDriver<'a>, scripts: &'a ScriptRunner, max_attempts: u32) -> Self {
        Self {
            driver,
            scripts,
            max_attempts: max_attempts.max(1),
            refresh: false,
        }
    }

    /// Regenerate artifacts even when they already pass their checks.
    pub fn refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn execute(&self, store: &ArtifactStore, def: &PhaseDef) -> PhaseResult {
        let phase = def.name.as_str();

        for (artifact, message) in &def.requires {
            if !store.exists(artifact) {
                tracing::error!(phase, artifact = *artifact, "missing prerequisite");
                return PhaseResult::failed(phase, vec![message.clone()], 0);
            }
        }

        let reuse = !(self.refresh && def.artifact.is_some());
        if reuse && def.artifact.map_or(true, |a| store.exists(a)) {
            if let Ok(items) = def.check.evaluate(store, def.artifact) {
                if let Err(e) = self.finish(store, def) {
                    return PhaseResult::failed(phase, vec![e], 0);
                }
                tracing::info!(phase, "already complete");
                return PhaseResult::ok(phase, self.outputs(store, def), 0).with_items(items);
            }
        }

        let mut errors = Vec::new();

        if let Strategy::DeterministicThenAgent(step, _) = &def.strategy {
            match self.run_step(store, step.as_ref()).await {
                Ok(()) => match self.verify(store, def) {
                    Ok(items) => return self.succeed(store, def, 0, errors, items),
                    Err(e) => errors.push(format!("Deterministic step: {e}")),
                },
                Err(e) => errors.push(format!("Deterministic step: {e}")),
            }
            tracing::info!(phase, "deterministic step did not finish the phase, falling back to agent");
        }

        for attempt in 1..=self.max_attempts {
            tracing::info!(phase, attempt, max = self.max_attempts, "running phase");
            match self.attempt(store, def).await {
                Ok(items) => return self.succeed(store, def, attempt - 1, errors, items),
                Err(e) => {
                    tracing::warn!(phase, attempt, error = %e, "attempt failed");
                    errors.push(format!("Attempt {attempt}: {e}"));
                }
            }
        }

        let retries = self.max_attempts - 1;
        match &def.criticality {
            Criticality::Critical => {
                tracing::error!(phase, attempts = self.max_attempts, "phase failed");
                PhaseResult::failed(phase, errors, retries)
            }
            Criticality::Degradable(placeholder) => {
                self.degrade(store, def, placeholder, errors, retries)
            }
        }
    }

    async fn attempt(&self, store: &ArtifactStore, def: &PhaseDef) -> Result<Option<usize>, String> {
        match &def.strategy {
            Strategy::Deterministic(step) => {
                self.run_step(store, step.as_ref()).await?;
            }
            Strategy::Agent(task) | Strategy::DeterministicThenAgent(_, task) => {
                let context = self.agent_context(store, task);
                self.driver
                    .run(task.template, store.dir(), &context)
                    .await
                    .map_err(|e| e.to_string())?;
                if let Some(artifact) = def.artifact {
                    if !store.exists(artifact) {
                        match &def.fill_missing {
                            Some(value) => {
                                store.write_json(artifact, value).map_err(|e| e.to_string())?;
                                tracing::warn!(phase = %def.name, artifact, "agent wrote no artifact; recorded completion marker");
                            }
                            None => return Err(format!("Agent did not create {artifact}")),
                        }
                    }
                }
            }
        }
        self.verify(store, def)
    }

    async fn run_step(&self, store: &ArtifactStore, step: &dyn DeterministicStep) -> Result<(), String> {
        let cx = StepContext {
            store,
            project_dir: self.driver.project_dir(),
            scripts: self.scripts,
        };
        step.run(&cx).await
    }

    /// Content check, with one auto-fix and re-check on failure.
    fn verify(&self, store: &ArtifactStore, def: &PhaseDef) -> Result<Option<usize>, String> {
        match def.check.evaluate(store, def.artifact) {
            Ok(items) => Ok(items),
            Err(e) => {
                let Some(kind) = def.auto_fix else {
                    return Err(e);
                };
                match Validator::new(store).auto_fix(kind) {
                    Ok(true) => {
                        tracing::info!(phase = %def.name, %kind, "auto-fix applied");
                        def.check.evaluate(store, def.artifact)
                    }
                    Ok(false) => Err(e),
                    Err(fix_err) => Err(format!("{e} (auto-fix failed: {fix_err})")),
                }
            }
        }
    }

    fn agent_context(&self, store: &ArtifactStore, task: &AgentTask) -> String {
        let mut ctx = task.context.clone();
        if task.validation_report {
            let results = Validator::new(store).validate_all();
            ctx.push_str("\n## Validation Errors to Fix\n\n");
            ctx.push_str(&render_failures(&results));
            ctx.push_str("\n## Files in Spec Directory\n\n");
            for name in list_files(store) {
                ctx.push_str(&format!("- {name}\n"));
            }
        }
        ctx
    }

    fn finish(&self, store: &ArtifactStore, def: &PhaseDef) -> Result<(), String> {
        match &def.secondary {
            Some(f) => f(store).map_err(|e| e.to_string()),
            None => Ok(()),
        }
    }

    fn succeed(
        &self,
        store: &ArtifactStore,
        def: &PhaseDef,
        retries: u32,
        errors: Vec<String>,
        items: Option<usize>,
    ) -> PhaseResult {
        if let Err(e) = self.finish(store, def) {
            let mut errors = errors;
            errors.push(e);
            return PhaseResult::failed(def.name.as_str(), errors, retries);
        }
        tracing::info!(phase = %def.name, retries, "phase complete");
        let mut result = PhaseResult::ok(def.name.as_str(), self.outputs(store, def), retries)
            .with_items(items);
        result.errors = errors;
        result
    }

    fn degrade(
        &self,
        store: &ArtifactStore,
        def: &PhaseDef,
        placeholder: &Placeholder,
        errors: Vec<String>,
        retries: u32,
    ) -> PhaseResult {
        let Some(artifact) = def.artifact else {
            return PhaseResult::failed(def.name.as_str(), errors, retries);
        };
        let mut body = match &placeholder.base {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        body.insert(placeholder.marker.clone(), Value::Bool(true));
        body.insert("errors".to_string(), Value::from(errors.clone()));
        body.insert(
            "created_at".to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
        if let Err(e) = store.write_json(artifact, &Value::Object(body)) {
            let mut errors = errors;
            errors.push(format!("could not write placeholder: {e}"));
            return PhaseResult::failed(def.name.as_str(), errors, retries);
        }
        tracing::warn!(phase = %def.name, marker = %placeholder.marker, "phase degraded to placeholder");
        let mut result = PhaseResult::ok(def.name.as_str(), vec![store.path(artifact)], retries);
        result.errors = errors;
        result.degraded = true;
        result
    }

    fn outputs(&self, store: &ArtifactStore, def: &PhaseDef) -> Vec<std::path::PathBuf> {
        def.artifact
            .map(|a| vec![store.path(a)])
            .unwrap_or_default()
    }
}

fn list_files(store: &ArtifactStore) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(store.dir())
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .filter(|e| e.path().is_file())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
