//! Complexity classification.
//!
//! Two strategies produce a [`ComplexityAssessment`]: the deterministic
//! [`HeuristicAnalyzer`] and the [`AgentAssessor`], which asks the agent to
//! write `complexity_assessment.json`. [`TryAgentThenHeuristic`] chains them
//! under an explicit [`FallbackPolicy`]. A manual override beats both.

use std::sync::OnceLock;
use std::time::SystemTime;

use futures::future::BoxFuture;
use futures::FutureExt;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::FallbackPolicy;
use crate::driver::{AgentDriver, TurnError};
use crate::paths;
use crate::store::ArtifactStore;
use crate::types::{Complexity, PhaseName, ProjectIndex, Requirements};

// ---------------------------------------------------------------------------
// Keyword tables
// ---------------------------------------------------------------------------

pub const SIMPLE_KEYWORDS: &[&str] = &[
    "fix", "typo", "update", "change", "rename", "remove", "delete", "adjust", "tweak",
    "correct", "modify", "style", "color", "text", "label", "button", "margin", "padding",
    "font", "size", "hide", "show",
];

pub const COMPLEX_KEYWORDS: &[&str] = &[
    "integrate", "integration", "api", "sdk", "library", "package", "database", "migrate",
    "migration", "docker", "kubernetes", "deploy", "authentication", "oauth", "graphql",
    "websocket", "queue", "cache", "redis", "postgres", "mongo", "elasticsearch", "kafka",
    "rabbitmq", "microservice", "refactor", "architecture", "infrastructure",
];

pub const MULTI_SERVICE_KEYWORDS: &[&str] = &[
    "backend", "frontend", "worker", "service", "api", "client", "server", "database", "queue",
    "cache", "proxy",
];

const SINGLE_SCOPE_PHRASES: &[&str] = &["single", "one file", "one component", "this file"];
const FEATURE_WORDS: &[&str] = &["feature", "add", "implement", "create"];

const INTEGRATION_GROUPS: &[&str] = &[
    r"\b(graphiti|graphql|apollo)\b",
    r"\b(stripe|paypal|payment)\b",
    r"\b(auth0|okta|oauth|jwt)\b",
    r"\b(aws|gcp|azure|s3|lambda)\b",
    r"\b(redis|memcached|cache)\b",
    r"\b(postgres|mysql|mongodb|database)\b",
    r"\b(elasticsearch|algolia|search)\b",
    r"\b(kafka|rabbitmq|sqs|queue)\b",
    r"\b(docker|kubernetes|k8s)\b",
    r"\b(openai|anthropic|llm|ai)\b",
    r"\b(sendgrid|twilio|email|sms)\b",
];

fn integration_res() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        INTEGRATION_GROUPS
            .iter()
            .map(|p| Regex::new(p).expect("static regex"))
            .collect()
    })
}

fn infra_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b(docker|kubernetes|k8s|deploy|infrastructure|environment|config|database migration|schema)\b|\bci/cd\b|(^|\W)\.env\b",
        )
        .expect("static regex")
    })
}

fn file_ext_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\.(tsx?|jsx?|py|go|rs|java|rb|php|vue|svelte)\b").expect("static regex")
    })
}

// ---------------------------------------------------------------------------
// ComplexityAssessment
// ---------------------------------------------------------------------------

/// Raw counts behind a heuristic decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Signals {
    pub simple_keywords: usize,
    pub complex_keywords: usize,
    pub multi_service_keywords: usize,
    pub external_integrations: usize,
    pub infrastructure_changes: bool,
    pub estimated_files: u32,
    pub estimated_services: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explicit_services: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentSource {
    #[default]
    Heuristic,
    Agent,
    Override,
}

/// `complexity_assessment.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityAssessment {
    pub complexity: Complexity,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default = "default_reasoning")]
    pub reasoning: String,
    #[serde(default)]
    pub signals: Signals,
    /// The agent's own `analysis` block, kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Value>,
    #[serde(default = "default_files")]
    pub estimated_files: u32,
    #[serde(default = "default_services")]
    pub estimated_services: u32,
    #[serde(default)]
    pub external_integrations: Vec<String>,
    #[serde(default)]
    pub infrastructure_changes: bool,
    /// Explicit phase list. Authoritative when non-empty.
    #[serde(default)]
    pub phases_to_run: Vec<String>,
    #[serde(default)]
    pub needs_research: bool,
    #[serde(default)]
    pub needs_self_critique: bool,
    #[serde(default)]
    pub source: AssessmentSource,
    #[serde(default)]
    pub dev_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

fn default_confidence() -> f64 {
    0.75
}

fn default_reasoning() -> String {
    "AI assessment".to_string()
}

fn default_files() -> u32 {
    5
}

fn default_services() -> u32 {
    1
}

impl ComplexityAssessment {
    fn new(complexity: Complexity, confidence: f64, reasoning: String) -> Self {
        Self {
            complexity,
            confidence,
            reasoning,
            signals: Signals::default(),
            analysis: None,
            estimated_files: 1,
            estimated_services: 1,
            external_integrations: Vec::new(),
            infrastructure_changes: false,
            phases_to_run: Vec::new(),
            needs_research: false,
            needs_self_critique: false,
            source: AssessmentSource::Heuristic,
            dev_mode: false,
            created_at: None,
        }
    }

    /// User-forced tier.
    pub fn manual_override(complexity: Complexity) -> Self {
        let mut a = Self::new(complexity, 1.0, format!("Manual override: {complexity}"));
        a.source = AssessmentSource::Override;
        a
    }

    /// The explicit list when present, otherwise the tier's default set.
    pub fn phases_to_run(&self) -> Vec<String> {
        if !self.phases_to_run.is_empty() {
            return self.phases_to_run.clone();
        }
        default_phases(self.complexity, self.needs_research)
            .iter()
            .map(|p| p.as_str().to_string())
            .collect()
    }

    /// Copy ready for persisting: resolved phase list and a timestamp.
    pub fn persisted(&self, dev_mode: bool) -> Self {
        let mut out = self.clone();
        out.phases_to_run = self.phases_to_run();
        out.dev_mode = dev_mode;
        out.created_at = Some(chrono::Utc::now().to_rfc3339());
        out
    }
}

pub fn default_phases(complexity: Complexity, needs_research: bool) -> Vec<PhaseName> {
    use PhaseName::*;
    match complexity {
        Complexity::Simple => vec![Discovery, QuickSpec, Validation],
        Complexity::Standard => {
            let mut phases = vec![Discovery, Requirements];
            if needs_research {
                phases.push(Research);
            }
            phases.extend([Context, SpecWriting, Planning, Validation]);
            phases
        }
        Complexity::Complex => vec![
            Discovery,
            Requirements,
            Research,
            Context,
            SpecWriting,
            SelfCritique,
            Planning,
            Validation,
        ],
    }
}

// ---------------------------------------------------------------------------
// Assessor
// ---------------------------------------------------------------------------

pub struct AssessmentInput<'a> {
    pub task: &'a str,
    pub requirements: Option<&'a Requirements>,
    pub project_index: Option<&'a ProjectIndex>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AssessError {
    /// The agent could not be reached or the turn failed.
    #[error("assessment transport failed: {0}")]
    Transport(String),
    /// The agent ran but left no usable assessment behind.
    #[error("malformed assessment: {0}")]
    Malformed(String),
}

pub trait Assessor: Send + Sync {
    fn assess<'a>(
        &'a self,
        input: &'a AssessmentInput<'a>,
    ) -> BoxFuture<'a, Result<ComplexityAssessment, AssessError>>;
}

// ---------------------------------------------------------------------------
// HeuristicAnalyzer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicAnalyzer;

impl HeuristicAnalyzer {
    pub fn analyze(&self, input: &AssessmentInput<'_>) -> ComplexityAssessment {
        let text = input.task.to_lowercase();

        let simple = count_hits(&text, SIMPLE_KEYWORDS);
        let complex = count_hits(&text, COMPLEX_KEYWORDS);
        let multi_service = count_hits(&text, MULTI_SERVICE_KEYWORDS);

        let integrations = detect_integrations(&text);
        let infra = infra_re().is_match(&text);
        let files = estimate_files(&text, simple, complex);
        let mut services = estimate_services(&text, multi_service, input.project_index);

        let mut signals = Signals {
            simple_keywords: simple,
            complex_keywords: complex,
            multi_service_keywords: multi_service,
            external_integrations: integrations.len(),
            infrastructure_changes: infra,
            estimated_files: files,
            estimated_services: services,
            explicit_services: None,
        };
        if let Some(req) = input.requirements {
            let explicit = req.services_involved.len();
            signals.explicit_services = Some(explicit);
            services = services.max(explicit as u32);
        }

        let (complexity, confidence, reasoning) =
            decide(&signals, integrations.len(), infra, files, services);

        let mut a = ComplexityAssessment::new(complexity, confidence, reasoning);
        a.signals = signals;
        a.estimated_files = files;
        a.estimated_services = services;
        a.needs_research = !integrations.is_empty();
        a.needs_self_critique = complexity == Complexity::Complex;
        a.external_integrations = integrations;
        a.infrastructure_changes = infra;
        a
    }
}

impl Assessor for HeuristicAnalyzer {
    fn assess<'a>(
        &'a self,
        input: &'a AssessmentInput<'a>,
    ) -> BoxFuture<'a, Result<ComplexityAssessment, AssessError>> {
        futures::future::ready(Ok(self.analyze(input))).boxed()
    }
}

fn count_hits(text: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|kw| text.contains(*kw)).count()
}

/// First matched term of each integration group.
fn detect_integrations(text: &str) -> Vec<String> {
    integration_res()
        .iter()
        .filter_map(|re| re.find(text).map(|m| m.as_str().to_string()))
        .collect()
}

fn estimate_files(text: &str, simple: usize, complex: usize) -> u32 {
    // Several complex signals and nothing small outweighs any explicit scope.
    if complex >= 2 && simple == 0 {
        return 15;
    }
    if SINGLE_SCOPE_PHRASES.iter().any(|p| text.contains(p)) {
        return 1;
    }
    let mentions = file_ext_re().find_iter(text).count() as u32;
    if mentions > 0 {
        return mentions;
    }
    if simple > 0 {
        2
    } else if FEATURE_WORDS.iter().any(|w| text.contains(w)) {
        5
    } else if complex > 0 {
        15
    } else {
        5
    }
}

fn estimate_services(text: &str, multi_service: usize, index: Option<&ProjectIndex>) -> u32 {
    if let Some(index) = index.filter(|i| i.is_monorepo()) {
        let mentioned = index
            .services
            .keys()
            .filter(|name| text.contains(&name.to_lowercase()))
            .count() as u32;
        if mentioned > 0 {
            return mentioned;
        }
    }
    (multi_service as u32).clamp(1, 5)
}

fn decide(
    signals: &Signals,
    integrations: usize,
    infra: bool,
    files: u32,
    services: u32,
) -> (Complexity, f64, String) {
    if files <= 2
        && services == 1
        && integrations == 0
        && !infra
        && signals.simple_keywords > 0
        && signals.complex_keywords == 0
    {
        return (
            Complexity::Simple,
            0.9,
            format!("Single service, {files} file(s), no integrations"),
        );
    }

    if integrations >= 2 || infra || services >= 3 || files >= 10 || signals.complex_keywords >= 3
    {
        let mut reasons = vec![format!(
            "{integrations} integrations, {services} services, {files} files"
        )];
        if infra {
            reasons.push("infrastructure changes detected".to_string());
        }
        return (Complexity::Complex, 0.85, reasons.join("; "));
    }

    let mut reasons = vec![format!("{files} files, {services} service(s)")];
    if integrations > 0 {
        reasons.push(format!("{integrations} integration(s)"));
    }
    (Complexity::Standard, 0.75, reasons.join("; "))
}

// ---------------------------------------------------------------------------
// AgentAssessor
// ---------------------------------------------------------------------------

pub const ASSESSOR_TEMPLATE: &str = "complexity_assessor";

/// Runs the assessor prompt and reads back the file the agent wrote.
pub struct AgentAssessor<'a> {
    driver: &'a AgentDriver<'a>,
    store: &'a ArtifactStore,
}

impl<'a> AgentAssessor<'a> {
    pub fn new(driver: &'a AgentDriver<'a>, store: &'a ArtifactStore) -> Self {
        Self { driver, store }
    }

    fn context(&self, input: &AssessmentInput<'_>) -> String {
        let mut ctx = String::new();
        match input.requirements {
            Some(req) => {
                ctx.push_str("## Requirements (from user)\n");
                ctx.push_str(&requirements_context(req));
            }
            None => {
                let task = if input.task.trim().is_empty() {
                    "Not provided"
                } else {
                    input.task
                };
                ctx.push_str(&format!("**Task Description**: {task}\n"));
            }
        }
        if self.store.exists(paths::PROJECT_INDEX) {
            ctx.push_str(&format!(
                "\n**Project Index**: Available at {}\n",
                self.store.path(paths::PROJECT_INDEX).display()
            ));
        }
        if self.store.exists(paths::REQUIREMENTS) {
            ctx.push_str(&format!(
                "\n**Requirements File**: {} (read this for full details)\n",
                self.store.path(paths::REQUIREMENTS).display()
            ));
        }
        ctx
    }

    async fn run(&self, input: &AssessmentInput<'_>) -> Result<ComplexityAssessment, AssessError> {
        let before = modified(self.store, paths::COMPLEXITY_ASSESSMENT);
        let context = self.context(input);
        self.driver
            .run(ASSESSOR_TEMPLATE, self.store.dir(), &context)
            .await
            .map_err(|e| match e {
                TurnError::Prompt(msg) => AssessError::Transport(msg),
                TurnError::Agent(err) => AssessError::Transport(err.to_string()),
            })?;

        let after = modified(self.store, paths::COMPLEXITY_ASSESSMENT);
        if after.is_none() || after == before {
            return Err(AssessError::Malformed(format!(
                "agent did not write {}",
                paths::COMPLEXITY_ASSESSMENT
            )));
        }
        let raw = self
            .store
            .read_json(paths::COMPLEXITY_ASSESSMENT)
            .map_err(|e| AssessError::Malformed(e.to_string()))?;
        parse_agent_assessment(&raw).map_err(AssessError::Malformed)
    }
}

impl Assessor for AgentAssessor<'_> {
    fn assess<'a>(
        &'a self,
        input: &'a AssessmentInput<'a>,
    ) -> BoxFuture<'a, Result<ComplexityAssessment, AssessError>> {
        self.run(input).boxed()
    }
}

fn modified(store: &ArtifactStore, name: &str) -> Option<SystemTime> {
    std::fs::metadata(store.path(name))
        .and_then(|m| m.modified())
        .ok()
}

/// Markdown block describing the gathered requirements.
pub fn requirements_context(req: &Requirements) -> String {
    fn bullets(items: &[String]) -> String {
        items.iter().map(|i| format!("- {i}\n")).collect()
    }
    format!(
        "**Task Description**: {}\n**Workflow Type**: {}\n**Services Involved**: {}\n\
         **User Requirements**:\n{}**Acceptance Criteria**:\n{}**Constraints**:\n{}",
        req.task_description,
        req.workflow_type,
        req.services_involved.join(", "),
        bullets(&req.user_requirements),
        bullets(&req.acceptance_criteria),
        bullets(&req.constraints),
    )
}

/// Read the agent's assessment, applying the documented defaults.
pub fn parse_agent_assessment(raw: &Value) -> Result<ComplexityAssessment, String> {
    let tier = raw
        .get("complexity")
        .and_then(Value::as_str)
        .unwrap_or("standard");
    let complexity: Complexity = tier.parse().map_err(|_| format!("unknown complexity '{tier}'"))?;

    let analysis = raw.get("analysis").cloned().unwrap_or(Value::Null);
    let at = |path: &[&str]| -> Option<&Value> {
        path.iter().try_fold(&analysis, |v, key| v.get(*key))
    };

    let mut a = ComplexityAssessment::new(
        complexity,
        raw.get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or_else(default_confidence),
        raw.get("reasoning")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(default_reasoning),
    );
    a.source = AssessmentSource::Agent;
    a.estimated_files = at(&["scope", "estimated_files"])
        .and_then(Value::as_u64)
        .map_or(default_files(), |n| n as u32);
    a.estimated_services = at(&["scope", "estimated_services"])
        .and_then(Value::as_u64)
        .map_or(default_services(), |n| n as u32);
    a.external_integrations = at(&["integrations", "external_services"])
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    a.infrastructure_changes = at(&["infrastructure", "docker_changes"])
        .and_then(Value::as_bool)
        .unwrap_or(false);
    a.phases_to_run = raw
        .get("recommended_phases")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let flag = |key: &str| {
        raw.get("flags")
            .and_then(|f| f.get(key))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    };
    a.needs_research = flag("needs_research");
    a.needs_self_critique = flag("needs_self_critique");
    if !analysis.is_null() {
        a.analysis = Some(analysis);
    }
    Ok(a)
}

// ---------------------------------------------------------------------------
// TryAgentThenHeuristic
// ---------------------------------------------------------------------------

/// Agent first; the heuristic when the agent fails in a way `policy` allows.
pub struct TryAgentThenHeuristic<A> {
    primary: A,
    fallback: HeuristicAnalyzer,
    policy: FallbackPolicy,
}

impl<A: Assessor> TryAgentThenHeuristic<A> {
    pub fn new(primary: A, policy: FallbackPolicy) -> Self {
        Self {
            primary,
            fallback: HeuristicAnalyzer,
            policy,
        }
    }

    fn may_fall_back(&self, err: &AssessError) -> bool {
        match (self.policy, err) {
            (FallbackPolicy::AnyError, _) => true,
            (FallbackPolicy::MalformedOutput, AssessError::Malformed(_)) => true,
            (FallbackPolicy::MalformedOutput, AssessError::Transport(_)) => false,
        }
    }
}

impl<A: Assessor> Assessor for TryAgentThenHeuristic<A> {
    fn assess<'a>(
        &'a self,
        input: &'a AssessmentInput<'a>,
    ) -> BoxFuture<'a, Result<ComplexityAssessment, AssessError>> {
        async move {
            match self.primary.assess(input).await {
                Ok(a) => Ok(a),
                Err(e) if self.may_fall_back(&e) => {
                    tracing::warn!(error = %e, "agent assessment failed, falling back to heuristics");
                    Ok(self.fallback.analyze(input))
                }
                Err(e) => Err(e),
            }
        }
        .boxed()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptLibrary;
    use crate::test_support::FnGateway;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn heuristic(task: &str) -> ComplexityAssessment {
        HeuristicAnalyzer.analyze(&AssessmentInput {
            task,
            requirements: None,
            project_index: None,
        })
    }

    #[test]
    fn button_color_fix_is_simple() {
        let a = heuristic("Fix button color in Header component");
        assert_eq!(a.complexity, Complexity::Simple);
        assert_eq!(a.confidence, 0.9);
        assert_eq!(a.estimated_files, 2);
        assert_eq!(a.estimated_services, 1);
        assert_eq!(a.phases_to_run(), vec!["discovery", "quick_spec", "validation"]);
        assert_eq!(a.reasoning, "Single service, 2 file(s), no integrations");
    }

    #[test]
    fn oauth_redis_migration_is_complex() {
        let a = heuristic("Add OAuth login with Redis session cache and database migration");
        assert_eq!(a.complexity, Complexity::Complex);
        assert_eq!(a.confidence, 0.85);
        assert_eq!(a.external_integrations, vec!["oauth", "redis", "database"]);
        assert!(a.infrastructure_changes);
        let phases = a.phases_to_run();
        assert!(phases.contains(&"research".to_string()));
        assert!(phases.contains(&"self_critique".to_string()));
        assert!(a.reasoning.contains("infrastructure changes detected"));
    }

    #[test]
    fn two_complex_keywords_without_simple_is_complex() {
        for task in [
            "Integrate the payments sdk",
            "graphql websocket subscriptions",
            "Refactor architecture in a single module",
            "Wire up the sdk library in main.rs",
        ] {
            let a = heuristic(task);
            assert!(a.signals.complex_keywords >= 2, "{task}");
            assert_eq!(a.signals.simple_keywords, 0, "{task}");
            assert_eq!(a.complexity, Complexity::Complex, "{task}");
            assert_eq!(a.confidence, 0.85, "{task}");
        }
    }

    #[test]
    fn one_simple_keyword_and_nothing_else_is_simple() {
        for task in ["Correct the footer copy", "Tweak onboarding wording"] {
            let a = heuristic(task);
            assert_eq!(a.signals.simple_keywords, 1, "{task}");
            assert_eq!(a.complexity, Complexity::Simple, "{task}");
            assert_eq!(a.confidence, 0.9, "{task}");
        }
    }

    #[test]
    fn feature_work_without_signals_is_standard() {
        let a = heuristic("Implement profile page for members");
        assert_eq!(a.complexity, Complexity::Standard);
        assert_eq!(a.estimated_files, 5);
        assert_eq!(a.reasoning, "5 files, 1 service(s)");
        assert!(!a.needs_research);
        assert!(!a.phases_to_run().contains(&"research".to_string()));
    }

    #[test]
    fn classification_is_deterministic() {
        let task = "Add Stripe payment webhook handler to backend and worker";
        assert_eq!(heuristic(task), heuristic(task));
    }

    #[test]
    fn explicit_file_mentions_set_estimate() {
        let a = heuristic("tweak layout in app.tsx and nav.tsx and list.tsx");
        assert_eq!(a.estimated_files, 3);
    }

    #[test]
    fn monorepo_services_named_in_task_win() {
        let mut services = BTreeMap::new();
        for name in ["api", "web", "worker", "billing"] {
            services.insert(name.to_string(), Default::default());
        }
        let index = ProjectIndex {
            project_type: Some("monorepo".into()),
            services,
        };
        let a = HeuristicAnalyzer.analyze(&AssessmentInput {
            task: "Show invoices from billing on web",
            requirements: None,
            project_index: Some(&index),
        });
        assert_eq!(a.estimated_services, 2);
    }

    #[test]
    fn requirements_services_raise_the_estimate() {
        let mut req = Requirements::from_task("Update label text");
        req.services_involved = vec!["a".into(), "b".into(), "c".into()];
        let a = HeuristicAnalyzer.analyze(&AssessmentInput {
            task: "Update label text",
            requirements: Some(&req),
            project_index: None,
        });
        assert_eq!(a.estimated_services, 3);
        assert_eq!(a.signals.explicit_services, Some(3));
        assert_eq!(a.complexity, Complexity::Complex);
    }

    #[test]
    fn manual_override_is_certain() {
        let a = ComplexityAssessment::manual_override(Complexity::Simple);
        assert_eq!(a.confidence, 1.0);
        assert_eq!(a.reasoning, "Manual override: simple");
        assert_eq!(a.source, AssessmentSource::Override);
    }

    #[test]
    fn explicit_phase_list_is_authoritative() {
        let mut a = ComplexityAssessment::manual_override(Complexity::Complex);
        a.phases_to_run = vec!["discovery".into(), "spec_writing".into()];
        assert_eq!(a.phases_to_run(), vec!["discovery", "spec_writing"]);
        let persisted = a.persisted(true);
        assert!(persisted.dev_mode);
        assert!(persisted.created_at.is_some());
    }

    #[test]
    fn agent_file_defaults() {
        let a = parse_agent_assessment(&serde_json::json!({})).unwrap();
        assert_eq!(a.complexity, Complexity::Standard);
        assert_eq!(a.confidence, 0.75);
        assert_eq!(a.reasoning, "AI assessment");
        assert_eq!(a.estimated_files, 5);
        assert_eq!(a.estimated_services, 1);

        let a = parse_agent_assessment(&serde_json::json!({
            "complexity": "COMPLEX",
            "confidence": 0.6,
            "analysis": {
                "scope": {"estimated_files": 12, "estimated_services": 2},
                "integrations": {"external_services": ["stripe"]},
                "infrastructure": {"docker_changes": true}
            },
            "recommended_phases": ["discovery", "requirements", "research"],
            "flags": {"needs_research": true}
        }))
        .unwrap();
        assert_eq!(a.complexity, Complexity::Complex);
        assert_eq!(a.estimated_files, 12);
        assert_eq!(a.external_integrations, vec!["stripe"]);
        assert!(a.infrastructure_changes);
        assert!(a.needs_research);
        assert!(!a.needs_self_critique);
        assert_eq!(a.phases_to_run().len(), 3);

        assert!(parse_agent_assessment(&serde_json::json!({"complexity": "epic"})).is_err());
    }

    #[test]
    fn requirements_block_lists_everything() {
        let mut req = Requirements::from_task("Ship it");
        req.services_involved = vec!["api".into(), "web".into()];
        req.acceptance_criteria = vec!["works".into()];
        let block = requirements_context(&req);
        assert!(block.contains("**Task Description**: Ship it"));
        assert!(block.contains("**Workflow Type**: feature"));
        assert!(block.contains("**Services Involved**: api, web"));
        assert!(block.contains("**Acceptance Criteria**:\n- works\n"));
    }

    fn input<'a>(task: &'a str) -> AssessmentInput<'a> {
        AssessmentInput {
            task,
            requirements: None,
            project_index: None,
        }
    }

    #[tokio::test]
    async fn agent_assessor_reads_written_file() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path().join("001-pending")).unwrap();
        let out = store.dir().to_path_buf();
        let gateway = FnGateway::new(move |_prompt| {
            std::fs::write(
                out.join("complexity_assessment.json"),
                r#"{"complexity":"simple","confidence":0.95,"reasoning":"tiny"}"#,
            )
            .unwrap();
            Ok(())
        });
        let prompts = PromptLibrary::builtin();
        let driver = AgentDriver::new(&gateway, &prompts, dir.path(), None);
        let assessor = AgentAssessor::new(&driver, &store);
        let a = assessor.assess(&input("anything")).await.unwrap();
        assert_eq!(a.complexity, Complexity::Simple);
        assert_eq!(a.source, AssessmentSource::Agent);
        assert!(gateway.prompts()[0].contains("**Task Description**: anything"));
    }

    #[tokio::test]
    async fn agent_that_writes_nothing_is_malformed() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path().join("001-pending")).unwrap();
        let gateway = FnGateway::new(|_| Ok(()));
        let prompts = PromptLibrary::builtin();
        let driver = AgentDriver::new(&gateway, &prompts, dir.path(), None);
        let err = AgentAssessor::new(&driver, &store)
            .assess(&input("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, AssessError::Malformed(_)));
    }

    #[tokio::test]
    async fn fallback_policy_decides_on_transport_errors() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path().join("001-pending")).unwrap();
        let gateway = FnGateway::failing("connection reset");
        let prompts = PromptLibrary::builtin();
        let driver = AgentDriver::new(&gateway, &prompts, dir.path(), None);
        let task = input("Fix button color in Header component");

        let lenient = TryAgentThenHeuristic::new(
            AgentAssessor::new(&driver, &store),
            FallbackPolicy::AnyError,
        );
        let a = lenient.assess(&task).await.unwrap();
        assert_eq!(a.complexity, Complexity::Simple);
        assert_eq!(a.source, AssessmentSource::Heuristic);

        let strict = TryAgentThenHeuristic::new(
            AgentAssessor::new(&driver, &store),
            FallbackPolicy::MalformedOutput,
        );
        let err = strict.assess(&task).await.unwrap_err();
        assert!(matches!(err, AssessError::Transport(ref m) if m.contains("connection reset")));
    }

    #[tokio::test]
    async fn strict_policy_still_falls_back_on_malformed_output() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path().join("001-pending")).unwrap();
        let gateway = FnGateway::new(|_| Ok(()));
        let prompts = PromptLibrary::builtin();
        let driver = AgentDriver::new(&gateway, &prompts, dir.path(), None);
        let strict = TryAgentThenHeuristic::new(
            AgentAssessor::new(&driver, &store),
            FallbackPolicy::MalformedOutput,
        );
        let a = strict.assess(&input("Fix typo")).await.unwrap();
        assert_eq!(a.source, AssessmentSource::Heuristic);
    }
}
