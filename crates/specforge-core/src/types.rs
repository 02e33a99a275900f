use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::ForgeError;

// ---------------------------------------------------------------------------
// Complexity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Standard,
    Complex,
}

impl Complexity {
    pub fn as_str(self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Standard => "standard",
            Complexity::Complex => "complex",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Complexity {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(Complexity::Simple),
            "standard" => Ok(Complexity::Standard),
            "complex" => Ok(Complexity::Complex),
            other => Err(ForgeError::InvalidComplexity(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// PhaseName
// ---------------------------------------------------------------------------

/// The phases of the spec-creation pipeline, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseName {
    Discovery,
    Requirements,
    ComplexityAssessment,
    QuickSpec,
    Research,
    Context,
    SpecWriting,
    SelfCritique,
    Planning,
    Validation,
}

impl PhaseName {
    pub fn all() -> &'static [PhaseName] {
        &[
            PhaseName::Discovery,
            PhaseName::Requirements,
            PhaseName::ComplexityAssessment,
            PhaseName::QuickSpec,
            PhaseName::Research,
            PhaseName::Context,
            PhaseName::SpecWriting,
            PhaseName::SelfCritique,
            PhaseName::Planning,
            PhaseName::Validation,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PhaseName::Discovery => "discovery",
            PhaseName::Requirements => "requirements",
            PhaseName::ComplexityAssessment => "complexity_assessment",
            PhaseName::QuickSpec => "quick_spec",
            PhaseName::Research => "research",
            PhaseName::Context => "context",
            PhaseName::SpecWriting => "spec_writing",
            PhaseName::SelfCritique => "self_critique",
            PhaseName::Planning => "planning",
            PhaseName::Validation => "validation",
        }
    }

    /// Banner shown when the phase starts.
    pub fn title(self) -> &'static str {
        match self {
            PhaseName::Discovery => "PROJECT DISCOVERY",
            PhaseName::Requirements => "REQUIREMENTS GATHERING",
            PhaseName::ComplexityAssessment => "COMPLEXITY ASSESSMENT",
            PhaseName::QuickSpec => "QUICK SPEC",
            PhaseName::Research => "INTEGRATION RESEARCH",
            PhaseName::Context => "CONTEXT DISCOVERY",
            PhaseName::SpecWriting => "SPEC DOCUMENT CREATION",
            PhaseName::SelfCritique => "SPEC SELF-CRITIQUE",
            PhaseName::Planning => "IMPLEMENTATION PLANNING",
            PhaseName::Validation => "FINAL VALIDATION",
        }
    }
}

impl fmt::Display for PhaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PhaseName {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PhaseName::all()
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ForgeError::UnknownPhase(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// WorkflowType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    #[default]
    Feature,
    Bugfix,
    Refactor,
    Docs,
    Test,
}

impl WorkflowType {
    pub fn all() -> &'static [WorkflowType] {
        &[
            WorkflowType::Feature,
            WorkflowType::Bugfix,
            WorkflowType::Refactor,
            WorkflowType::Docs,
            WorkflowType::Test,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowType::Feature => "feature",
            WorkflowType::Bugfix => "bugfix",
            WorkflowType::Refactor => "refactor",
            WorkflowType::Docs => "docs",
            WorkflowType::Test => "test",
        }
    }
}

impl fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkflowType {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkflowType::all()
            .iter()
            .copied()
            .find(|w| w.as_str() == s.trim())
            .ok_or_else(|| ForgeError::InvalidWorkflowType(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Requirements
// ---------------------------------------------------------------------------

/// `requirements.json`. Written once by the requirements phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirements {
    pub task_description: String,
    #[serde(default)]
    pub workflow_type: WorkflowType,
    #[serde(default)]
    pub services_involved: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_requirements: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acceptance_criteria: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Requirements {
    pub fn from_task(task_description: impl Into<String>) -> Self {
        Self {
            task_description: task_description.into(),
            workflow_type: WorkflowType::Feature,
            services_involved: Vec::new(),
            user_requirements: Vec::new(),
            acceptance_criteria: Vec::new(),
            constraints: Vec::new(),
            additional_context: None,
            created_at: Some(chrono::Utc::now().to_rfc3339()),
        }
    }
}

// ---------------------------------------------------------------------------
// ProjectIndex
// ---------------------------------------------------------------------------

/// The parts of `project_index.json` the pipelines read. Everything else the
/// analyzer writes is preserved on disk and ignored here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectIndex {
    #[serde(default)]
    pub project_type: Option<String>,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub framework: Option<String>,
}

impl ProjectIndex {
    pub fn is_monorepo(&self) -> bool {
        self.project_type.as_deref() == Some("monorepo")
    }

    /// Distinct languages and frameworks across services, sorted.
    pub fn tech_stack(&self) -> Vec<String> {
        let mut stack: Vec<String> = self
            .services
            .values()
            .flat_map(|s| [s.language.clone(), s.framework.clone()])
            .flatten()
            .collect();
        stack.sort();
        stack.dedup();
        stack
    }
}

// ---------------------------------------------------------------------------
// PhaseResult
// ---------------------------------------------------------------------------

/// Outcome of one phase execution. Kept in memory for the run summary only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseResult {
    pub phase: String,
    pub success: bool,
    pub output_files: Vec<PathBuf>,
    /// Attempts consumed beyond the first.
    pub retries: u32,
    pub errors: Vec<String>,
    /// Derived metric such as the idea count, when the phase has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<usize>,
    /// True when a degradable phase fell back to a marked placeholder.
    pub degraded: bool,
}

impl PhaseResult {
    pub fn ok(phase: impl Into<String>, output_files: Vec<PathBuf>, retries: u32) -> Self {
        Self {
            phase: phase.into(),
            success: true,
            output_files,
            retries,
            errors: Vec::new(),
            items: None,
            degraded: false,
        }
    }

    pub fn failed(phase: impl Into<String>, errors: Vec<String>, retries: u32) -> Self {
        Self {
            phase: phase.into(),
            success: false,
            output_files: Vec::new(),
            retries,
            errors,
            items: None,
            degraded: false,
        }
    }

    pub fn with_items(mut self, items: Option<usize>) -> Self {
        self.items = items;
        self
    }
}
