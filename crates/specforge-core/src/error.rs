use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("corrupt artifact {}: {reason}", .path.display())]
    CorruptArtifact { path: PathBuf, reason: String },

    #[error("invalid complexity '{0}': expected simple, standard or complex")]
    InvalidComplexity(String),

    #[error("unknown phase: {0}")]
    UnknownPhase(String),

    #[error("unknown ideation category '{0}'")]
    UnknownCategory(String),

    #[error("invalid workflow type '{0}': expected feature, bugfix, refactor, docs or test")]
    InvalidWorkflowType(String),

    #[error("missing prerequisite '{artifact}' for {phase}")]
    MissingPrerequisite { artifact: String, phase: String },

    #[error("missing credential: set {0}")]
    MissingCredential(String),

    #[error("project directory not found: {}", .0.display())]
    ProjectNotFound(PathBuf),

    #[error("spec directory not found: {}", .0.display())]
    SpecNotFound(PathBuf),

    #[error("Unknown {framework} status: {status}")]
    UnknownStatus { framework: String, status: String },

    #[error("unknown framework '{name}'. Available: {available}")]
    UnknownFramework { name: String, available: String },

    #[error("script not found: {0}")]
    ScriptNotFound(String),

    #[error("cancelled by user")]
    Cancelled,

    #[error(transparent)]
    Agent(#[from] specforge_agent::AgentError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ForgeError>;
