use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const FORGE_DIR: &str = ".specforge";
pub const SPECS_DIR: &str = ".specforge/specs";
pub const DEV_SPECS_DIR: &str = ".specforge/dev/specs";
pub const ROADMAP_DIR: &str = ".specforge/roadmap";
pub const IDEATION_DIR: &str = ".specforge/ideation";
pub const PROMPTS_DIR: &str = ".specforge/prompts";
pub const SCRIPTS_DIR: &str = ".specforge/scripts";

pub const CONFIG_FILE: &str = ".specforge/config.yaml";
/// Project index shared by every run in the project.
pub const SHARED_PROJECT_INDEX: &str = ".specforge/project_index.json";

// ---------------------------------------------------------------------------
// Artifact filenames
// ---------------------------------------------------------------------------

pub const PROJECT_INDEX: &str = "project_index.json";
pub const REQUIREMENTS: &str = "requirements.json";
pub const COMPLEXITY_ASSESSMENT: &str = "complexity_assessment.json";
pub const RESEARCH: &str = "research.json";
pub const CONTEXT: &str = "context.json";
pub const SPEC_MD: &str = "spec.md";
pub const CRITIQUE_REPORT: &str = "critique_report.json";
pub const IMPLEMENTATION_PLAN: &str = "implementation_plan.json";

pub const ROADMAP_DISCOVERY: &str = "roadmap_discovery.json";
pub const ROADMAP: &str = "roadmap.json";

pub const IDEATION_CONTEXT: &str = "ideation_context.json";
pub const IDEATION: &str = "ideation.json";

pub const SPRINT_STATUS: &str = "sprint-status.yaml";

/// Name a fresh spec directory carries until requirements are known.
pub const PLACEHOLDER_NAME: &str = "pending";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn specs_dir(root: &Path, dev_mode: bool) -> PathBuf {
    root.join(if dev_mode { DEV_SPECS_DIR } else { SPECS_DIR })
}

pub fn roadmap_dir(root: &Path) -> PathBuf {
    root.join(ROADMAP_DIR)
}

pub fn ideation_dir(root: &Path) -> PathBuf {
    root.join(IDEATION_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn shared_project_index(root: &Path) -> PathBuf {
    root.join(SHARED_PROJECT_INDEX)
}

pub fn forge_dir(root: &Path) -> PathBuf {
    root.join(FORGE_DIR)
}

pub fn ideas_file(category: &str) -> String {
    format!("{category}_ideas.json")
}

// ---------------------------------------------------------------------------
// Spec directory naming
// ---------------------------------------------------------------------------

static NUMBERED_RE: OnceLock<Regex> = OnceLock::new();

fn numbered_re() -> &'static Regex {
    NUMBERED_RE.get_or_init(|| Regex::new(r"^(\d{3})-").expect("static regex"))
}

/// `NNN-pending`, where NNN is one more than the numbered directories
/// already present in `specs_dir`.
pub fn next_spec_dir(specs_dir: &Path) -> PathBuf {
    let existing = std::fs::read_dir(specs_dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_dir())
                .filter(|e| numbered_re().is_match(&e.file_name().to_string_lossy()))
                .count()
        })
        .unwrap_or(0);
    specs_dir.join(format!("{:03}-{PLACEHOLDER_NAME}", existing + 1))
}

/// Whether a spec directory is named exactly `NNN-pending`.
pub fn is_placeholder(dir: &Path) -> bool {
    let Some(name) = dir.file_name().map(|n| n.to_string_lossy()) else {
        return false;
    };
    number_prefix(&name).is_some_and(|prefix| name == format!("{prefix}{PLACEHOLDER_NAME}"))
}

/// The `NNN-` prefix of a numbered directory name, if any.
pub fn number_prefix(name: &str) -> Option<&str> {
    numbered_re().find(name).map(|m| m.as_str())
}

const SKIP_WORDS: &[&str] = &[
    "a", "an", "the", "to", "for", "of", "in", "on", "at", "by", "with", "and", "or", "but",
    "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does", "did",
    "will", "would", "could", "should", "may", "might", "must", "can", "this", "that", "these",
    "those", "i", "you", "we", "they", "it", "add", "create", "make", "implement", "build", "new",
    "using", "use", "via", "from",
];

/// Kebab-case directory name from a task description: the first four
/// meaningful words, else the first four words, else `spec`.
pub fn generate_spec_name(task_description: &str) -> String {
    let cleaned: String = task_description
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == ' ' { c } else { ' ' })
        .collect();
    let words: Vec<&str> = cleaned.split_whitespace().collect();

    let meaningful: Vec<&str> = words
        .iter()
        .copied()
        .filter(|w| !SKIP_WORDS.contains(w) && w.chars().count() > 2)
        .take(4)
        .collect();

    let parts: Vec<&str> = if meaningful.is_empty() {
        words.into_iter().take(4).collect()
    } else {
        meaningful
    };

    if parts.is_empty() {
        "spec".to_string()
    } else {
        parts.join("-")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
