use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ForgeError, Result};

// ---------------------------------------------------------------------------
// UnifiedStatus
// ---------------------------------------------------------------------------

/// Status vocabulary shared by every planning framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnifiedStatus {
    #[default]
    Pending,
    InProgress,
    Review,
    Blocked,
    Completed,
    Failed,
}

impl UnifiedStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UnifiedStatus::Pending => "pending",
            UnifiedStatus::InProgress => "in_progress",
            UnifiedStatus::Review => "review",
            UnifiedStatus::Blocked => "blocked",
            UnifiedStatus::Completed => "completed",
            UnifiedStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for UnifiedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const BMAD_STATUSES: &[(&str, UnifiedStatus)] = &[
    ("backlog", UnifiedStatus::Pending),
    ("ready-for-dev", UnifiedStatus::Pending),
    ("in-progress", UnifiedStatus::InProgress),
    ("review", UnifiedStatus::Review),
    ("blocked", UnifiedStatus::Blocked),
    ("done", UnifiedStatus::Completed),
];

pub const NATIVE_STATUSES: &[(&str, UnifiedStatus)] = &[
    ("pending", UnifiedStatus::Pending),
    ("in_progress", UnifiedStatus::InProgress),
    ("ai_review", UnifiedStatus::Review),
    ("human_review", UnifiedStatus::Review),
    ("done", UnifiedStatus::Completed),
    ("failed", UnifiedStatus::Failed),
];

fn lookup(table: &[(&str, UnifiedStatus)], framework: &str, status: &str) -> Result<UnifiedStatus> {
    table
        .iter()
        .find(|(key, _)| *key == status)
        .map(|(_, s)| *s)
        .ok_or_else(|| ForgeError::UnknownStatus {
            framework: framework.to_string(),
            status: status.to_string(),
        })
}

pub fn map_bmad_status(status: &str) -> Result<UnifiedStatus> {
    lookup(BMAD_STATUSES, "BMAD", status)
}

pub fn map_native_status(status: &str) -> Result<UnifiedStatus> {
    lookup(NATIVE_STATUSES, "Native", status)
}

// ---------------------------------------------------------------------------
// Work model
// ---------------------------------------------------------------------------

/// A verification point inside a task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Checkpoint {
    pub id: String,
    pub description: String,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: UnifiedStatus,
    pub acceptance_criteria: Vec<String>,
    pub files: Vec<String>,
    pub checkpoints: Vec<Checkpoint>,
    pub metadata: BTreeMap<String, String>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>, status: UnifiedStatus) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            status,
            acceptance_criteria: Vec::new(),
            files: Vec::new(),
            checkpoints: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }
}

/// Epic-level grouping of tasks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkUnit {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: UnifiedStatus,
    pub tasks: Vec<Task>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectStatus {
    pub framework: String,
    pub work_units: Vec<WorkUnit>,
    pub active_task: Option<Task>,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub progress_percentage: f64,
}

impl ProjectStatus {
    /// Aggregate counts; the first in-progress task becomes the active one.
    pub fn from_units(framework: &str, work_units: Vec<WorkUnit>) -> Self {
        let tasks = || work_units.iter().flat_map(|u| u.tasks.iter());
        let total_tasks = tasks().count();
        let completed_tasks = tasks()
            .filter(|t| t.status == UnifiedStatus::Completed)
            .count();
        let active_task = tasks()
            .find(|t| t.status == UnifiedStatus::InProgress)
            .cloned();
        let progress_percentage = if total_tasks == 0 {
            0.0
        } else {
            completed_tasks as f64 * 100.0 / total_tasks as f64
        };
        Self {
            framework: framework.to_string(),
            work_units,
            active_task,
            total_tasks,
            completed_tasks,
            progress_percentage,
        }
    }
}

/// Display names a framework uses for the unified concepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Glossary {
    pub work_unit: &'static str,
    pub task: &'static str,
    pub checkpoint: &'static str,
}

pub const BMAD_GLOSSARY: Glossary = Glossary {
    work_unit: "Epic",
    task: "Story",
    checkpoint: "Task",
};

pub const NATIVE_GLOSSARY: Glossary = Glossary {
    work_unit: "Phase",
    task: "Subtask",
    checkpoint: "Verification",
};
