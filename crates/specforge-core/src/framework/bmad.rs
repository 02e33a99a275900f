//! BMAD Method: epics and stories tracked in `sprint-status.yaml`.
//!
//! ```yaml
//! development_status:
//!   epic-1: in-progress
//!   1-1-user-login: done
//!   1-2-password-reset: review
//!   epic-1-retrospective: optional
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use super::model::{map_bmad_status, Task, UnifiedStatus, WorkUnit};
use crate::error::{ForgeError, Result};
use crate::paths;

const SEARCH_DIRS: &[&str] = &["docs", "_bmad-output", ".specforge", ""];

#[derive(Debug, Default, Deserialize)]
struct SprintStatus {
    #[serde(default)]
    development_status: serde_yaml::Mapping,
}

fn epic_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^epic-(\d+)$").expect("static regex"))
}

fn story_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)-(\d+)-(.+)$").expect("static regex"))
}

/// First `sprint-status.yaml` found under the usual output directories.
pub fn find_sprint_status(project: &Path) -> Option<PathBuf> {
    SEARCH_DIRS
        .iter()
        .map(|d| project.join(d).join(paths::SPRINT_STATUS))
        .find(|p| p.is_file())
}

fn load(project: &Path) -> Result<Vec<(String, String)>> {
    let Some(path) = find_sprint_status(project) else {
        return Err(ForgeError::ArtifactNotFound(project.join(paths::SPRINT_STATUS)));
    };
    let data = std::fs::read_to_string(&path)?;
    let status: SprintStatus = serde_yaml::from_str(&data)?;
    Ok(status
        .development_status
        .into_iter()
        .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v.as_str()?.to_string())))
        .collect())
}

fn title_from_slug(slug: &str) -> String {
    slug.split('-')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn parse_work_units(project: &Path) -> Result<Vec<WorkUnit>> {
    let entries = load(project)?;
    let mut units: Vec<WorkUnit> = Vec::new();
    let mut stories: BTreeMap<String, Vec<Task>> = BTreeMap::new();

    for (key, value) in &entries {
        if key.ends_with("-retrospective") {
            continue;
        }
        if let Some(caps) = epic_re().captures(key) {
            let id = caps[1].to_string();
            units.push(WorkUnit {
                title: format!("Epic {id}"),
                id,
                description: String::new(),
                status: map_bmad_status(value)?,
                tasks: Vec::new(),
                metadata: BTreeMap::from([("key".to_string(), key.clone())]),
            });
        } else if let Some(caps) = story_re().captures(key) {
            let epic = caps[1].to_string();
            let mut task = Task::new(
                format!("{}-{}", &caps[1], &caps[2]),
                title_from_slug(&caps[3]),
                map_bmad_status(value)?,
            );
            task.metadata.insert("key".to_string(), key.clone());
            stories.entry(epic).or_default().push(task);
        } else {
            tracing::debug!(key = %key, "ignoring unrecognised sprint-status entry");
        }
    }

    for unit in &mut units {
        unit.tasks = stories.remove(&unit.id).unwrap_or_default();
    }
    // Stories whose epic has no entry of its own still need a home.
    for (epic, tasks) in stories {
        units.push(WorkUnit {
            title: format!("Epic {epic}"),
            id: epic,
            description: String::new(),
            status: UnifiedStatus::Pending,
            tasks,
            metadata: BTreeMap::new(),
        });
    }
    Ok(units)
}

pub fn parse_tasks(project: &Path, work_unit_id: &str) -> Result<Vec<Task>> {
    parse_work_units(project)?
        .into_iter()
        .find(|u| u.id == work_unit_id)
        .map(|u| u.tasks)
        .ok_or_else(|| ForgeError::ArtifactNotFound(PathBuf::from(format!("epic-{work_unit_id}"))))
}
