//! Native specs: each `.specforge/specs/<spec>/implementation_plan.json` is
//! read as phases of chunks. A plan phase becomes a work unit, a chunk a
//! task, and the chunk's verification its single checkpoint.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::model::{map_native_status, Checkpoint, Task, UnifiedStatus, WorkUnit};
use crate::error::{ForgeError, Result};
use crate::paths;

fn spec_plans(project: &Path) -> Result<Vec<(String, PathBuf)>> {
    let dir = project.join(paths::SPECS_DIR);
    if !dir.is_dir() {
        return Err(ForgeError::ArtifactNotFound(dir));
    }
    let mut plans: Vec<(String, PathBuf)> = std::fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .map(|e| {
            (
                e.file_name().to_string_lossy().into_owned(),
                e.path().join(paths::IMPLEMENTATION_PLAN),
            )
        })
        .filter(|(_, plan)| plan.is_file())
        .collect();
    plans.sort();
    Ok(plans)
}

fn str_field(v: &Value, key: &str) -> String {
    v.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn str_list(v: &Value, key: &str) -> Vec<String> {
    v.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn chunk_task(chunk: &Value, spec: &str) -> Result<Task> {
    let status_raw = chunk.get("status").and_then(Value::as_str).unwrap_or("pending");
    let status = map_native_status(status_raw)?;
    let id = str_field(chunk, "id");
    let description = str_field(chunk, "description");

    let mut task = Task::new(id.clone(), description.clone(), status);
    task.description = description;
    task.files = str_list(chunk, "files_to_create");
    task.files.extend(str_list(chunk, "files_to_modify"));
    if let Some(verification) = chunk.get("verification") {
        let kind = str_field(verification, "type");
        let detail = ["run", "scenario", "url"]
            .iter()
            .map(|k| str_field(verification, k))
            .find(|s| !s.is_empty())
            .unwrap_or_else(|| kind.clone());
        task.acceptance_criteria.push(detail.clone());
        task.checkpoints.push(Checkpoint {
            id: format!("{id}-verify"),
            description: detail,
            completed: status == UnifiedStatus::Completed,
        });
    }
    task.metadata.insert("spec".to_string(), spec.to_string());
    let service = str_field(chunk, "service");
    if !service.is_empty() {
        task.metadata.insert("service".to_string(), service);
    }
    Ok(task)
}

/// A phase is complete when every chunk is, in progress once any chunk has
/// moved, and failed if any chunk failed.
fn rollup(tasks: &[Task]) -> UnifiedStatus {
    if tasks.is_empty() {
        return UnifiedStatus::Pending;
    }
    if tasks.iter().any(|t| t.status == UnifiedStatus::Failed) {
        UnifiedStatus::Failed
    } else if tasks.iter().all(|t| t.status == UnifiedStatus::Completed) {
        UnifiedStatus::Completed
    } else if tasks.iter().all(|t| t.status == UnifiedStatus::Pending) {
        UnifiedStatus::Pending
    } else {
        UnifiedStatus::InProgress
    }
}

pub fn parse_work_units(project: &Path) -> Result<Vec<WorkUnit>> {
    let mut units = Vec::new();
    for (spec, plan_path) in spec_plans(project)? {
        let text = std::fs::read_to_string(&plan_path)?;
        let plan: Value = serde_json::from_str(&text).map_err(|e| ForgeError::CorruptArtifact {
            path: plan_path.clone(),
            reason: e.to_string(),
        })?;
        let phases = plan.get("phases").and_then(Value::as_array).cloned().unwrap_or_default();
        for phase in &phases {
            let number = phase.get("phase").and_then(Value::as_u64).unwrap_or(0);
            let tasks = phase
                .get("chunks")
                .and_then(Value::as_array)
                .map(|chunks| {
                    chunks
                        .iter()
                        .map(|c| chunk_task(c, &spec))
                        .collect::<Result<Vec<Task>>>()
                })
                .transpose()?
                .unwrap_or_default();
            units.push(WorkUnit {
                id: format!("{spec}:{number}"),
                title: str_field(phase, "name"),
                description: str_field(phase, "description"),
                status: rollup(&tasks),
                tasks,
                metadata: BTreeMap::from([("spec".to_string(), spec.clone())]),
            });
        }
    }
    Ok(units)
}

pub fn parse_tasks(project: &Path, work_unit_id: &str) -> Result<Vec<Task>> {
    parse_work_units(project)?
        .into_iter()
        .find(|u| u.id == work_unit_id)
        .map(|u| u.tasks)
        .ok_or_else(|| ForgeError::ArtifactNotFound(PathBuf::from(work_unit_id)))
}
