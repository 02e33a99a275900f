//! Shape and content checks for task-directory artifacts.
//!
//! `validate` never writes. `auto_fix` applies deterministic repairs and the
//! caller is expected to validate again afterwards.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::paths;
use crate::plan::ChunkStatus;
use crate::store::ArtifactStore;
use crate::types::WorkflowType;

// ---------------------------------------------------------------------------
// ArtifactKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Prereqs,
    Requirements,
    Context,
    SpecDocument,
    ImplementationPlan,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Prereqs => "prereqs",
            ArtifactKind::Requirements => "requirements",
            ArtifactKind::Context => "context",
            ArtifactKind::SpecDocument => "spec_document",
            ArtifactKind::ImplementationPlan => "implementation_plan",
        }
    }

    /// Kinds checked by [`Validator::validate_all`], in report order.
    pub fn gate() -> &'static [ArtifactKind] {
        &[
            ArtifactKind::Prereqs,
            ArtifactKind::Context,
            ArtifactKind::SpecDocument,
            ArtifactKind::ImplementationPlan,
        ]
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ValidationResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub checkpoint: ArtifactKind,
    pub valid: bool,
    pub errors: Vec<String>,
    /// Suggested repairs. Present even on valid results for recommended
    /// (non-required) content.
    pub fixes: Vec<String>,
}

impl ValidationResult {
    fn new(checkpoint: ArtifactKind, errors: Vec<String>, fixes: Vec<String>) -> Self {
        Self {
            checkpoint,
            valid: errors.is_empty(),
            errors,
            fixes,
        }
    }
}

/// Failing results rendered as a Markdown list, for prompts and summaries.
pub fn render_failures(results: &[ValidationResult]) -> String {
    let mut out = String::new();
    for r in results.iter().filter(|r| !r.valid) {
        out.push_str(&format!("**{}** validation failed:\n", r.checkpoint));
        for err in &r.errors {
            out.push_str(&format!("  - Error: {err}\n"));
        }
        for fix in &r.fixes {
            out.push_str(&format!("  - Fix: {fix}\n"));
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Spec document headers
// ---------------------------------------------------------------------------

pub const REQUIRED_SPEC_SECTIONS: &[&str] =
    &["Overview", "Workflow Type", "Task Scope", "Success Criteria"];

pub const RECOMMENDED_SPEC_SECTIONS: &[&str] = &[
    "Files to Modify",
    "Files to Reference",
    "Requirements",
    "QA Acceptance Criteria",
];

const MIN_SPEC_CHARS: usize = 500;

/// A `#`..`######` heading whose text starts with `section` as a whole word.
fn has_section(content: &str, section: &str) -> bool {
    let wanted = section.to_lowercase();
    content.lines().any(|line| {
        let line = line.trim();
        let text = line.trim_start_matches('#');
        let level = line.len() - text.len();
        if !(1..=6).contains(&level) {
            return false;
        }
        let text = text.trim_start().to_lowercase();
        text.strip_prefix(&wanted).is_some_and(|rest| {
            !rest.starts_with(|c: char| c.is_alphanumeric() || c == '_')
        })
    })
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

pub struct Validator<'a> {
    store: &'a ArtifactStore,
}

impl<'a> Validator<'a> {
    pub fn new(store: &'a ArtifactStore) -> Self {
        Self { store }
    }

    pub fn validate(&self, kind: ArtifactKind) -> ValidationResult {
        match kind {
            ArtifactKind::Prereqs => self.validate_prereqs(),
            ArtifactKind::Requirements => self.validate_requirements(),
            ArtifactKind::Context => self.validate_context(),
            ArtifactKind::SpecDocument => self.validate_spec_document(),
            ArtifactKind::ImplementationPlan => self.validate_implementation_plan(),
        }
    }

    pub fn validate_all(&self) -> Vec<ValidationResult> {
        ArtifactKind::gate()
            .iter()
            .map(|k| self.validate(*k))
            .collect()
    }

    fn read_object(&self, name: &str, kind: ArtifactKind) -> std::result::Result<Map<String, Value>, ValidationResult> {
        if !self.store.exists(name) {
            return Err(ValidationResult::new(
                kind,
                vec![format!("{name} not found")],
                vec![format!("Re-run the phase that produces {name}")],
            ));
        }
        match self.store.read_json(name) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(ValidationResult::new(
                kind,
                vec![format!("{name} must contain a JSON object")],
                Vec::new(),
            )),
            Err(e) => Err(ValidationResult::new(
                kind,
                vec![format!("{name} is not valid JSON: {e}")],
                vec![format!("Rewrite {name} as valid JSON")],
            )),
        }
    }

    fn validate_prereqs(&self) -> ValidationResult {
        let mut errors = Vec::new();
        let mut fixes = Vec::new();
        if !self.store.dir().is_dir() {
            errors.push(format!(
                "task directory does not exist: {}",
                self.store.dir().display()
            ));
        }
        if !self.store.exists(paths::PROJECT_INDEX) {
            errors.push(format!("{} not found", paths::PROJECT_INDEX));
            fixes.push("Run the discovery phase to create the project index".to_string());
        }
        ValidationResult::new(ArtifactKind::Prereqs, errors, fixes)
    }

    fn validate_requirements(&self) -> ValidationResult {
        let kind = ArtifactKind::Requirements;
        let map = match self.read_object(paths::REQUIREMENTS, kind) {
            Ok(m) => m,
            Err(r) => return r,
        };
        let mut errors = Vec::new();
        match map.get("task_description").and_then(Value::as_str) {
            Some(s) if !s.trim().is_empty() => {}
            _ => errors.push("missing required field: task_description".to_string()),
        }
        if let Some(w) = map.get("workflow_type") {
            let known = w
                .as_str()
                .map(|s| s.parse::<WorkflowType>().is_ok())
                .unwrap_or(false);
            if !known {
                errors.push(format!("unknown workflow_type: {w}"));
            }
        }
        ValidationResult::new(kind, errors, Vec::new())
    }

    fn validate_context(&self) -> ValidationResult {
        let kind = ArtifactKind::Context;
        let map = match self.read_object(paths::CONTEXT, kind) {
            Ok(m) => m,
            Err(r) => return r,
        };
        let mut errors = Vec::new();
        let mut fixes = Vec::new();
        if !map.contains_key("task_description") {
            errors.push("missing required field: task_description".to_string());
            if map.contains_key("task") {
                fixes.push("Rename 'task' to 'task_description'".to_string());
            } else {
                fixes.push("Add 'task_description' to context.json".to_string());
            }
        }
        for field in ["files_to_modify", "files_to_reference", "scoped_services"] {
            if !map.contains_key(field) {
                fixes.push(format!("Consider adding '{field}'"));
            }
        }
        ValidationResult::new(kind, errors, fixes)
    }

    fn validate_spec_document(&self) -> ValidationResult {
        let kind = ArtifactKind::SpecDocument;
        let content = match self.store.read_text(paths::SPEC_MD) {
            Ok(c) => c,
            Err(_) => {
                return ValidationResult::new(
                    kind,
                    vec!["spec.md not found".to_string()],
                    vec!["Write spec.md in the task directory".to_string()],
                )
            }
        };
        let mut errors = Vec::new();
        let mut fixes = Vec::new();
        for section in REQUIRED_SPEC_SECTIONS {
            if !has_section(&content, section) {
                errors.push(format!("missing required section: {section}"));
                fixes.push(format!("Add a '## {section}' section"));
            }
        }
        for section in RECOMMENDED_SPEC_SECTIONS {
            if !has_section(&content, section) {
                fixes.push(format!("Consider adding a '## {section}' section"));
            }
        }
        if content.trim().len() < MIN_SPEC_CHARS {
            fixes.push("Spec is very short; consider adding detail".to_string());
        }
        ValidationResult::new(kind, errors, fixes)
    }

    fn validate_implementation_plan(&self) -> ValidationResult {
        let kind = ArtifactKind::ImplementationPlan;
        let map = match self.read_object(paths::IMPLEMENTATION_PLAN, kind) {
            Ok(m) => m,
            Err(r) => return r,
        };
        let (errors, fixes) = check_plan(&map);
        ValidationResult::new(kind, errors, fixes)
    }

    // -----------------------------------------------------------------------
    // Auto-fix
    // -----------------------------------------------------------------------

    /// Apply deterministic repairs for `kind`. Returns `true` when the
    /// artifact was rewritten.
    pub fn auto_fix(&self, kind: ArtifactKind) -> Result<bool> {
        match kind {
            ArtifactKind::Context => self.fix_context(),
            ArtifactKind::ImplementationPlan => self.fix_plan(),
            ArtifactKind::Prereqs | ArtifactKind::Requirements | ArtifactKind::SpecDocument => {
                Ok(false)
            }
        }
    }

    fn fix_context(&self) -> Result<bool> {
        let Ok(Value::Object(mut map)) = self.store.read_json(paths::CONTEXT) else {
            return Ok(false);
        };
        if map.contains_key("task_description") {
            return Ok(false);
        }
        if let Some(task) = map.remove("task") {
            map.insert("task_description".to_string(), task);
        } else {
            let from_requirements = self
                .store
                .read_json(paths::REQUIREMENTS)
                .ok()
                .and_then(|r| r.get("task_description").cloned());
            match from_requirements {
                Some(desc) => {
                    map.insert("task_description".to_string(), desc);
                }
                None => return Ok(false),
            }
        }
        self.store.write_json(paths::CONTEXT, &Value::Object(map))?;
        tracing::info!(artifact = paths::CONTEXT, "auto-fixed task_description");
        Ok(true)
    }

    fn fix_plan(&self) -> Result<bool> {
        let Ok(Value::Object(mut map)) = self.store.read_json(paths::IMPLEMENTATION_PLAN) else {
            return Ok(false);
        };
        let changed = repair_plan(&mut map);
        if changed {
            self.store
                .write_json(paths::IMPLEMENTATION_PLAN, &Value::Object(map))?;
            tracing::info!(artifact = paths::IMPLEMENTATION_PLAN, "auto-fixed plan shape");
        }
        Ok(changed)
    }
}

// ---------------------------------------------------------------------------
// Plan rules
// ---------------------------------------------------------------------------

fn non_empty_str(v: Option<&Value>) -> bool {
    v.and_then(Value::as_str)
        .map(|s| !s.trim().is_empty())
        .unwrap_or(false)
}

fn check_plan(map: &Map<String, Value>) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut fixes = Vec::new();

    let Some(phases) = map.get("phases").and_then(Value::as_array) else {
        errors.push("missing required field: phases".to_string());
        return (errors, fixes);
    };
    if phases.is_empty() {
        errors.push("plan has no phases".to_string());
        return (errors, fixes);
    }

    let numbers: HashSet<u64> = phases
        .iter()
        .filter_map(|p| p.get("phase").and_then(Value::as_u64))
        .collect();
    let mut chunk_ids = HashSet::new();

    for (i, phase) in phases.iter().enumerate() {
        let label = format!("phase {}", i + 1);
        if phase.get("phase").and_then(Value::as_u64).is_none() {
            errors.push(format!("{label}: missing 'phase' number"));
            fixes.push(format!("Set 'phase': {} on {label}", i + 1));
        }
        if !non_empty_str(phase.get("name")) {
            errors.push(format!("{label}: missing 'name'"));
        }
        for dep in phase
            .get("depends_on")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            let known = dep.as_u64().map(|d| numbers.contains(&d)).unwrap_or(false);
            if !known {
                errors.push(format!("{label}: depends_on references unknown phase {dep}"));
            }
        }

        let chunks = match phase.get("chunks").and_then(Value::as_array) {
            Some(c) => c,
            None => {
                errors.push(format!("{label}: missing 'chunks'"));
                if phase.get("subtasks").is_some() {
                    fixes.push(format!("Rename 'subtasks' to 'chunks' on {label}"));
                }
                continue;
            }
        };
        if chunks.is_empty() {
            errors.push(format!("{label}: has no chunks"));
        }

        for (j, chunk) in chunks.iter().enumerate() {
            let clabel = format!("{label} chunk {}", j + 1);
            match chunk.get("id").and_then(Value::as_str) {
                Some(id) if !id.trim().is_empty() => {
                    if !chunk_ids.insert(id.to_string()) {
                        errors.push(format!("{clabel}: duplicate chunk id '{id}'"));
                    }
                }
                _ => errors.push(format!("{clabel}: missing 'id'")),
            }
            if !non_empty_str(chunk.get("description")) {
                errors.push(format!("{clabel}: missing 'description'"));
            }
            match chunk.get("verification") {
                Some(Value::Object(v)) if non_empty_str(v.get("type")) => {}
                Some(_) => errors.push(format!("{clabel}: verification has no 'type'")),
                None => {
                    errors.push(format!("{clabel}: missing 'verification'"));
                    fixes.push(format!("Add a verification spec to {clabel}"));
                }
            }
            if let Some(status) = chunk.get("status") {
                let known = status
                    .as_str()
                    .map(|s| ChunkStatus::ALL.contains(&s))
                    .unwrap_or(false);
                if !known {
                    errors.push(format!("{clabel}: unknown status {status}"));
                }
            }
        }
    }

    (errors, fixes)
}

/// Deterministic shape repairs; returns whether anything changed.
fn repair_plan(map: &mut Map<String, Value>) -> bool {
    let mut changed = false;
    let Some(Value::Array(phases)) = map.get_mut("phases") else {
        return false;
    };

    for (i, phase) in phases.iter_mut().enumerate() {
        let Value::Object(phase) = phase else { continue };
        let number = i as u64 + 1;

        if phase.get("phase").and_then(Value::as_u64).is_none() {
            phase.insert("phase".into(), Value::from(number));
            changed = true;
        }
        let phase_no = phase
            .get("phase")
            .and_then(Value::as_u64)
            .unwrap_or(number);
        if !non_empty_str(phase.get("name")) {
            phase.insert("name".into(), Value::from(format!("Phase {phase_no}")));
            changed = true;
        }
        if !phase.contains_key("chunks") {
            if let Some(subtasks) = phase.remove("subtasks") {
                phase.insert("chunks".into(), subtasks);
                changed = true;
            }
        }

        let Some(Value::Array(chunks)) = phase.get_mut("chunks") else {
            continue;
        };
        for (j, chunk) in chunks.iter_mut().enumerate() {
            let Value::Object(chunk) = chunk else { continue };
            if !non_empty_str(chunk.get("id")) {
                chunk.insert("id".into(), Value::from(format!("chunk-{phase_no}-{}", j + 1)));
                changed = true;
            }
            if !chunk.contains_key("status") {
                chunk.insert("status".into(), Value::from("pending"));
                changed = true;
            }
            let has_type = matches!(chunk.get("verification"), Some(Value::Object(v)) if non_empty_str(v.get("type")));
            if !has_type {
                chunk.insert("verification".into(), serde_json::json!({"type": "manual"}));
                changed = true;
            }
        }
    }

    let count = phases.len();
    if map.get("total_phases").and_then(Value::as_u64) != Some(count as u64) {
        map.insert("total_phases".into(), Value::from(count));
        changed = true;
    }
    changed
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store() -> (TempDir, ArtifactStore) {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        (dir, store)
    }

    const GOOD_SPEC: &str = "# Fix button\n\n## Overview\nx\n\n## Workflow Type\nfeature\n\n## Task Scope\ny\n\n## Success Criteria\nz\n";

    fn good_plan() -> Value {
        json!({
            "phases": [
                {"phase": 1, "name": "Backend", "depends_on": [], "chunks": [
                    {"id": "c1", "description": "endpoint", "status": "pending",
                     "verification": {"type": "command", "run": "cargo test"}}
                ]},
                {"phase": 2, "name": "Frontend", "depends_on": [1], "chunks": [
                    {"id": "c2", "description": "form", "verification": {"type": "browser"}}
                ]}
            ]
        })
    }

    #[test]
    fn spec_document_requires_sections() {
        let (_d, store) = store();
        store.write_text("spec.md", "# Title\n\n## Overview\nonly this\n").unwrap();
        let r = Validator::new(&store).validate(ArtifactKind::SpecDocument);
        assert!(!r.valid);
        assert_eq!(r.errors.len(), 3);
        assert!(r.errors.iter().any(|e| e.contains("Success Criteria")));
    }

    #[test]
    fn spec_document_accepts_any_heading_level_and_case() {
        let (_d, store) = store();
        store
            .write_text(
                "spec.md",
                "### overview\n#### WORKFLOW TYPE\n## Task Scope\n# Success criteria\n",
            )
            .unwrap();
        let r = Validator::new(&store).validate(ArtifactKind::SpecDocument);
        assert!(r.valid, "{:?}", r.errors);
    }

    #[test]
    fn section_headings_match_whole_words_only() {
        assert!(has_section("  ## Overview (draft)\n", "Overview"));
        assert!(has_section("#Task Scope\n", "Task Scope"));
        assert!(!has_section("## Overviews\n", "Overview"));
        assert!(!has_section("Overview\n", "Overview"));
        assert!(!has_section("####### Overview\n", "Overview"));
        assert!(!has_section("## Notes\nOverview of things\n", "Overview"));
    }

    #[test]
    fn missing_spec_is_invalid() {
        let (_d, store) = store();
        let r = Validator::new(&store).validate(ArtifactKind::SpecDocument);
        assert!(!r.valid);
    }

    #[test]
    fn plan_valid() {
        let (_d, store) = store();
        store.write_json("implementation_plan.json", &good_plan()).unwrap();
        let r = Validator::new(&store).validate(ArtifactKind::ImplementationPlan);
        assert!(r.valid, "{:?}", r.errors);
    }

    #[test]
    fn plan_rejects_empty_phases_and_chunkless_phase() {
        let (_d, store) = store();
        store
            .write_json("implementation_plan.json", &json!({"phases": []}))
            .unwrap();
        assert!(!Validator::new(&store)
            .validate(ArtifactKind::ImplementationPlan)
            .valid);

        store
            .write_json(
                "implementation_plan.json",
                &json!({"phases": [{"phase": 1, "name": "A", "chunks": []}]}),
            )
            .unwrap();
        let r = Validator::new(&store).validate(ArtifactKind::ImplementationPlan);
        assert!(r.errors.iter().any(|e| e.contains("no chunks")));
    }

    #[test]
    fn plan_rejects_bad_dependency_and_duplicate_ids() {
        let (_d, store) = store();
        let mut plan = good_plan();
        plan["phases"][1]["depends_on"] = json!([7]);
        plan["phases"][1]["chunks"][0]["id"] = json!("c1");
        store.write_json("implementation_plan.json", &plan).unwrap();
        let r = Validator::new(&store).validate(ArtifactKind::ImplementationPlan);
        assert!(r.errors.iter().any(|e| e.contains("unknown phase 7")));
        assert!(r.errors.iter().any(|e| e.contains("duplicate chunk id")));
    }

    #[test]
    fn auto_fix_repairs_plan_shape() {
        let (_d, store) = store();
        store
            .write_json(
                "implementation_plan.json",
                &json!({"phases": [{"name": "Only", "subtasks": [{"description": "do it"}]}]}),
            )
            .unwrap();
        let v = Validator::new(&store);
        assert!(!v.validate(ArtifactKind::ImplementationPlan).valid);
        assert!(v.auto_fix(ArtifactKind::ImplementationPlan).unwrap());
        let r = v.validate(ArtifactKind::ImplementationPlan);
        assert!(r.valid, "{:?}", r.errors);

        let fixed = store.read_json("implementation_plan.json").unwrap();
        assert_eq!(fixed["phases"][0]["chunks"][0]["id"], "chunk-1-1");
        assert_eq!(fixed["total_phases"], 1);
    }

    #[test]
    fn auto_fix_context_renames_task() {
        let (_d, store) = store();
        store
            .write_json("context.json", &json!({"task": "Fix typo", "files_to_modify": []}))
            .unwrap();
        let v = Validator::new(&store);
        let before = v.validate(ArtifactKind::Context);
        assert!(!before.valid);
        assert!(before.fixes.iter().any(|f| f.contains("Rename 'task'")));

        assert!(v.auto_fix(ArtifactKind::Context).unwrap());
        assert!(v.validate(ArtifactKind::Context).valid);
        let ctx = store.read_json("context.json").unwrap();
        assert_eq!(ctx["task_description"], "Fix typo");
        assert!(ctx.get("task").is_none());
    }

    #[test]
    fn auto_fix_context_falls_back_to_requirements() {
        let (_d, store) = store();
        store
            .write_json("requirements.json", &json!({"task_description": "Add search"}))
            .unwrap();
        store.write_json("context.json", &json!({})).unwrap();
        let v = Validator::new(&store);
        assert!(v.auto_fix(ArtifactKind::Context).unwrap());
        assert_eq!(store.read_json("context.json").unwrap()["task_description"], "Add search");
    }

    #[test]
    fn auto_fix_is_noop_on_valid_artifacts() {
        let (_d, store) = store();
        store
            .write_json("context.json", &json!({"task_description": "x"}))
            .unwrap();
        assert!(!Validator::new(&store).auto_fix(ArtifactKind::Context).unwrap());
    }

    #[test]
    fn requirements_rejects_unknown_workflow() {
        let (_d, store) = store();
        store
            .write_json(
                "requirements.json",
                &json!({"task_description": "x", "workflow_type": "chore"}),
            )
            .unwrap();
        let r = Validator::new(&store).validate(ArtifactKind::Requirements);
        assert!(!r.valid);
    }

    #[test]
    fn validate_all_reports_every_gate_kind() {
        let (_d, store) = store();
        store.write_json("project_index.json", &json!({})).unwrap();
        store
            .write_json("context.json", &json!({"task_description": "x"}))
            .unwrap();
        store.write_text("spec.md", GOOD_SPEC).unwrap();
        store.write_json("implementation_plan.json", &good_plan()).unwrap();
        let results = Validator::new(&store).validate_all();
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.valid));
        assert!(render_failures(&results).is_empty());
    }

    #[test]
    fn validation_never_mutates() {
        let (_d, store) = store();
        store.write_json("context.json", &json!({"task": "x"})).unwrap();
        let before = store.read_text("context.json").unwrap();
        let _ = Validator::new(&store).validate_all();
        assert_eq!(store.read_text("context.json").unwrap(), before);
    }
}
