//! Ideation: project index, gathered context, one agent phase per idea
//! category, then a merge into `ideation.json`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::{project_index_def, PhaseTracker, PipelineEnv, PipelineKind, RunSummary};
use crate::config::IdeationSettings;
use crate::error::{ForgeError, Result};
use crate::executor::{AgentTask, ContentCheck, PhaseDef, PhaseExecutor, Strategy};
use crate::paths;
use crate::step::{DeterministicStep, StepContext, WriteJson};
use crate::store::ArtifactStore;
use crate::types::ProjectIndex;

// ---------------------------------------------------------------------------
// IdeationCategory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdeationCategory {
    LowHangingFruit,
    UiUxImprovements,
    HighValueFeatures,
    DocumentationGaps,
    SecurityHardening,
    PerformanceOptimizations,
}

impl IdeationCategory {
    pub fn all() -> &'static [IdeationCategory] {
        &[
            IdeationCategory::LowHangingFruit,
            IdeationCategory::UiUxImprovements,
            IdeationCategory::HighValueFeatures,
            IdeationCategory::DocumentationGaps,
            IdeationCategory::SecurityHardening,
            IdeationCategory::PerformanceOptimizations,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IdeationCategory::LowHangingFruit => "low_hanging_fruit",
            IdeationCategory::UiUxImprovements => "ui_ux_improvements",
            IdeationCategory::HighValueFeatures => "high_value_features",
            IdeationCategory::DocumentationGaps => "documentation_gaps",
            IdeationCategory::SecurityHardening => "security_hardening",
            IdeationCategory::PerformanceOptimizations => "performance_optimizations",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            IdeationCategory::LowHangingFruit => "Low-Hanging Fruit",
            IdeationCategory::UiUxImprovements => "UI/UX Improvements",
            IdeationCategory::HighValueFeatures => "High-Value Features",
            IdeationCategory::DocumentationGaps => "Documentation Gaps",
            IdeationCategory::SecurityHardening => "Security Hardening",
            IdeationCategory::PerformanceOptimizations => "Performance Optimizations",
        }
    }

    pub fn prompt(self) -> &'static str {
        match self {
            IdeationCategory::LowHangingFruit => "ideation_low_hanging_fruit",
            IdeationCategory::UiUxImprovements => "ideation_ui_ux",
            IdeationCategory::HighValueFeatures => "ideation_high_value",
            IdeationCategory::DocumentationGaps => "ideation_documentation",
            IdeationCategory::SecurityHardening => "ideation_security",
            IdeationCategory::PerformanceOptimizations => "ideation_performance",
        }
    }

    /// `<category>_ideas.json`.
    pub fn artifact(self) -> &'static str {
        match self {
            IdeationCategory::LowHangingFruit => "low_hanging_fruit_ideas.json",
            IdeationCategory::UiUxImprovements => "ui_ux_improvements_ideas.json",
            IdeationCategory::HighValueFeatures => "high_value_features_ideas.json",
            IdeationCategory::DocumentationGaps => "documentation_gaps_ideas.json",
            IdeationCategory::SecurityHardening => "security_hardening_ideas.json",
            IdeationCategory::PerformanceOptimizations => "performance_optimizations_ideas.json",
        }
    }
}

impl fmt::Display for IdeationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IdeationCategory {
    type Err = ForgeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        IdeationCategory::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| ForgeError::UnknownCategory(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct IdeationOptions {
    /// Defaults to `.specforge/ideation`.
    pub output_dir: Option<PathBuf>,
    /// Empty means every category.
    pub categories: Vec<IdeationCategory>,
    pub refresh: bool,
}

impl IdeationOptions {
    pub fn enabled(&self) -> Vec<IdeationCategory> {
        if self.categories.is_empty() {
            IdeationCategory::all().to_vec()
        } else {
            self.categories.clone()
        }
    }
}

pub struct IdeationPipeline<'e> {
    env: &'e PipelineEnv<'e>,
}

impl<'e> IdeationPipeline<'e> {
    pub fn new(env: &'e PipelineEnv<'e>) -> Self {
        Self { env }
    }

    pub async fn run(&self, opts: &IdeationOptions) -> Result<RunSummary> {
        let dir = opts
            .output_dir
            .clone()
            .unwrap_or_else(|| paths::ideation_dir(&self.env.project_dir));
        let store = ArtifactStore::open(dir)?;
        let categories = opts.enabled();
        let settings = &self.env.ideation;
        tracing::info!(dir = %store.dir().display(), categories = categories.len(), "ideation directory");

        let driver = self.env.driver();
        let exec = PhaseExecutor::new(&driver, &self.env.scripts, self.env.max_attempts)
            .refresh(opts.refresh);
        let mut tracker = PhaseTracker::new();

        tracker.begin("project_index");
        let def = project_index_def("project_index", &self.env.project_dir, &store);
        if !tracker.record(exec.execute(&store, &def).await) {
            return Ok(tracker.finish(PipelineKind::Ideation, store.dir(), Vec::new()));
        }

        tracker.begin("context");
        let gathered = gather_context(&self.env.project_dir, &store, settings, &categories);
        let def = PhaseDef::new(
            "context",
            Strategy::Deterministic(Box::new(WriteJson {
                artifact: paths::IDEATION_CONTEXT,
                value: gathered,
            })),
        )
        .artifact(paths::IDEATION_CONTEXT)
        .check(ContentCheck::JsonKeys(vec!["tech_stack", "planned_features"]))
        .degradable(
            "context_failed",
            json!({
                "existing_features": [],
                "tech_stack": [],
                "target_audience": null,
                "planned_features": [],
            }),
        );
        if !tracker.record(exec.execute(&store, &def).await) {
            return Ok(tracker.finish(PipelineKind::Ideation, store.dir(), Vec::new()));
        }

        for category in &categories {
            tracker.begin(category.as_str());
            let def = category_def(*category, &store, settings.max_ideas_per_type);
            if !tracker.record(exec.execute(&store, &def).await) {
                return Ok(tracker.finish(PipelineKind::Ideation, store.dir(), Vec::new()));
            }
        }

        // The merge always reflects the category files as they are now.
        let merge_exec = PhaseExecutor::new(&driver, &self.env.scripts, self.env.max_attempts)
            .refresh(true);
        tracker.begin("merge");
        let def = PhaseDef::new(
            "merge",
            Strategy::Deterministic(Box::new(MergeIdeas {
                categories: categories.clone(),
                settings: settings.clone(),
            })),
        )
        .artifact(paths::IDEATION)
        .check(ContentCheck::AllOf(vec![
            ContentCheck::JsonKeys(vec!["ideas", "summary"]),
            ContentCheck::MinItems {
                key: "ideas",
                min: 0,
                message: "ideation.json has no ideas list".to_string(),
            },
        ]));
        if !tracker.record(merge_exec.execute(&store, &def).await) {
            return Ok(tracker.finish(PipelineKind::Ideation, store.dir(), Vec::new()));
        }

        let details = match store.read_json(paths::IDEATION) {
            Ok(merged) => summarize(&merged, &store, &categories),
            Err(e) => {
                tracing::warn!(error = %e, "could not read ideation.json for summary");
                Vec::new()
            }
        };
        Ok(tracker.finish(PipelineKind::Ideation, store.dir(), details))
    }
}

fn category_def(category: IdeationCategory, store: &ArtifactStore, max_ideas: u32) -> PhaseDef {
    let context = format!(
        "**Ideation Context**: {}\n**Project Index**: {}\n**Output File**: {}\n**Max Ideas**: {max_ideas}\n\n\
         Generate up to {max_ideas} {} ideas.\n\
         Avoid duplicating features that are already planned (see ideation_context.json).\n\
         Output your ideas to {}.\n",
        store.path(paths::IDEATION_CONTEXT).display(),
        store.path(paths::PROJECT_INDEX).display(),
        store.path(category.artifact()).display(),
        category.label(),
        category.artifact(),
    );
    PhaseDef::new(
        category.as_str(),
        Strategy::Agent(AgentTask::new(category.prompt()).with_context(context)),
    )
    .artifact(category.artifact())
    .check(ContentCheck::MinItems {
        key: category.as_str(),
        min: 1,
        message: format!("No {category} ideas generated"),
    })
    .degradable(
        format!("{category}_failed"),
        json!({ category.as_str(): [] }),
    )
}

// ---------------------------------------------------------------------------
// Context gathering
// ---------------------------------------------------------------------------

fn read_json_file(path: &Path) -> Option<Value> {
    let text = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&text) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable context file");
            None
        }
    }
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    let item = item.trim();
    if !item.is_empty() && !list.iter().any(|x| x == item) {
        list.push(item.to_string());
    }
}

/// Tech stack, planned features and audience from the project index, the
/// roadmap, and the titles of existing specs.
pub fn gather_context(
    project_dir: &Path,
    store: &ArtifactStore,
    settings: &IdeationSettings,
    categories: &[IdeationCategory],
) -> Value {
    let tech_stack = store
        .read_as::<ProjectIndex>(paths::PROJECT_INDEX)
        .map(|index| index.tech_stack())
        .unwrap_or_default();

    let mut planned: Vec<String> = Vec::new();
    let mut existing: Vec<String> = Vec::new();
    let mut audience: Option<String> = None;

    if settings.include_roadmap_context {
        let roadmap_dir = paths::roadmap_dir(project_dir);
        if let Some(roadmap) = read_json_file(&roadmap_dir.join(paths::ROADMAP)) {
            for feature in roadmap
                .get("features")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                if let Some(title) = feature.get("title").and_then(Value::as_str) {
                    push_unique(&mut planned, title);
                }
            }
            audience = roadmap
                .pointer("/target_audience/primary")
                .and_then(Value::as_str)
                .map(str::to_string);
        }
        if let Some(discovery) = read_json_file(&roadmap_dir.join(paths::ROADMAP_DISCOVERY)) {
            if audience.is_none() {
                audience = discovery
                    .pointer("/target_audience/primary_persona")
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
            for feature in discovery
                .pointer("/current_state/existing_features")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(Value::as_str)
            {
                push_unique(&mut existing, feature);
            }
        }
    }

    if settings.include_kanban_context {
        for title in spec_titles(&paths::specs_dir(project_dir, false)) {
            push_unique(&mut planned, &title);
        }
    }

    json!({
        "existing_features": existing,
        "tech_stack": tech_stack,
        "target_audience": audience,
        "planned_features": planned,
        "config": {
            "enabled_types": categories.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
            "include_roadmap_context": settings.include_roadmap_context,
            "include_kanban_context": settings.include_kanban_context,
            "max_ideas_per_type": settings.max_ideas_per_type,
        },
        "created_at": chrono::Utc::now().to_rfc3339(),
    })
}

/// First `# ` heading of every `spec.md` under `specs_dir`.
fn spec_titles(specs_dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(specs_dir) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs.iter()
        .filter_map(|d| std::fs::read_to_string(d.join(paths::SPEC_MD)).ok())
        .filter_map(|text| {
            text.lines()
                .find_map(|l| l.strip_prefix("# ").map(|t| t.trim().to_string()))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Concatenates the category files into `ideation.json`. No deduplication.
pub struct MergeIdeas {
    pub categories: Vec<IdeationCategory>,
    pub settings: IdeationSettings,
}

impl MergeIdeas {
    pub fn merge(&self, store: &ArtifactStore, project_dir: &Path) -> Result<Value> {
        let mut ideas: Vec<Value> = Vec::new();
        let mut by_type: Map<String, Value> = Map::new();
        let mut by_status: BTreeMap<String, usize> = BTreeMap::new();

        for category in &self.categories {
            let items = match store.read_json(category.artifact()) {
                Ok(doc) => doc
                    .get(category.as_str())
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default(),
                Err(ForgeError::ArtifactNotFound(_)) => Vec::new(),
                Err(e) => {
                    tracing::warn!(artifact = category.artifact(), error = %e, "skipping unreadable ideas file");
                    Vec::new()
                }
            };
            by_type.insert(category.as_str().to_string(), Value::from(items.len()));
            for mut idea in items {
                if let Value::Object(map) = &mut idea {
                    map.entry("type")
                        .or_insert_with(|| Value::from(category.as_str()));
                }
                let status = idea
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or("draft")
                    .to_string();
                *by_status.entry(status).or_default() += 1;
                ideas.push(idea);
            }
        }

        let context = store.read_json(paths::IDEATION_CONTEXT).unwrap_or(Value::Null);
        let field = |key: &str| context.get(key).cloned().unwrap_or(Value::Null);
        let now = chrono::Utc::now();
        let project_id = project_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(json!({
            "id": format!("ideation-{}", now.format("%Y%m%d-%H%M%S")),
            "project_id": project_id,
            "config": {
                "enabled_types": self.categories.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
                "include_roadmap_context": self.settings.include_roadmap_context,
                "include_kanban_context": self.settings.include_kanban_context,
                "max_ideas_per_type": self.settings.max_ideas_per_type,
            },
            "project_context": {
                "existing_features": field("existing_features"),
                "tech_stack": field("tech_stack"),
                "target_audience": field("target_audience"),
                "planned_features": field("planned_features"),
            },
            "summary": {
                "total_ideas": ideas.len(),
                "by_type": by_type,
                "by_status": by_status,
            },
            "ideas": ideas,
            "generated_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339(),
        }))
    }
}

impl DeterministicStep for MergeIdeas {
    fn run<'a>(&'a self, cx: &'a StepContext<'a>) -> BoxFuture<'a, std::result::Result<(), String>> {
        let res = self
            .merge(cx.store, cx.project_dir)
            .and_then(|merged| cx.store.write_json(paths::IDEATION, &merged))
            .map(|_| ())
            .map_err(|e| e.to_string());
        futures::future::ready(res).boxed()
    }
}

/// Total, per-category counts, and categories that degraded.
fn summarize(
    merged: &Value,
    store: &ArtifactStore,
    categories: &[IdeationCategory],
) -> Vec<(String, String)> {
    let mut details = vec![(
        "total_ideas".to_string(),
        merged
            .pointer("/summary/total_ideas")
            .and_then(Value::as_u64)
            .unwrap_or(0)
            .to_string(),
    )];
    for category in categories {
        let n = merged
            .pointer(&format!("/summary/by_type/{category}"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        details.push((category.label().to_string(), n.to_string()));
    }
    let failed: Vec<&str> = categories
        .iter()
        .filter(|c| {
            store
                .read_json(c.artifact())
                .ok()
                .and_then(|v| v.get(format!("{c}_failed")).and_then(Value::as_bool))
                .unwrap_or(false)
        })
        .map(|c| c.as_str())
        .collect();
    if !failed.is_empty() {
        details.push(("failed".to_string(), failed.join(", ")));
    }
    details
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn categories_parse_and_reject_unknowns() {
        for c in IdeationCategory::all() {
            assert_eq!(c.as_str().parse::<IdeationCategory>().unwrap(), *c);
            assert_eq!(c.artifact(), paths::ideas_file(c.as_str()));
        }
        let err = "moonshots".parse::<IdeationCategory>().unwrap_err();
        assert!(matches!(err, ForgeError::UnknownCategory(_)));
    }

    #[test]
    fn merge_counts_each_category() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path().join("ideation")).unwrap();
        let ideas = |n: usize| (0..n).map(|i| json!({"id": i, "title": format!("idea {i}")})).collect::<Vec<_>>();
        store
            .write_json("low_hanging_fruit_ideas.json", &json!({"low_hanging_fruit": ideas(2)}))
            .unwrap();
        store
            .write_json("ui_ux_improvements_ideas.json", &json!({"ui_ux_improvements": [], "ui_ux_improvements_failed": true}))
            .unwrap();
        store
            .write_json("security_hardening_ideas.json", &json!({"security_hardening": ideas(5)}))
            .unwrap();

        let step = MergeIdeas {
            categories: vec![
                IdeationCategory::LowHangingFruit,
                IdeationCategory::UiUxImprovements,
                IdeationCategory::SecurityHardening,
            ],
            settings: IdeationSettings::default(),
        };
        let merged = step.merge(&store, dir.path()).unwrap();
        assert_eq!(merged["summary"]["total_ideas"], 7);
        assert_eq!(merged["summary"]["by_type"]["low_hanging_fruit"], 2);
        assert_eq!(merged["summary"]["by_type"]["ui_ux_improvements"], 0);
        assert_eq!(merged["summary"]["by_type"]["security_hardening"], 5);
        assert_eq!(merged["summary"]["by_status"]["draft"], 7);
        assert_eq!(merged["ideas"][0]["type"], "low_hanging_fruit");
        assert!(merged["id"].as_str().unwrap().starts_with("ideation-"));

        let details = summarize(&merged, &store, &step.categories);
        assert_eq!(details[0].1, "7");
        assert_eq!(details.last().unwrap().1, "ui_ux_improvements");
    }

    #[test]
    fn merge_skips_unreadable_category_files() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path().join("ideation")).unwrap();
        store
            .write_json(
                "documentation_gaps_ideas.json",
                &json!({"documentation_gaps": [{"id": "doc-1", "title": "API guide", "status": "accepted"}]}),
            )
            .unwrap();
        store
            .write_text("performance_optimizations_ideas.json", "{ not json")
            .unwrap();

        let step = MergeIdeas {
            categories: vec![
                IdeationCategory::DocumentationGaps,
                IdeationCategory::PerformanceOptimizations,
                IdeationCategory::HighValueFeatures,
            ],
            settings: IdeationSettings::default(),
        };
        let merged = step.merge(&store, dir.path()).unwrap();
        assert_eq!(merged["summary"]["total_ideas"], 1);
        assert_eq!(merged["summary"]["by_type"]["documentation_gaps"], 1);
        assert_eq!(merged["summary"]["by_type"]["performance_optimizations"], 0);
        assert_eq!(merged["summary"]["by_type"]["high_value_features"], 0);
        assert_eq!(merged["summary"]["by_status"]["accepted"], 1);
        assert_eq!(merged["ideas"][0]["title"], "API guide");
    }

    #[test]
    fn context_collects_roadmap_and_spec_titles() {
        let dir = TempDir::new().unwrap();
        let project = dir.path();
        std::fs::create_dir_all(project.join(".specforge/roadmap")).unwrap();
        std::fs::write(
            project.join(".specforge/roadmap/roadmap.json"),
            r#"{"features":[{"title":"Dark mode"},{"title":"SSO"}],"target_audience":{"primary":"Teams"}}"#,
        )
        .unwrap();
        std::fs::create_dir_all(project.join(".specforge/specs/001-sso")).unwrap();
        std::fs::write(project.join(".specforge/specs/001-sso/spec.md"), "# SSO\n\nbody").unwrap();
        std::fs::create_dir_all(project.join(".specforge/specs/002-export")).unwrap();
        std::fs::write(project.join(".specforge/specs/002-export/spec.md"), "# CSV export\n").unwrap();

        let store = ArtifactStore::open(project.join(".specforge/ideation")).unwrap();
        store
            .write_json(
                paths::PROJECT_INDEX,
                &json!({"services": {"api": {"language": "rust", "framework": "axum"}}}),
            )
            .unwrap();
        let ctx = gather_context(
            project,
            &store,
            &IdeationSettings::default(),
            &[IdeationCategory::HighValueFeatures],
        );
        assert_eq!(ctx["planned_features"], json!(["Dark mode", "SSO", "CSV export"]));
        assert_eq!(ctx["target_audience"], "Teams");
        assert_eq!(ctx["tech_stack"], json!(["axum", "rust"]));
        assert_eq!(ctx["config"]["enabled_types"], json!(["high_value_features"]));

        let without = IdeationSettings {
            include_roadmap_context: false,
            include_kanban_context: false,
            ..IdeationSettings::default()
        };
        let ctx = gather_context(project, &store, &without, &[]);
        assert_eq!(ctx["planned_features"], json!([]));
        assert!(ctx["target_audience"].is_null());
    }
}
