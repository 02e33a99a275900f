//! Roadmap generation: project index, product discovery, feature roadmap.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;

use super::{project_index_def, PhaseTracker, PipelineEnv, PipelineKind, RunSummary};
use crate::error::Result;
use crate::executor::{AgentTask, ContentCheck, PhaseDef, PhaseExecutor, Strategy};
use crate::paths;
use crate::store::ArtifactStore;

#[derive(Debug, Clone, Default)]
pub struct RoadmapOptions {
    /// Defaults to `.specforge/roadmap`.
    pub output_dir: Option<PathBuf>,
    /// Regenerate every artifact, even ones that already pass their checks.
    pub refresh: bool,
}

pub struct RoadmapPipeline<'e> {
    env: &'e PipelineEnv<'e>,
}

impl<'e> RoadmapPipeline<'e> {
    pub fn new(env: &'e PipelineEnv<'e>) -> Self {
        Self { env }
    }

    pub async fn run(&self, opts: &RoadmapOptions) -> Result<RunSummary> {
        let dir = opts
            .output_dir
            .clone()
            .unwrap_or_else(|| paths::roadmap_dir(&self.env.project_dir));
        let store = ArtifactStore::open(dir)?;
        tracing::info!(dir = %store.dir().display(), refresh = opts.refresh, "roadmap directory");

        let driver = self.env.driver();
        let exec = PhaseExecutor::new(&driver, &self.env.scripts, self.env.max_attempts)
            .refresh(opts.refresh);
        let mut tracker = PhaseTracker::new();

        for def in self.phases(&store) {
            tracker.begin(&def.name);
            if !tracker.record(exec.execute(&store, &def).await) {
                return Ok(tracker.finish(PipelineKind::Roadmap, store.dir(), Vec::new()));
            }
        }

        let details = match store.read_json(paths::ROADMAP) {
            Ok(roadmap) => summarize(&roadmap),
            Err(e) => {
                tracing::warn!(error = %e, "could not read roadmap for summary");
                Vec::new()
            }
        };
        Ok(tracker.finish(PipelineKind::Roadmap, store.dir(), details))
    }

    fn phases(&self, store: &ArtifactStore) -> Vec<PhaseDef> {
        let index = store.path(paths::PROJECT_INDEX);
        let discovery = store.path(paths::ROADMAP_DISCOVERY);
        let roadmap = store.path(paths::ROADMAP);

        vec![
            project_index_def("project_index", &self.env.project_dir, store),
            PhaseDef::new(
                "discovery",
                Strategy::Agent(AgentTask::new("roadmap_discovery").with_context(format!(
                    "**Project Index**: {}\n**Output File**: {}\n",
                    index.display(),
                    discovery.display()
                ))),
            )
            .artifact(paths::ROADMAP_DISCOVERY)
            .check(ContentCheck::JsonKeys(vec![
                "project_name",
                "target_audience",
                "product_vision",
            ])),
            PhaseDef::new(
                "features",
                Strategy::Agent(AgentTask::new("roadmap_features").with_context(format!(
                    "**Discovery File**: {}\n**Project Index**: {}\n**Output File**: {}\n",
                    discovery.display(),
                    index.display(),
                    roadmap.display()
                ))),
            )
            .artifact(paths::ROADMAP)
            .requires(paths::ROADMAP_DISCOVERY, "Discovery file not found")
            .check(ContentCheck::AllOf(vec![
                ContentCheck::JsonKeys(vec!["phases", "features", "vision"]),
                ContentCheck::MinItems {
                    key: "features",
                    min: 3,
                    message: "Roadmap has fewer than 3 features".to_string(),
                },
            ])),
        ]
    }
}

/// Vision, phase and feature counts, and features per priority.
fn summarize(roadmap: &Value) -> Vec<(String, String)> {
    let count = |key: &str| roadmap.get(key).and_then(Value::as_array).map_or(0, Vec::len);
    let mut priorities: BTreeMap<&str, usize> = BTreeMap::new();
    for feature in roadmap
        .get("features")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let priority = feature
            .get("priority")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        *priorities.entry(priority).or_default() += 1;
    }
    let breakdown = priorities
        .iter()
        .map(|(p, n)| format!("{p}: {n}"))
        .collect::<Vec<_>>()
        .join(", ");

    vec![
        (
            "vision".to_string(),
            roadmap
                .get("vision")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        ("phases".to_string(), count("phases").to_string()),
        ("features".to_string(), count("features").to_string()),
        ("priorities".to_string(), breakdown),
    ]
}
