#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use specforge_agent::{AgentError, AgentEvent, AgentGateway, AgentSession, SessionConfig};
use tempfile::TempDir;

pub const TEMPLATES: &[&str] = &[
    "complexity_assessor",
    "spec_quick",
    "spec_researcher",
    "spec_writer",
    "spec_critic",
    "planner",
    "validation_fixer",
    "roadmap_discovery",
    "roadmap_features",
    "ideation_low_hanging_fruit",
    "ideation_ui_ux",
    "ideation_high_value",
    "ideation_documentation",
    "ideation_security",
    "ideation_performance",
];

/// A project with one prompt file per template (whose first line names the
/// template) and a shared project index, so discovery never needs a script.
pub fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let prompts = dir.path().join(".specforge/prompts");
    std::fs::create_dir_all(&prompts).unwrap();
    for name in TEMPLATES {
        std::fs::write(prompts.join(format!("{name}.md")), format!("TEMPLATE:{name}\n")).unwrap();
    }
    std::fs::write(
        dir.path().join(".specforge/project_index.json"),
        r#"{"project_type":"single","services":{"web":{"language":"typescript","framework":"react"}}}"#,
    )
    .unwrap();
    dir
}

type Handler = dyn Fn(&str, &Path) -> Result<(), String> + Send + Sync;

/// Gateway that dispatches on the template name; `Err` fails the turn.
pub struct ScriptedGateway {
    handler: Arc<Handler>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedGateway {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &Path) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, template: &str) -> usize {
        self.calls().iter().filter(|c| *c == template).count()
    }
}

impl AgentGateway for ScriptedGateway {
    fn open<'a>(
        &'a self,
        config: &'a SessionConfig,
    ) -> BoxFuture<'a, specforge_agent::Result<Box<dyn AgentSession>>> {
        let session: Box<dyn AgentSession> = Box::new(ScriptedSession {
            handler: Arc::clone(&self.handler),
            calls: Arc::clone(&self.calls),
            output_dir: config.output_dir.clone(),
            outcome: None,
        });
        futures::future::ready(Ok(session)).boxed()
    }
}

struct ScriptedSession {
    handler: Arc<Handler>,
    calls: Arc<Mutex<Vec<String>>>,
    output_dir: PathBuf,
    outcome: Option<Result<(), String>>,
}

impl AgentSession for ScriptedSession {
    fn send<'a>(&'a mut self, prompt: &'a str) -> BoxFuture<'a, specforge_agent::Result<()>> {
        let template = prompt
            .lines()
            .next()
            .and_then(|l| l.strip_prefix("TEMPLATE:"))
            .unwrap_or("unknown")
            .to_string();
        self.calls.lock().unwrap().push(template.clone());
        self.outcome = Some((self.handler)(&template, &self.output_dir));
        futures::future::ready(Ok(())).boxed()
    }

    fn receive_events(&mut self) -> BoxStream<'static, specforge_agent::Result<AgentEvent>> {
        let item = match self.outcome.take() {
            Some(Err(reason)) => Err(AgentError::Process(reason)),
            _ => Ok(AgentEvent::Text("done".to_string())),
        };
        futures::stream::iter(vec![item]).boxed()
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, specforge_agent::Result<()>> {
        futures::future::ready(Ok(())).boxed()
    }
}

// ---------------------------------------------------------------------------
// Artifact bodies
// ---------------------------------------------------------------------------

pub const SPEC_MD: &str = "# Feature\n\n## Overview\nWhat and why.\n\n## Workflow Type\nfeature\n\n\
## Task Scope\nFiles involved.\n\n## Success Criteria\n- It works\n";

pub const PLAN_JSON: &str = r#"{
  "spec_name": "test",
  "workflow_type": "feature",
  "total_phases": 2,
  "phases": [
    {"phase": 1, "name": "Backend", "chunks": [
      {"id": "c1", "description": "Add session store", "status": "pending", "verification": {"type": "command", "run": "cargo test"}}
    ]},
    {"phase": 2, "name": "Frontend", "depends_on": [1], "chunks": [
      {"id": "c2", "description": "Login button", "status": "pending", "verification": {"type": "manual"}}
    ]}
  ]
}"#;

pub fn write(dir: &Path, name: &str, body: &str) -> Result<(), String> {
    std::fs::write(dir.join(name), body).map_err(|e| e.to_string())
}

pub fn ideas(key: &str, n: usize) -> String {
    let items: Vec<serde_json::Value> = (0..n)
        .map(|i| serde_json::json!({"id": format!("{key}-{i}"), "title": format!("Idea {i}")}))
        .collect();
    serde_json::json!({ key: items }).to_string()
}
