use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ImplementationPlan
// ---------------------------------------------------------------------------

/// `implementation_plan.json`: ordered phases of work chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplementationPlan {
    #[serde(default)]
    pub spec_name: String,
    #[serde(default)]
    pub workflow_type: String,
    #[serde(default)]
    pub total_phases: usize,
    #[serde(default = "default_workers")]
    pub recommended_workers: u32,
    pub phases: Vec<PlanPhase>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

fn default_workers() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanPhase {
    pub phase: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub depends_on: Vec<u32>,
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub status: ChunkStatus,
    #[serde(default)]
    pub files_to_create: Vec<String>,
    #[serde(default)]
    pub files_to_modify: Vec<String>,
    #[serde(default)]
    pub patterns_from: Vec<String>,
    pub verification: Verification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    #[default]
    Pending,
    InProgress,
    AiReview,
    HumanReview,
    Done,
    Failed,
}

impl ChunkStatus {
    pub const ALL: &'static [&'static str] = &[
        "pending",
        "in_progress",
        "ai_review",
        "human_review",
        "done",
        "failed",
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
}

impl ImplementationPlan {
    pub fn chunk_count(&self) -> usize {
        self.phases.iter().map(|p| p.chunks.len()).sum()
    }
}

/// Single-phase, single-chunk plan used when a quick spec exists but the
/// agent produced no plan of its own.
pub fn minimal_plan(spec_name: &str, task_description: &str) -> ImplementationPlan {
    ImplementationPlan {
        spec_name: spec_name.to_string(),
        workflow_type: "simple".to_string(),
        total_phases: 1,
        recommended_workers: 1,
        phases: vec![PlanPhase {
            phase: 1,
            name: "Implementation".to_string(),
            description: task_description.to_string(),
            depends_on: Vec::new(),
            chunks: vec![Chunk {
                id: "chunk-1-1".to_string(),
                description: task_description.to_string(),
                service: "main".to_string(),
                status: ChunkStatus::Pending,
                files_to_create: Vec::new(),
                files_to_modify: Vec::new(),
                patterns_from: Vec::new(),
                verification: Verification {
                    kind: "manual".to_string(),
                    run: Some("Verify the change works as expected".to_string()),
                    url: None,
                    scenario: None,
                },
            }],
        }],
        metadata: serde_json::json!({
            "created_at": chrono::Utc::now().to_rfc3339(),
            "complexity": "simple",
            "estimated_sessions": 1,
        }),
    }
}
