use std::path::{Path, PathBuf};

use specforge_agent::{run_turn, AgentError, AgentEvent, AgentGateway, SessionConfig, TurnSummary};

use crate::prompt::PromptLibrary;

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("{0}")]
    Prompt(String),
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),
}

/// Renders a prompt template and runs one agent turn scoped to a task
/// directory. Shared by the phase executor and the agent assessor.
pub struct AgentDriver<'a> {
    gateway: &'a dyn AgentGateway,
    prompts: &'a PromptLibrary,
    project_dir: PathBuf,
    model: Option<String>,
}

impl<'a> AgentDriver<'a> {
    pub fn new(
        gateway: &'a dyn AgentGateway,
        prompts: &'a PromptLibrary,
        project_dir: impl Into<PathBuf>,
        model: Option<String>,
    ) -> Self {
        Self {
            gateway,
            prompts,
            project_dir: project_dir.into(),
            model,
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub async fn run(
        &self,
        template: &str,
        task_dir: &Path,
        context: &str,
    ) -> Result<TurnSummary, TurnError> {
        let prompt = self
            .prompts
            .render(template, task_dir, &self.project_dir, context)
            .map_err(TurnError::Prompt)?;
        let config = SessionConfig {
            working_dir: self.project_dir.clone(),
            output_dir: task_dir.to_path_buf(),
            model: self.model.clone(),
        };
        tracing::debug!(template, task_dir = %task_dir.display(), "starting agent turn");
        let summary = run_turn(self.gateway, &config, &prompt, log_event).await?;
        tracing::debug!(template, tools = summary.tool_uses.len(), "agent turn finished");
        Ok(summary)
    }
}

fn log_event(event: &AgentEvent) {
    match event {
        AgentEvent::Text(text) => tracing::trace!(chars = text.len(), "agent text"),
        AgentEvent::ToolUse { name, .. } => tracing::debug!(tool = %name, "agent tool use"),
    }
}
