use std::path::Path;

use anyhow::Context;
use clap::Args;
use specforge_core::complexity::{AssessmentInput, HeuristicAnalyzer};
use specforge_core::paths;
use specforge_core::types::ProjectIndex;

use crate::output::print_json;

#[derive(Args)]
pub struct AssessArgs {
    /// Task description to classify
    pub task: String,
}

/// Offline heuristic classification; never calls the agent.
pub fn run(root: &Path, args: AssessArgs, json: bool) -> anyhow::Result<()> {
    let index = load_index(root)?;
    let assessment = HeuristicAnalyzer.analyze(&AssessmentInput {
        task: &args.task,
        requirements: None,
        project_index: index.as_ref(),
    });

    if json {
        return print_json(&assessment.persisted(false));
    }

    println!("Complexity:  {}", assessment.complexity);
    println!("Confidence:  {:.0}%", assessment.confidence * 100.0);
    println!("Reasoning:   {}", assessment.reasoning);
    println!(
        "Scope:       {} file(s), {} service(s)",
        assessment.estimated_files, assessment.estimated_services
    );
    if !assessment.external_integrations.is_empty() {
        println!("Integrations: {}", assessment.external_integrations.join(", "));
    }
    if assessment.infrastructure_changes {
        println!("Infrastructure changes detected");
    }
    println!("Phases:      {}", assessment.phases_to_run().join(" -> "));
    Ok(())
}

fn load_index(root: &Path) -> anyhow::Result<Option<ProjectIndex>> {
    let path = paths::shared_project_index(root);
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let index = serde_json::from_str(&text)
        .with_context(|| format!("invalid project index {}", path.display()))?;
    Ok(Some(index))
}
