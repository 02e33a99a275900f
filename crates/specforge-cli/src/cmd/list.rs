use std::path::Path;

use clap::Args;
use specforge_core::framework::{Framework, FrameworkRegistry, UnifiedStatus};

use crate::output::{print_json, print_table};

#[derive(Args)]
pub struct ListArgs {
    /// Planning framework: bmad or native (default: auto-detect)
    #[arg(long)]
    pub framework: Option<String>,

    /// Show the tasks of one work unit instead of the overview
    #[arg(long = "unit", value_name = "ID")]
    pub work_unit: Option<String>,
}

pub fn run(root: &Path, args: ListArgs, json: bool) -> anyhow::Result<()> {
    let registry = FrameworkRegistry::default();
    let framework = match args.framework.as_deref() {
        Some(name) => registry.get(name)?,
        None => match registry.detect(root) {
            Some(f) => f,
            None => {
                println!(
                    "No planning files found (looked for: {}).",
                    registry.names().join(", ")
                );
                return Ok(());
            }
        },
    };

    match args.work_unit {
        Some(id) => list_tasks(root, framework, &id, json),
        None => list_units(root, framework, json),
    }
}

fn list_units(root: &Path, framework: Framework, json: bool) -> anyhow::Result<()> {
    let status = framework.get_status(root)?;
    if json {
        return print_json(&status);
    }
    let glossary = framework.glossary();
    println!("{} ({})", framework.display_name(), framework);
    let rows = status
        .work_units
        .iter()
        .map(|u| {
            let done = u
                .tasks
                .iter()
                .filter(|t| t.status == UnifiedStatus::Completed)
                .count();
            vec![
                u.id.clone(),
                u.title.clone(),
                u.status.to_string(),
                format!("{done}/{}", u.tasks.len()),
            ]
        })
        .collect();
    let unit_header = glossary.work_unit.to_uppercase();
    print_table(&[unit_header.as_str(), "TITLE", "STATUS", "DONE"], rows);
    println!(
        "\n{} progress: {}/{} ({:.0}%)",
        glossary.task, status.completed_tasks, status.total_tasks, status.progress_percentage
    );
    if let Some(active) = &status.active_task {
        println!("Active: {} {}", active.id, active.title);
    }
    Ok(())
}

fn list_tasks(root: &Path, framework: Framework, unit: &str, json: bool) -> anyhow::Result<()> {
    let tasks = framework.parse_tasks(root, unit)?;
    if json {
        return print_json(&tasks);
    }
    let glossary = framework.glossary();
    let rows = tasks
        .iter()
        .map(|t| {
            vec![
                t.id.clone(),
                t.title.clone(),
                t.status.to_string(),
                t.checkpoints.len().to_string(),
            ]
        })
        .collect();
    let task_header = glossary.task.to_uppercase();
    let checks_header = glossary.checkpoint.to_uppercase();
    print_table(&[task_header.as_str(), "TITLE", "STATUS", checks_header.as_str()], rows);
    Ok(())
}
