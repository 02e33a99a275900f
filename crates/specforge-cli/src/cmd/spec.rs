use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use specforge_core::paths;
use specforge_core::pipeline::{PipelineEnv, SpecOptions, SpecPipeline};
use specforge_core::types::Complexity;

use super::{block_on_pipeline, cancelled, report, Session};
use crate::prompter::LinePrompter;

#[derive(Args)]
pub struct SpecArgs {
    /// Task description (omit to be asked interactively)
    #[arg(long)]
    pub task: Option<String>,

    /// Resume an existing spec directory (name under the specs dir, or a path)
    #[arg(long = "continue", value_name = "SPEC_DIR")]
    pub continue_dir: Option<PathBuf>,

    /// Skip assessment and use this complexity: simple, standard or complex
    #[arg(long)]
    pub complexity: Option<String>,

    /// Classify with the keyword heuristic only
    #[arg(long)]
    pub no_ai_assessment: bool,

    /// Gather requirements interactively even when --task is given
    #[arg(long, short = 'i')]
    pub interactive: bool,

    /// Write specs under .specforge/dev/specs
    #[arg(long)]
    pub dev: bool,
}

pub fn run(root: &Path, args: SpecArgs, model: Option<String>, json: bool) -> anyhow::Result<()> {
    let complexity_override = args
        .complexity
        .as_deref()
        .map(str::parse::<Complexity>)
        .transpose()?;

    let session = Session::open(root, model, json)?;
    let env = PipelineEnv::from_config(&session.root, &session.gateway, &session.config);
    let prompter = LinePrompter::stdin();
    let mut pipeline = SpecPipeline::new(&env);
    if args.interactive || args.task.is_none() {
        pipeline = pipeline.with_prompter(&prompter);
    }

    let mut opts = SpecOptions {
        task: args.task,
        spec_dir: args.continue_dir,
        complexity_override,
        use_agent_assessment: !args.no_ai_assessment,
        dev_mode: args.dev,
    };
    // Fix the directory up front so an interrupted run can name it.
    let store = pipeline
        .open_task_dir(&opts)
        .context("cannot open spec directory")?;
    let started_in = store.dir().to_path_buf();
    opts.spec_dir = Some(started_in.clone());

    if !json {
        println!("Creating spec in {}", started_in.display());
    }

    let specs_dir = paths::specs_dir(root, opts.dev_mode);
    let dev_flag = if opts.dev_mode { " --dev" } else { "" };
    let resume = |dir: &Path| {
        let current = current_dir_for(&specs_dir, dir);
        let name = current
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("specforge spec --continue {name}{dev_flag}")
    };

    match block_on_pipeline(pipeline.run(&opts))? {
        Some(summary) => {
            let hint = resume(&summary.task_dir);
            report(&summary, json, Some(hint))?;
            if !json {
                println!("\nSpec ready: {}", summary.task_dir.join(paths::SPEC_MD).display());
            }
            Ok(())
        }
        None => Err(cancelled(Some(resume(&started_in)))),
    }
}

/// Where the run's directory lives now. The placeholder is renamed once
/// requirements are known, keeping its number prefix.
fn current_dir_for(specs_dir: &Path, started: &Path) -> PathBuf {
    if started.is_dir() {
        return started.to_path_buf();
    }
    let prefix = started
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(paths::number_prefix);
    let Some(prefix) = prefix else {
        return started.to_path_buf();
    };
    std::fs::read_dir(specs_dir)
        .ok()
        .and_then(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| e.path())
                .find(|p| {
                    p.is_dir()
                        && p.file_name()
                            .and_then(|n| n.to_str())
                            .and_then(paths::number_prefix)
                            == Some(prefix)
                })
        })
        .unwrap_or_else(|| started.to_path_buf())
}
