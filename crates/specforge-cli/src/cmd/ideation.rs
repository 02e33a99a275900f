use std::path::{Path, PathBuf};

use clap::Args;
use specforge_core::pipeline::{IdeationCategory, IdeationOptions, IdeationPipeline, PipelineEnv};

use super::{block_on_pipeline, cancelled, report, Session};

#[derive(Args)]
pub struct IdeationArgs {
    /// Output directory (default: .specforge/ideation)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Categories to generate, comma separated (default: all)
    #[arg(long = "types", value_delimiter = ',')]
    pub types: Vec<String>,

    /// Regenerate every category even if it already has ideas
    #[arg(long)]
    pub refresh: bool,

    /// Override the per-category idea limit from config
    #[arg(long)]
    pub max_ideas: Option<u32>,
}

pub fn run(root: &Path, args: IdeationArgs, model: Option<String>, json: bool) -> anyhow::Result<()> {
    // Bad category names fail before any preflight or agent work.
    let categories = args
        .types
        .iter()
        .map(|t| t.parse::<IdeationCategory>())
        .collect::<Result<Vec<_>, _>>()?;

    let mut session = Session::open(root, model, json)?;
    if let Some(max) = args.max_ideas {
        session.config.ideation.max_ideas_per_type = max;
    }
    let env = PipelineEnv::from_config(&session.root, &session.gateway, &session.config);
    let opts = IdeationOptions {
        output_dir: args.output,
        categories,
        refresh: args.refresh,
    };
    let resume = "specforge ideation".to_string();
    match block_on_pipeline(IdeationPipeline::new(&env).run(&opts))? {
        Some(summary) => report(&summary, json, Some(resume)),
        None => Err(cancelled(Some(resume))),
    }
}
