use std::path::{Path, PathBuf};

use clap::Args;
use specforge_core::pipeline::{PipelineEnv, RoadmapOptions, RoadmapPipeline};

use super::{block_on_pipeline, cancelled, report, Session};

#[derive(Args)]
pub struct RoadmapArgs {
    /// Output directory (default: .specforge/roadmap)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Regenerate discovery and features even if they already exist
    #[arg(long)]
    pub refresh: bool,
}

pub fn run(root: &Path, args: RoadmapArgs, model: Option<String>, json: bool) -> anyhow::Result<()> {
    let session = Session::open(root, model, json)?;
    let env = PipelineEnv::from_config(&session.root, &session.gateway, &session.config);
    let opts = RoadmapOptions {
        output_dir: args.output,
        refresh: args.refresh,
    };
    match block_on_pipeline(RoadmapPipeline::new(&env).run(&opts))? {
        Some(summary) => report(&summary, json, Some("specforge roadmap".to_string())),
        None => Err(cancelled(Some("specforge roadmap".to_string()))),
    }
}
