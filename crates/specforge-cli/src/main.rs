mod cmd;
mod output;
mod prompter;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    assess::AssessArgs, ideation::IdeationArgs, list::ListArgs, roadmap::RoadmapArgs,
    spec::SpecArgs, validate::ValidateArgs, PipelineExit,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "specforge",
    about = "Phase orchestration for AI-driven specs, roadmaps and ideation",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project directory (default: auto-detect from .specforge/ or .git/)
    #[arg(long = "project-dir", global = true, env = "SPECFORGE_PROJECT_DIR")]
    root: Option<PathBuf>,

    /// Agent model (overrides config)
    #[arg(long, global = true, env = "SPECFORGE_MODEL")]
    model: Option<String>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a spec: discovery, requirements, assessment, then the selected phases
    Spec(SpecArgs),

    /// Generate a product roadmap
    Roadmap(RoadmapArgs),

    /// Generate improvement ideas per category
    Ideation(IdeationArgs),

    /// Classify a task offline with the keyword heuristic
    Assess(AssessArgs),

    /// Validate a spec directory's artifacts
    Validate(ValidateArgs),

    /// Show work units and progress from BMAD or native plans
    List(ListArgs),
}

impl Commands {
    fn runs_pipeline(&self) -> bool {
        matches!(
            self,
            Commands::Spec(_) | Commands::Roadmap(_) | Commands::Ideation(_)
        )
    }
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.command.runs_pipeline() {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Spec(args) => cmd::spec::run(&root, args, cli.model, cli.json),
        Commands::Roadmap(args) => cmd::roadmap::run(&root, args, cli.model, cli.json),
        Commands::Ideation(args) => cmd::ideation::run(&root, args, cli.model, cli.json),
        Commands::Assess(args) => cmd::assess::run(&root, args, cli.json),
        Commands::Validate(args) => cmd::validate::run(&root, args, cli.json),
        Commands::List(args) => cmd::list::run(&root, args, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        let code = e
            .downcast_ref::<PipelineExit>()
            .map_or(1, PipelineExit::exit_code);
        std::process::exit(code);
    }
}
