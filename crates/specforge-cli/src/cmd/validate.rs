use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Args;
use specforge_core::paths;
use specforge_core::store::ArtifactStore;
use specforge_core::validate::{ArtifactKind, Validator};

use crate::output::{print_json, print_table};

#[derive(Args)]
pub struct ValidateArgs {
    /// Spec directory name under the specs dir, or a path
    pub spec: PathBuf,

    /// Apply deterministic fixes to context.json and implementation_plan.json first
    #[arg(long)]
    pub fix: bool,

    /// Look under .specforge/dev/specs
    #[arg(long)]
    pub dev: bool,
}

pub fn run(root: &Path, args: ValidateArgs, json: bool) -> anyhow::Result<()> {
    let dir = resolve_spec_dir(root, &args.spec, args.dev)?;
    let store = ArtifactStore::open(&dir)?;
    let validator = Validator::new(&store);

    if args.fix {
        for kind in [ArtifactKind::Context, ArtifactKind::ImplementationPlan] {
            let fixed = validator
                .auto_fix(kind)
                .with_context(|| format!("auto-fix of {kind} failed"))?;
            if fixed && !json {
                println!("Fixed {kind}");
            }
        }
    }

    let results = validator.validate_all();
    if json {
        print_json(&results)?;
    } else {
        let rows = results
            .iter()
            .map(|r| {
                vec![
                    r.checkpoint.to_string(),
                    if r.valid { "ok" } else { "FAILED" }.to_string(),
                    r.errors.join("; "),
                ]
            })
            .collect();
        print_table(&["CHECKPOINT", "STATUS", "ERRORS"], rows);
        for r in results.iter().filter(|r| !r.fixes.is_empty()) {
            for fix in &r.fixes {
                println!("  {}: {fix}", r.checkpoint);
            }
        }
    }

    let failed = results.iter().filter(|r| !r.valid).count();
    if failed > 0 {
        bail!("{failed} checkpoint(s) failed in {}", dir.display());
    }
    Ok(())
}

fn resolve_spec_dir(root: &Path, spec: &Path, dev: bool) -> anyhow::Result<PathBuf> {
    let candidates = [
        spec.to_path_buf(),
        paths::specs_dir(root, dev).join(spec),
    ];
    candidates
        .into_iter()
        .find(|p| p.is_dir())
        .with_context(|| format!("spec directory not found: {}", spec.display()))
}
