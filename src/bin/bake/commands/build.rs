//! `bake build` command

use anyhow::{bail, Result};

use crate::cli::BuildArgs;
use bake::core::errors::diagnose;
use bake::core::load_config;
use bake::ops::{run_recipe, BuildOptions};
use bake::util::diagnostic::{emit, suggestions};
use bake::GlobalContext;

pub fn execute(args: BuildArgs, mut ctx: GlobalContext) -> Result<()> {
    ctx.set_dev(args.dev);
    ctx.set_progress(!args.no_progress);

    let opts = BuildOptions {
        dev: ctx.is_dev(),
        progress: ctx.progress(),
    };
    tracing::debug!("shadow base {}", ctx.shadow_base().display());

    let recipe_path = ctx.recipe_path();
    let mut built = 0;
    let mut failed = 0;
    let mut unloaded = 0;

    for name in &args.recipes {
        let config = match load_config(&recipe_path, name) {
            Ok(config) => config,
            Err(e) => {
                emit(&diagnose(&e), ctx.color());
                unloaded += 1;
                continue;
            }
        };
        let summary = run_recipe(&ctx, config, &opts);

        for (tag, artifact) in &summary.built {
            eprintln!("{:>12} {} -> {}", "Built", tag, artifact.display());
        }
        for (tag, err) in &summary.failed {
            let mut diag = diagnose(err).with_context(format!("pair {} of recipe `{}`", tag, summary.recipe));
            if !ctx.is_verbose() {
                diag = diag.with_suggestion(suggestions::BUILD_FAILED);
            }
            emit(&diag, ctx.color());
        }

        built += summary.built.len();
        failed += summary.failed.len();
    }

    let mut problems = Vec::new();
    if unloaded > 0 {
        problems.push(format!(
            "{} of {} recipes could not be loaded",
            unloaded,
            args.recipes.len()
        ));
    }
    if failed > 0 {
        problems.push(format!("{} of {} pairs failed", failed, built + failed));
    }
    if !problems.is_empty() {
        bail!("{}", problems.join("; "));
    }

    eprintln!("{:>12} {} pairs", "Finished", built);
    Ok(())
}
