//! Implementation of `bake build`.

use std::path::PathBuf;

use anyhow::Result;

use crate::core::errors::BakeError;
use crate::core::pair::{BuildPair, Config};
use crate::ops::distribute::distribute;
use crate::shadow::{ShadowWorkspace, SHADOW_BIN};
use crate::target::BuildOutput;
use crate::util::context::GlobalContext;

const NO_GO_FILES: &str = "no Go files in";

/// Options for the build command.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Retain shadow workspaces and targets
    pub dev: bool,

    /// Draw upload progress bars
    pub progress: bool,
}

/// Result of building every pair of a recipe.
#[derive(Debug, Default)]
pub struct BuildSummary {
    pub recipe: String,

    /// `(tag, artifact)` for each successful pair
    pub built: Vec<(String, PathBuf)>,

    /// `(tag, error)` for each failed or rejected pair
    pub failed: Vec<(String, anyhow::Error)>,
}

impl BuildSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Builder arguments for one pair: the configured args, then the output
/// path and the entrance.
pub fn build_args(args: &[String], shadow_output: &str, entrance: &str) -> Vec<String> {
    let mut all = args.to_vec();
    all.push("-o".to_string());
    all.push(shadow_output.to_string());
    all.push(entrance.to_string());
    all
}

/// Turn a builder result into a typed outcome.
///
/// Diagnostics on a successful build are logged as warnings.
pub fn classify(output: &BuildOutput) -> Result<(), BakeError> {
    let stderr = output.stderr_lossy();
    if stderr.contains(NO_GO_FILES) {
        return Err(BakeError::Entrance {
            diagnostic: stderr.trim().to_string(),
        });
    }

    if !output.success {
        let diagnostic = if stderr.trim().is_empty() {
            output.stdout_lossy()
        } else {
            stderr
        };
        return Err(BakeError::BuildExecution {
            diagnostic: diagnostic.trim().to_string(),
        });
    }

    if !stderr.trim().is_empty() {
        tracing::warn!("{}", stderr.trim());
    }
    Ok(())
}

/// Build one pair and return the artifact path.
///
/// The shadow workspace and the target are torn down afterwards (unless in
/// dev mode); teardown failures are logged and never replace the build
/// result.
pub fn run_pair(
    ctx: &GlobalContext,
    mut pair: BuildPair,
    config: &Config,
    opts: &BuildOptions,
) -> Result<PathBuf> {
    let dev = opts.dev || config.debug || ctx.is_dev();
    pair.target.set_progress(opts.progress);

    let shadow = ShadowWorkspace::create(ctx.cwd(), &ctx.shadow_base())?;
    let result = build_in_shadow(ctx, &shadow, &mut pair, config, opts);

    if dev {
        tracing::warn!("dev mode: leaving {} open", pair.target.as_remote().info());
    } else if let Err(e) = pair.target.as_remote_mut().close() {
        tracing::warn!("failed to close {}: {:#}", pair.target.as_remote().info(), e);
    }

    if let Err(e) = shadow.close(dev) {
        match e.downcast_ref::<BakeError>() {
            Some(BakeError::DevModeSkip { path }) => {
                tracing::info!("shadow workspace retained at {}", path.display())
            }
            _ => tracing::warn!("{:#}", e),
        }
    }

    result
}

fn build_in_shadow(
    ctx: &GlobalContext,
    shadow: &ShadowWorkspace,
    pair: &mut BuildPair,
    config: &Config,
    opts: &BuildOptions,
) -> Result<PathBuf> {
    shadow.vendor(&pair.builder.path, &pair.rule.dependency)?;

    let report = shadow.substitute(&pair.rule.words, pair.rule.scope.as_ref());
    for (path, reason) in &report.failures {
        tracing::warn!("could not rewrite {}: {}", path.display(), reason);
    }
    tracing::debug!("rewrote {} files", report.rewritten.len());

    let name = pair.name();
    let shadow_output = format!("./{}/{}", SHADOW_BIN, name);
    let args = build_args(&pair.builder.args, &shadow_output, &config.entrance);

    let target = pair.target.as_remote_mut();
    target.init_and_connect(shadow.tag())?;
    target.copy_shadow_project_to(shadow.path())?;

    let output = target.build_exec(&pair.builder.path, &args, &pair.builder.env)?;
    classify(&output)?;

    let dest = ctx.cwd().join(&config.output).join(&name);
    target.copy_file_back(&shadow_output, &dest)?;

    distribute(&dest, &pair.output, ctx.cwd(), opts.progress)?;
    Ok(dest)
}

/// Build every pair of a resolved recipe, in order.
///
/// A failing pair is recorded and the next pair is built.
pub fn run_recipe(ctx: &GlobalContext, mut config: Config, opts: &BuildOptions) -> BuildSummary {
    let mut summary = BuildSummary {
        recipe: config.name.clone(),
        ..Default::default()
    };
    tracing::info!("recipe {} (entrance {})", config.name, config.entrance);

    for invalid in std::mem::take(&mut config.invalid) {
        tracing::error!("{}: {}", invalid.tag(), invalid.error);
        summary.failed.push((invalid.tag(), invalid.error.into()));
    }

    for pair in std::mem::take(&mut config.pairs) {
        let tag = pair.tag();
        tracing::info!("building {} <{}>", tag, pair.target.as_remote().info());

        match run_pair(ctx, pair, &config, opts) {
            Ok(artifact) => {
                tracing::info!("built {}", artifact.display());
                summary.built.push((tag, artifact));
            }
            Err(e) => {
                tracing::error!("{} failed: {}", tag, e);
                summary.failed.push((tag, e));
            }
        }
    }

    summary
}
