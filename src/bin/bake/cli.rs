//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// Bake - A cross-compilation build orchestrator for Go projects
#[derive(Parser)]
#[command(name = "bake")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Recipe file (default: ./RECIPE.toml)
    #[arg(long, global = true, env = "BAKE_RECIPE")]
    pub recipe: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build every pair of one or more recipes
    Build(BuildArgs),

    /// List the recipes in the recipe file
    List,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct BuildArgs {
    /// Recipes to build
    #[arg(default_value = "default")]
    pub recipes: Vec<String>,

    /// Keep shadow workspaces and build targets for inspection
    #[arg(long)]
    pub dev: bool,

    /// Disable upload progress bars
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,
}
