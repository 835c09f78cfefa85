//! Bake CLI - A cross-compilation build orchestrator for Go projects

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bake::core::errors::diagnose;
use bake::util::diagnostic::emit;
use bake::GlobalContext;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    // Parse CLI
    let cli = Cli::parse();
    let color = !cli.no_color;

    if let Err(e) = run(cli) {
        emit(&diagnose(&e), color);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("bake=debug")
    } else {
        EnvFilter::new("bake=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let mut ctx = GlobalContext::new()?;
    ctx.set_verbose(cli.verbose);
    ctx.set_color(!cli.no_color);
    if let Some(recipe) = cli.recipe {
        ctx.set_recipe_path(recipe);
    }

    // Execute command
    match cli.command {
        Commands::Build(args) => commands::build::execute(args, ctx),
        Commands::List => commands::list::execute(&ctx),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
