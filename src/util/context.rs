//! Global context for Bake operations.
//!
//! Provides centralized access to configuration, paths, and environment.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use directories::ProjectDirs;

use crate::shadow::SHADOW_BASE;
use crate::util::config::{self, Config};

/// Recipe file looked up in the working directory.
pub const RECIPE_FILE: &str = "RECIPE.toml";

/// Project directories for Bake
static PROJECT_DIRS: LazyLock<Option<ProjectDirs>> =
    LazyLock::new(|| ProjectDirs::from("com", "bake", "bake"));

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory (the project root)
    cwd: PathBuf,

    /// Recipe file path
    recipe_path: PathBuf,

    /// Merged tool configuration
    config: Config,

    /// Whether to use verbose output
    verbose: bool,

    /// Whether to use colors in output
    color: bool,

    /// Whether to draw progress bars
    progress: bool,
}

impl GlobalContext {
    /// Create a new GlobalContext for the current directory.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Ok(Self::with_cwd(cwd))
    }

    /// Create a GlobalContext with a specific working directory.
    pub fn with_cwd(cwd: PathBuf) -> Self {
        let global = global_config_path();
        let config = config::load_config(global.as_deref(), &config::project_config_path(&cwd));
        GlobalContext {
            cwd,
            recipe_path: PathBuf::from(RECIPE_FILE),
            config,
            verbose: false,
            color: true,
            progress: true,
        }
    }

    /// Override the recipe file path.
    pub fn set_recipe_path(&mut self, path: PathBuf) {
        self.recipe_path = path;
    }

    /// Set verbose mode.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Set color output.
    pub fn set_color(&mut self, color: bool) {
        self.color = color;
    }

    /// Enable or disable progress bars.
    pub fn set_progress(&mut self, progress: bool) {
        self.progress = progress;
    }

    /// Force dev mode regardless of configuration.
    pub fn set_dev(&mut self, dev: bool) {
        self.config.build.dev |= dev;
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// The recipe file, resolved against the working directory.
    pub fn recipe_path(&self) -> PathBuf {
        self.cwd.join(&self.recipe_path)
    }

    /// Merged tool configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Base directory for shadow workspaces.
    pub fn shadow_base(&self) -> PathBuf {
        match &self.config.build.temp_dir {
            Some(dir) => self.cwd.join(dir),
            None => std::env::temp_dir().join(SHADOW_BASE),
        }
    }

    /// Check if dev mode is enabled.
    pub fn is_dev(&self) -> bool {
        self.config.build.dev
    }

    /// Check if verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if color output is enabled.
    pub fn color(&self) -> bool {
        self.color
    }

    /// Check if progress bars are enabled.
    pub fn progress(&self) -> bool {
        self.progress
    }
}

/// Get the global config path (`<user config dir>/config.toml`).
pub fn global_config_path() -> Option<PathBuf> {
    PROJECT_DIRS
        .as_ref()
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
