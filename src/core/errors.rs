//! Build error taxonomy and diagnostics.

use std::path::PathBuf;

use thiserror::Error;

use crate::util::diagnostic::{suggestions, Diagnostic};

/// A typed build condition.
///
/// Operations return `anyhow::Result`; these conditions travel inside the
/// `anyhow::Error` and are recovered with `downcast_ref::<BakeError>()`.
#[derive(Debug, Error)]
pub enum BakeError {
    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error("recipe `{recipe}` has no entrance")]
    MissingEntrance { recipe: String },

    #[error("recipe file not found: {}", .path.display())]
    NoRecipeFile { path: PathBuf },

    #[error("recipe `{recipe}` not found")]
    RecipeNotFound {
        recipe: String,
        available: Vec<String>,
    },

    #[error("failed to duplicate project `{}`: {message}", .path.display())]
    Copy { path: PathBuf, message: String },

    #[error("it seems not a go project")]
    NotAProject { diagnostic: String },

    #[error("entrance error")]
    Entrance { diagnostic: String },

    #[error("build failed: {diagnostic}")]
    BuildExecution { diagnostic: String },

    #[error("{backend} transport error: {message}")]
    Transport {
        backend: &'static str,
        message: String,
    },

    #[error("dev mode: shadow workspace retained at {}", .path.display())]
    DevModeSkip { path: PathBuf },

    #[error("cleanup failed: {message}")]
    Cleanup { message: String },
}

impl BakeError {
    pub fn config(message: impl Into<String>) -> Self {
        BakeError::Config {
            message: message.into(),
        }
    }

    pub fn transport(backend: &'static str, message: impl Into<String>) -> Self {
        BakeError::Transport {
            backend,
            message: message.into(),
        }
    }

    pub fn cleanup(message: impl Into<String>) -> Self {
        BakeError::Cleanup {
            message: message.into(),
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            BakeError::Config { message } => Diagnostic::error("invalid recipe options")
                .with_context(message.clone())
                .with_suggestion("Check the `replace`, `docker` and `ssh` tables in RECIPE.toml"),

            BakeError::MissingEntrance { recipe } => {
                Diagnostic::error(format!("recipe `{}` has no entrance", recipe))
                    .with_suggestion(format!(
                        "Add `entrance = \"./cmd/app\"` under [recipes.{}]",
                        recipe
                    ))
            }

            BakeError::NoRecipeFile { path } => Diagnostic::error("recipe file not found")
                .with_location(path.clone())
                .with_suggestion(suggestions::NO_RECIPE),

            BakeError::RecipeNotFound { recipe, available } => {
                let mut diag = Diagnostic::error(format!("recipe `{}` not found", recipe));
                if !available.is_empty() {
                    diag = diag.with_context(format!("available recipes: {}", available.join(", ")));
                }
                diag.with_suggestion("Run `bake list` to see all recipes")
            }

            BakeError::Copy { path, message } => {
                Diagnostic::error("failed to create shadow workspace")
                    .with_location(path.clone())
                    .with_context(message.clone())
            }

            BakeError::NotAProject { .. } => Diagnostic::error("it seems not a go project")
                .with_context("`go mod vendor` could not find go.mod")
                .with_suggestion("Run bake from the module root (the directory holding go.mod)"),

            BakeError::Entrance { .. } => Diagnostic::error("entrance error")
                .with_context("the builder found no Go files at the entrance")
                .with_suggestion("Check `entrance` in RECIPE.toml"),

            BakeError::BuildExecution { diagnostic } => {
                Diagnostic::error("build failed").with_context(diagnostic.trim().to_string())
            }

            BakeError::Transport { backend, message } => {
                Diagnostic::error(format!("could not reach {} target", backend))
                    .with_context(message.clone())
                    .with_suggestion(format!("Check the `{}` table of this pair", backend))
            }

            BakeError::DevModeSkip { path } => {
                Diagnostic::warning("shadow workspace retained (dev mode)")
                    .with_location(path.clone())
                    .with_suggestion(suggestions::DEV_MODE)
            }

            BakeError::Cleanup { message } => {
                Diagnostic::warning("cleanup failed").with_context(message.clone())
            }
        }
    }
}

/// Classify an `anyhow::Error` as a user diagnostic.
///
/// Typed conditions get their remapped reason; anything else falls back to
/// the raw error chain.
pub fn diagnose(err: &anyhow::Error) -> Diagnostic {
    match err.downcast_ref::<BakeError>() {
        Some(bake_err) => bake_err.to_diagnostic(),
        None => Diagnostic::error(format!("{:#}", err)),
    }
}
