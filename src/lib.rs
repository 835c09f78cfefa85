//! Bake - A cross-compilation build orchestrator for Go projects
//!
//! This crate provides the core library functionality for Bake:
//! recipe resolution, shadow workspaces, build targets (local, container,
//! SSH) and the build orchestrator.

pub mod core;
pub mod ops;
pub mod shadow;
pub mod target;
pub mod util;

pub use core::{load_all_recipes, load_config, BakeError, BuildPair, Config, Recipe};
pub use ops::{run_pair, run_recipe};
pub use target::{RemoteTarget, Target};
pub use util::context::GlobalContext;
