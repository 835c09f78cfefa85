//! High-level operations.
//!
//! This module contains the implementation of Bake commands.

pub mod bake_build;
pub mod distribute;

pub use bake_build::{build_args, classify, run_pair, run_recipe, BuildOptions, BuildSummary};
pub use distribute::{distribute, ssh_upload, zip_output};
