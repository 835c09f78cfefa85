//! Core data structures for Bake.
//!
//! - Option tables and their merge rules
//! - Recipes and their resolution into build pairs
//! - Replace rules
//! - The build error taxonomy

pub mod errors;
pub mod options;
pub mod pair;
pub mod recipe;
pub mod replace;

pub use errors::BakeError;
pub use options::Options;
pub use pair::{BuildPair, Config, InvalidPair};
pub use recipe::{load_all_recipes, load_config, Recipe, RecipeDoc};
pub use replace::{ReplaceRule, ReplaceScope};
