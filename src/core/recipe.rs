//! Recipe documents and their resolution into build pairs.
//!
//! A recipe file holds named recipes under `[recipes.<name>]`:
//!
//! ```toml
//! [recipes.default]
//! desc = "release build"
//! entrance = "./cmd/app"
//! pairs = ["linux/amd64", "windows/amd64"]
//!
//! [recipes.default.all_platform.all_arch.replace.text]
//! "DEBUG = true" = "DEBUG = false"
//!
//! [recipes.default.windows.amd64.output]
//! path = "app"
//! ```
//!
//! For each declared (platform, arch) the options are merged in a fixed
//! order, later layers winning:
//!
//! 1. `all_platform.all_arch`
//! 2. `all_platform.<arch>`
//! 3. `<os>.all_arch`
//! 4. `<os>.<arch>`
//!
//! Only `darwin`, `linux` and `windows` have dedicated tables; other
//! platforms get the `all_platform` layers only.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::errors::BakeError;
use crate::core::options::Options;
use crate::core::pair::{BuildPair, Config, InvalidPair, DEFAULT_OUTPUT_DIR};

/// Built-in pair catalog used when a recipe declares no pairs.
pub const DEFAULT_PAIRS: &str = include_str!("assets/pairs.txt");

/// Reserved arch key applied to every arch of a table.
pub const ALL_ARCH: &str = "all_arch";

/// Options keyed by arch, plus the `all_arch` wildcard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArchOption(BTreeMap<String, Options>);

impl ArchOption {
    /// The `all_arch` entry.
    pub fn all_arch(&self) -> Option<&Options> {
        self.0.get(ALL_ARCH)
    }

    /// The entry for a concrete arch. `all_arch` is never returned here.
    pub fn arch(&self, arch: &str) -> Option<&Options> {
        if arch == ALL_ARCH {
            return None;
        }
        self.0.get(arch)
    }

    fn layers<'a>(&'a self, arch: &str) -> impl Iterator<Item = &'a Options> {
        self.all_arch().into_iter().chain(self.arch(arch))
    }
}

/// One named build profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recipe {
    pub desc: String,
    pub entrance: String,
    pub output: String,
    pub debug: bool,
    pub pairs: Vec<String>,
    pub all_platform: ArchOption,
    pub darwin: ArchOption,
    pub linux: ArchOption,
    pub windows: ArchOption,
}

/// A recipe file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipeDoc {
    pub recipes: BTreeMap<String, Recipe>,
}

impl RecipeDoc {
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("failed to parse recipe document")
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BakeError::NoRecipeFile {
                path: path.to_path_buf(),
            }
            .into());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read recipe file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("failed to parse recipe file: {}", path.display()))
    }
}

/// Parse `platform/arch` lines, skipping blank and malformed entries.
pub fn parse_pairs<'a, I>(lines: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut pairs = Vec::new();
    for line in lines {
        let line = line.trim();
        match line.split_once('/') {
            Some((platform, arch)) if !platform.is_empty() && !arch.is_empty() => {
                let pair = (platform.to_string(), arch.to_string());
                if !pairs.contains(&pair) {
                    pairs.push(pair);
                }
            }
            _ => {
                if !line.is_empty() {
                    tracing::warn!("ignoring malformed pair `{}`", line);
                }
            }
        }
    }
    pairs
}

impl Recipe {
    /// The dedicated table for a platform, if it has one.
    pub fn platform_table(&self, platform: &str) -> Option<&ArchOption> {
        match platform {
            "darwin" => Some(&self.darwin),
            "linux" => Some(&self.linux),
            "windows" => Some(&self.windows),
            _ => None,
        }
    }

    /// Declared pairs, or the built-in catalog when none are declared.
    pub fn declared_pairs(&self) -> Vec<(String, String)> {
        if self.pairs.is_empty() {
            parse_pairs(DEFAULT_PAIRS.lines())
        } else {
            parse_pairs(self.pairs.iter().map(String::as_str))
        }
    }

    /// Merged options for one pair.
    pub fn options_for(&self, platform: &str, arch: &str) -> Options {
        let mut options = Options::default();
        for layer in self.all_platform.layers(arch) {
            options.patch(layer);
        }
        if let Some(table) = self.platform_table(platform) {
            for layer in table.layers(arch) {
                options.patch(layer);
            }
        }
        options
    }

    /// Resolve into build pairs, ordered by platform then arch.
    ///
    /// A pair whose options do not compile is recorded in
    /// [`Config::invalid`] instead of failing the recipe.
    pub fn resolve(&self, name: &str) -> Result<Config, BakeError> {
        if self.entrance.is_empty() {
            return Err(BakeError::MissingEntrance {
                recipe: name.to_string(),
            });
        }

        let mut table: BTreeMap<String, BTreeMap<String, Options>> = BTreeMap::new();
        for (platform, arch) in self.declared_pairs() {
            let options = self.options_for(&platform, &arch);
            table.entry(platform).or_default().insert(arch, options);
        }

        let mut pairs = Vec::new();
        let mut invalid = Vec::new();
        for (platform, arches) in table {
            for (arch, options) in arches {
                match BuildPair::new(&platform, &arch, options) {
                    Ok(pair) => pairs.push(pair),
                    Err(error) => {
                        tracing::debug!("pair {}/{} rejected: {}", platform, arch, error);
                        invalid.push(InvalidPair {
                            platform: platform.clone(),
                            arch,
                            error,
                        });
                    }
                }
            }
        }

        let output = if self.output.is_empty() {
            PathBuf::from(DEFAULT_OUTPUT_DIR)
        } else {
            PathBuf::from(&self.output)
        };

        Ok(Config {
            name: name.to_string(),
            entrance: self.entrance.clone(),
            output,
            debug: self.debug,
            pairs,
            invalid,
        })
    }
}

/// Load every recipe in a recipe file.
pub fn load_all_recipes(path: &Path) -> Result<BTreeMap<String, Recipe>> {
    Ok(RecipeDoc::load(path)?.recipes)
}

/// Load and resolve one recipe.
pub fn load_config(path: &Path, name: &str) -> Result<Config> {
    let mut recipes = load_all_recipes(path)?;
    let recipe = recipes.remove(name).ok_or_else(|| BakeError::RecipeNotFound {
        recipe: name.to_string(),
        available: recipes.keys().cloned().collect(),
    })?;
    Ok(recipe.resolve(name)?)
}
