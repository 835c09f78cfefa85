//! Resolved build pairs.

use std::path::{Path, PathBuf};

use crate::core::errors::BakeError;
use crate::core::options::{BuilderOptions, Options, OutputOptions};
use crate::core::replace::ReplaceRule;
use crate::target::Target;

/// Builder used when a pair does not override it.
pub const DEFAULT_BUILDER: &str = "go";

/// Arguments for a stripped, trim-pathed release build.
pub const DEFAULT_BUILDER_ARGS: &[&str] = &["-trimpath", "-ldflags", "-w -s"];

/// Output directory when a recipe does not name one.
pub const DEFAULT_OUTPUT_DIR: &str = "bake_bin";

/// Default builder invocation.
pub fn default_builder() -> BuilderOptions {
    BuilderOptions {
        path: DEFAULT_BUILDER.to_string(),
        args: DEFAULT_BUILDER_ARGS.iter().map(|s| s.to_string()).collect(),
        env: Default::default(),
    }
}

/// One fully resolved (platform, arch) build.
#[derive(Debug)]
pub struct BuildPair {
    pub platform: String,
    pub arch: String,
    pub rule: ReplaceRule,
    pub builder: BuilderOptions,
    pub output: OutputOptions,
    pub target: Target,
    file_name: String,
}

impl BuildPair {
    /// Build a pair from its merged options.
    ///
    /// Fails when the replace scope does not compile.
    pub fn new(platform: &str, arch: &str, options: Options) -> Result<BuildPair, BakeError> {
        let rule = ReplaceRule::parse(&options.replace)?;

        let mut builder = default_builder();
        builder.patch(&options.builder);

        let target = Target::select(platform, arch, &options);

        Ok(BuildPair {
            platform: platform.to_string(),
            arch: arch.to_string(),
            rule,
            builder,
            file_name: options.output.path.clone(),
            output: options.output,
            target,
        })
    }

    /// `<platform>_<arch>`
    pub fn tag(&self) -> String {
        format!("{}_{}", self.platform, self.arch)
    }

    /// Artifact file name; Windows artifacts always end in `.exe`.
    pub fn name(&self) -> String {
        let mut name = if self.file_name.is_empty() {
            self.tag()
        } else {
            self.file_name.clone()
        };
        if self.platform == "windows"
            && Path::new(&name).extension().and_then(|e| e.to_str()) != Some("exe")
        {
            name.push_str(".exe");
        }
        name
    }
}

/// A declared pair whose options could not be resolved.
#[derive(Debug)]
pub struct InvalidPair {
    pub platform: String,
    pub arch: String,
    pub error: BakeError,
}

impl InvalidPair {
    pub fn tag(&self) -> String {
        format!("{}_{}", self.platform, self.arch)
    }
}

/// A resolved recipe.
#[derive(Debug)]
pub struct Config {
    /// Recipe name
    pub name: String,

    /// Module entrance path, relative to the project root
    pub entrance: String,

    /// Directory artifacts are copied into
    pub output: PathBuf,

    /// Retain workspaces and targets after the build
    pub debug: bool,

    /// Pairs in build order
    pub pairs: Vec<BuildPair>,

    /// Pairs rejected during resolution
    pub invalid: Vec<InvalidPair>,
}
