//! Per-pair option tables and their merge rules.
//!
//! Every option type has a `patch` operation: a non-empty field on the
//! patch side overwrites the base, map fields merge key-wise (patch wins),
//! and list fields are replaced wholesale when the patch list is non-empty.
//! Patching is idempotent: `b.patch(p).patch(p) == b.patch(p)`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

fn patch_string(base: &mut String, patch: &str) {
    if !patch.is_empty() {
        *base = patch.to_string();
    }
}

fn patch_list(base: &mut Vec<String>, patch: &[String]) {
    if !patch.is_empty() {
        *base = patch.to_vec();
    }
}

fn patch_map(base: &mut BTreeMap<String, String>, patch: &BTreeMap<String, String>) {
    for (key, value) in patch {
        base.insert(key.clone(), value.clone());
    }
}

/// Builder invocation (`[builder]`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderOptions {
    /// Builder executable
    pub path: String,

    /// Arguments placed after `build`
    pub args: Vec<String>,

    /// Extra environment for the build
    pub env: BTreeMap<String, String>,
}

impl BuilderOptions {
    pub fn patch(&mut self, patch: &BuilderOptions) {
        patch_string(&mut self.path, &patch.path);
        patch_list(&mut self.args, &patch.args);
        patch_map(&mut self.env, &patch.env);
    }
}

/// SSH connection parameters shared by the build target and the output uploader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConnection {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub private_key_path: String,
    pub private_key_password: String,
}

impl SshConnection {
    pub fn patch(&mut self, patch: &SshConnection) {
        patch_string(&mut self.host, &patch.host);
        if patch.port != 0 {
            self.port = patch.port;
        }
        patch_string(&mut self.user, &patch.user);
        patch_string(&mut self.password, &patch.password);
        patch_string(&mut self.private_key_path, &patch.private_key_path);
        patch_string(&mut self.private_key_password, &patch.private_key_password);
    }
}

/// SSH build host (`[ssh]`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshOptions {
    #[serde(flatten)]
    pub connection: SshConnection,

    /// Remote temp base directory
    pub temp: String,
}

impl SshOptions {
    pub fn patch(&mut self, patch: &SshOptions) {
        self.connection.patch(&patch.connection);
        patch_string(&mut self.temp, &patch.temp);
    }
}

/// Container build host (`[docker]`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerOptions {
    /// Engine endpoint, or `local` for the local engine
    pub host: String,

    /// Container to reuse
    pub container: String,

    /// Image used when the container does not exist
    pub image: String,

    /// Temp base directory inside the container
    pub temp: String,
}

impl DockerOptions {
    pub fn patch(&mut self, patch: &DockerOptions) {
        patch_string(&mut self.host, &patch.host);
        patch_string(&mut self.container, &patch.container);
        patch_string(&mut self.image, &patch.image);
        patch_string(&mut self.temp, &patch.temp);
    }
}

/// Archive step (`[output.zip]`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZipOptions {
    pub source: String,
    pub dest: String,
    pub password: String,
}

impl ZipOptions {
    pub fn patch(&mut self, patch: &ZipOptions) {
        patch_string(&mut self.source, &patch.source);
        patch_string(&mut self.dest, &patch.dest);
        patch_string(&mut self.password, &patch.password);
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty() && self.dest.is_empty()
    }
}

/// Upload step (`[output.ssh]`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshOutputOptions {
    #[serde(flatten)]
    pub connection: SshConnection,

    pub source: String,
    pub dest: String,
}

impl SshOutputOptions {
    pub fn patch(&mut self, patch: &SshOutputOptions) {
        self.connection.patch(&patch.connection);
        patch_string(&mut self.source, &patch.source);
        patch_string(&mut self.dest, &patch.dest);
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty() && self.dest.is_empty()
    }
}

/// Output handling (`[output]`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    /// Artifact file name
    pub path: String,
    pub zip: ZipOptions,
    pub ssh: SshOutputOptions,
}

impl OutputOptions {
    pub fn patch(&mut self, patch: &OutputOptions) {
        patch_string(&mut self.path, &patch.path);
        self.zip.patch(&patch.zip);
        self.ssh.patch(&patch.ssh);
    }
}

/// Substitution rules (`[replace]`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaceOptions {
    /// Vendored dependency folder renames
    pub dependency: BTreeMap<String, String>,

    /// Literal text replacements
    pub text: BTreeMap<String, String>,

    /// Directory scope (glob patterns relative to the project root)
    pub dir_rules: Vec<String>,

    /// File name scope (regular expressions)
    pub file_regexps: Vec<String>,
}

impl ReplaceOptions {
    pub fn patch(&mut self, patch: &ReplaceOptions) {
        patch_map(&mut self.dependency, &patch.dependency);
        patch_map(&mut self.text, &patch.text);
        patch_list(&mut self.dir_rules, &patch.dir_rules);
        patch_list(&mut self.file_regexps, &patch.file_regexps);
    }
}

/// Settings bundle for one (platform, arch).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub builder: BuilderOptions,
    pub output: OutputOptions,
    pub replace: ReplaceOptions,
    pub docker: DockerOptions,
    pub ssh: SshOptions,
}

impl Options {
    /// Apply `patch` on top of these options.
    pub fn patch(&mut self, patch: &Options) {
        self.replace.patch(&patch.replace);
        self.docker.patch(&patch.docker);
        self.ssh.patch(&patch.ssh);
        self.output.patch(&patch.output);
        self.builder.patch(&patch.builder);
    }

    /// Return a patched copy.
    pub fn patched(mut self, patch: &Options) -> Self {
        self.patch(patch);
        self
    }
}
