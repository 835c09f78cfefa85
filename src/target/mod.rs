//! Build targets.
//!
//! A build target is where the builder actually runs: a local child
//! process, a container, or an SSH host. Every backend implements the same
//! blocking contract ([`RemoteTarget`]); [`Target`] is the variant bound to a
//! build pair when the recipe is resolved.

pub mod container;
pub mod docker;
pub mod local;
pub mod ssh;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::Result;

use crate::core::options::Options;

pub use container::{ContainerEvent, ContainerLifecycle, ContainerState, Teardown};
pub use docker::DockerTarget;
pub use local::LocalTarget;
pub use ssh::SshTarget;

/// Captured result of a builder run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,

    /// Whether the backend considers the build successful
    pub success: bool,
}

impl BuildOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// The execution contract shared by all backends.
///
/// Calls are made in order: `init_and_connect`, `copy_shadow_project_to`,
/// `build_exec`, `copy_file_back`, `close`. Every call blocks until the
/// underlying transport completes.
pub trait RemoteTarget {
    /// Human readable description, e.g. `SSH Build (root@host:22)`.
    fn info(&self) -> String;

    /// Connect to the backend. `hash_tag` is the shadow workspace tag and
    /// keys every remote temp path.
    fn init_and_connect(&mut self, hash_tag: &str) -> Result<()>;

    /// Make the shadow project available to the builder.
    fn copy_shadow_project_to(&mut self, shadow: &Path) -> Result<()>;

    /// Run `<cmd> build <args...>` with the cross-compilation environment.
    fn build_exec(
        &mut self,
        cmd: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<BuildOutput>;

    /// Fetch a file produced by the build, relative to the project root.
    fn copy_file_back(&mut self, remote_rel: &str, local_dest: &Path) -> Result<()>;

    /// Release backend resources.
    fn close(&mut self) -> Result<()>;
}

/// Backend chosen for a build pair.
pub enum Target {
    Local(LocalTarget),
    Docker(DockerTarget),
    Ssh(SshTarget),
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple(self.kind()).field(&self.as_remote().info()).finish()
    }
}

impl Target {
    /// Select a backend by priority: docker host, then SSH host, then local.
    pub fn select(platform: &str, arch: &str, options: &Options) -> Target {
        if !options.docker.host.is_empty() {
            Target::Docker(DockerTarget::new(&options.docker, platform, arch))
        } else if !options.ssh.connection.host.is_empty() {
            Target::Ssh(SshTarget::new(&options.ssh, platform, arch))
        } else {
            Target::Local(LocalTarget::new(platform, arch))
        }
    }

    /// Short backend name.
    pub fn kind(&self) -> &'static str {
        match self {
            Target::Local(_) => "local",
            Target::Docker(_) => "docker",
            Target::Ssh(_) => "ssh",
        }
    }

    /// Enable upload progress reporting where the backend supports it.
    pub fn set_progress(&mut self, enabled: bool) {
        if let Target::Ssh(t) = self {
            t.set_progress(enabled);
        }
    }

    pub fn as_remote(&self) -> &dyn RemoteTarget {
        match self {
            Target::Local(t) => t,
            Target::Docker(t) => t,
            Target::Ssh(t) => t,
        }
    }

    pub fn as_remote_mut(&mut self) -> &mut dyn RemoteTarget {
        match self {
            Target::Local(t) => t,
            Target::Docker(t) => t,
            Target::Ssh(t) => t,
        }
    }
}

/// Cross-compilation environment for one build.
///
/// The values are passed to each spawn explicitly; the process environment
/// is never modified.
pub fn cross_env(
    platform: &str,
    arch: &str,
    extra: &BTreeMap<String, String>,
) -> Vec<(String, String)> {
    let mut env = vec![
        ("CGO_ENABLED".to_string(), "0".to_string()),
        ("GOOS".to_string(), platform.to_string()),
        ("GOARCH".to_string(), arch.to_string()),
    ];
    env.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}

/// Join remote (always `/`-separated) path segments.
pub(crate) fn remote_join(base: &str, rel: &str) -> String {
    let rel = rel.trim_start_matches("./").trim_start_matches('/');
    if rel.is_empty() {
        return base.to_string();
    }
    if base.ends_with('/') {
        format!("{}{}", base, rel)
    } else {
        format!("{}/{}", base, rel)
    }
}

/// Parent of a remote path, `/` for top-level entries.
pub(crate) fn remote_parent(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => trimmed[..idx].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_prefers_docker_then_ssh() {
        let mut options = Options::default();
        assert_eq!(Target::select("linux", "amd64", &options).kind(), "local");

        options.ssh.connection.host = "10.0.0.5".to_string();
        assert_eq!(Target::select("linux", "amd64", &options).kind(), "ssh");

        options.docker.host = "local".to_string();
        assert_eq!(Target::select("linux", "amd64", &options).kind(), "docker");
    }

    #[test]
    fn test_debug_names_backend() {
        let target = Target::select("linux", "arm64", &Options::default());
        assert_eq!(format!("{:?}", target), "local(\"Local Build (linux/arm64)\")");
    }

    #[test]
    fn test_cross_env_order() {
        let mut extra = BTreeMap::new();
        extra.insert("GOARM".to_string(), "7".to_string());

        let env = cross_env("linux", "arm", &extra);
        let keys: Vec<_> = env.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["CGO_ENABLED", "GOOS", "GOARCH", "GOARM"]);
        assert_eq!(env[1].1, "linux");
    }

    #[test]
    fn test_remote_join() {
        assert_eq!(remote_join("/tmp/x", "./shadow_bin/app"), "/tmp/x/shadow_bin/app");
        assert_eq!(remote_join("/tmp/x/", "app"), "/tmp/x/app");
        assert_eq!(remote_join("/tmp/x", ""), "/tmp/x");
    }

    #[test]
    fn test_remote_parent() {
        assert_eq!(remote_parent("/tmp/BAKE_SSH_TMP/abc/project"), "/tmp/BAKE_SSH_TMP/abc");
        assert_eq!(remote_parent("/project/"), "/");
        assert_eq!(remote_parent("relative"), "/");
    }
}
