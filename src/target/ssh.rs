//! SSH build target.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};

use crate::core::errors::BakeError;
use crate::core::options::SshOptions;
use crate::target::{cross_env, remote_join, remote_parent, BuildOutput, RemoteTarget};
use crate::util::ssh::{shell_escape, SshClient, DEFAULT_PORT};
use crate::util::tag::TAG_LEN;

/// Remote temp base when none is configured.
pub const DEFAULT_SSH_TEMP: &str = "/tmp/BAKE_SSH_TMP";

/// Builds on a remote host over SSH.
pub struct SshTarget {
    options: SshOptions,
    platform: String,
    arch: String,
    tag: String,
    progress: bool,
    client: Option<SshClient>,
}

impl SshTarget {
    pub fn new(options: &SshOptions, platform: &str, arch: &str) -> Self {
        let mut options = options.clone();
        if options.temp.is_empty() {
            options.temp = DEFAULT_SSH_TEMP.to_string();
        }
        if options.connection.port == 0 {
            options.connection.port = DEFAULT_PORT;
        }
        SshTarget {
            options,
            platform: platform.to_string(),
            arch: arch.to_string(),
            tag: String::new(),
            progress: false,
            client: None,
        }
    }

    /// Show a progress bar while uploading the project.
    pub fn set_progress(&mut self, enabled: bool) {
        self.progress = enabled;
    }

    /// Project directory on the host: `<temp>/<tag>/project`.
    pub fn workdir(&self) -> String {
        remote_join(&remote_join(&self.options.temp, &self.tag), "project")
    }

    fn client(&self) -> Result<&SshClient> {
        self.client
            .as_ref()
            .ok_or_else(|| BakeError::transport("ssh", "not connected").into())
    }
}

/// Whether `key` can be used as a shell variable name.
fn is_env_name(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Compose `cd <dir> && <env...> <cmd> build <args...>` with every word quoted.
///
/// Env names are not quotable, so a name that is not a plain shell
/// identifier is rejected.
pub fn compose_build_command(
    workdir: &str,
    cmd: &str,
    args: &[String],
    env: &[(String, String)],
) -> Result<String, BakeError> {
    let mut line = format!("cd {} &&", shell_escape(workdir));
    for (key, value) in env {
        if !is_env_name(key) {
            return Err(BakeError::config(format!("invalid environment variable name `{}`", key)));
        }
        line.push(' ');
        line.push_str(key);
        line.push('=');
        line.push_str(&shell_escape(value));
    }
    line.push(' ');
    line.push_str(&shell_escape(cmd));
    line.push_str(" build");
    for arg in args {
        line.push(' ');
        line.push_str(&shell_escape(arg));
    }
    Ok(line)
}

/// The directory `close` may delete for `workdir`, if any.
///
/// Refuses the root path, malformed tags, and any path not carrying the tag.
pub fn removable_dir(workdir: &str, tag: &str) -> Option<String> {
    let trimmed = workdir.trim_end_matches('/');
    if trimmed.is_empty() || tag.len() != TAG_LEN || !trimmed.contains(tag) {
        return None;
    }
    let parent = remote_parent(trimmed);
    if parent == "/" || !parent.contains(tag) {
        return None;
    }
    Some(parent)
}

impl RemoteTarget for SshTarget {
    fn info(&self) -> String {
        let conn = &self.options.connection;
        format!("SSH Build ({}@{}:{})", conn.user, conn.host, conn.port)
    }

    fn init_and_connect(&mut self, hash_tag: &str) -> Result<()> {
        self.tag = hash_tag.to_string();
        let client = SshClient::connect(&self.options.connection)?;
        tracing::info!("connected to {}", client.address());
        self.client = Some(client);
        Ok(())
    }

    fn copy_shadow_project_to(&mut self, shadow: &Path) -> Result<()> {
        let workdir = self.workdir();
        self.client()?
            .upload_dir(shadow, &workdir, self.progress)
            .with_context(|| format!("failed to upload project to {}", workdir))
    }

    fn build_exec(
        &mut self,
        cmd: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<BuildOutput> {
        let env = cross_env(&self.platform, &self.arch, env);
        let line = compose_build_command(&self.workdir(), cmd, args, &env)?;

        let output = self.client()?.exec(&line)?;
        Ok(BuildOutput {
            success: output.exit_status == 0,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    fn copy_file_back(&mut self, remote_rel: &str, local_dest: &Path) -> Result<()> {
        let remote = remote_join(&self.workdir(), remote_rel);
        self.client()?.download_file(&remote, local_dest)
    }

    fn close(&mut self) -> Result<()> {
        let client = match self.client.take() {
            Some(client) => client,
            None => return Ok(()),
        };

        let workdir = self.workdir();
        let dir = match removable_dir(&workdir, &self.tag) {
            Some(dir) => dir,
            None => {
                tracing::warn!("refusing to remove remote path {}", workdir);
                return Ok(());
            }
        };

        let output = client.exec(&format!("rm -rf {}", shell_escape(&dir)))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.trim().is_empty() {
            tracing::debug!("{}", stdout.trim());
        }
        if output.exit_status != 0 {
            return Err(BakeError::cleanup(format!(
                "rm -rf {} on {}: {}",
                dir,
                client.address(),
                stderr.trim()
            ))
            .into());
        }
        tracing::debug!("removed {} on {}", dir, client.address());
        Ok(())
    }
}
