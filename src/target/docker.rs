//! Container build target backed by the Docker Engine API.
//!
//! The engine client is async; each call is driven to completion on a
//! private current-thread runtime so the target keeps the same blocking
//! contract as the other backends.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, DownloadFromContainerOptions,
    InspectContainerOptions, LogOutput, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions, UploadToContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::StreamExt;
use tokio::runtime::Runtime;

use crate::core::errors::BakeError;
use crate::core::options::DockerOptions;
use crate::target::container::{ContainerEvent, ContainerLifecycle, Teardown};
use crate::target::{cross_env, remote_join, BuildOutput, RemoteTarget};
use crate::util::{archive, fs as bake_fs};

/// Temp base inside the container when none is configured.
pub const DEFAULT_DOCKER_TEMP: &str = "/BAKE_DOCKER_TMP";

/// Seconds a reused container gets to stop.
const STOP_GRACE_SECS: i64 = 5;

const CONNECT_TIMEOUT_SECS: u64 = 120;

fn transport(err: impl Display) -> BakeError {
    BakeError::transport("docker", err.to_string())
}

/// Builds inside a (possibly reused) container.
pub struct DockerTarget {
    options: DockerOptions,
    platform: String,
    arch: String,
    tag: String,
    shadow: Option<PathBuf>,
    runtime: Option<Runtime>,
    client: Option<Docker>,
    container_id: String,
    lifecycle: ContainerLifecycle,
}

impl DockerTarget {
    pub fn new(options: &DockerOptions, platform: &str, arch: &str) -> Self {
        let mut options = options.clone();
        if options.temp.is_empty() {
            options.temp = DEFAULT_DOCKER_TEMP.to_string();
        }
        DockerTarget {
            options,
            platform: platform.to_string(),
            arch: arch.to_string(),
            tag: String::new(),
            shadow: None,
            runtime: None,
            client: None,
            container_id: String::new(),
            lifecycle: ContainerLifecycle::new(),
        }
    }

    /// Provisioning state, for diagnostics.
    pub fn lifecycle(&self) -> &ContainerLifecycle {
        &self.lifecycle
    }

    /// Build directory inside the container: `<temp>/<tag>`.
    pub fn workdir(&self) -> String {
        remote_join(&self.options.temp, &self.tag)
    }

    fn connected(&self) -> Result<(&Runtime, &Docker)> {
        match (&self.runtime, &self.client) {
            (Some(rt), Some(docker)) => Ok((rt, docker)),
            _ => Err(transport("not connected").into()),
        }
    }

    fn exec(&self, cmd: Vec<String>, env: Vec<String>, working_dir: Option<String>) -> Result<ExecResult> {
        let (rt, docker) = self.connected()?;
        rt.block_on(run_exec(docker, &self.container_id, cmd, env, working_dir))
    }
}

struct ExecResult {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: Option<i64>,
}

fn connect(host: &str) -> Result<Docker, BakeError> {
    if host.is_empty() {
        return Err(transport("docker host is empty (use 'local'?)"));
    }
    let docker = if host == "local" {
        Docker::connect_with_local_defaults()
    } else if host.starts_with("unix://") {
        Docker::connect_with_unix(host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
    } else {
        Docker::connect_with_http(host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
    };
    docker.map_err(transport)
}

/// Resolve the configured container, restarting or creating it as needed.
///
/// `container_id` is set as soon as there is a container for `close` to
/// tear down, even if a later step fails.
async fn provision(
    docker: &Docker,
    options: &DockerOptions,
    lifecycle: &mut ContainerLifecycle,
    container_id: &mut String,
) -> Result<()> {
    lifecycle.apply(ContainerEvent::Inspect)?;

    let found = if options.container.is_empty() {
        None
    } else {
        match docker
            .inspect_container(&options.container, None::<InspectContainerOptions>)
            .await
        {
            Ok(info) => Some(
                info.state
                    .and_then(|s| s.running)
                    .unwrap_or(false),
            ),
            Err(DockerError::DockerResponseServerError {
                status_code: 404, ..
            }) => None,
            Err(e) => return Err(transport(format!("inspect {}: {}", options.container, e)).into()),
        }
    };

    match found {
        Some(running) => {
            lifecycle.apply(ContainerEvent::Found { running })?;
            if !running {
                tracing::info!("restarting stopped container {}", options.container);
                docker
                    .start_container(&options.container, None::<StartContainerOptions<String>>)
                    .await
                    .map_err(|e| transport(format!("restart {}: {}", options.container, e)))?;
                lifecycle.apply(ContainerEvent::Restart)?;
            }
            *container_id = options.container.clone();
            Ok(())
        }
        None => {
            lifecycle.apply(ContainerEvent::NotFound)?;
            if options.image.is_empty() {
                return Err(transport(format!(
                    "container `{}` not found and image not set",
                    options.container
                ))
                .into());
            }

            lifecycle.apply(ContainerEvent::Pull)?;
            tracing::info!("pulling image {}", options.image);
            let mut pull = docker.create_image(
                Some(CreateImageOptions {
                    from_image: options.image.clone(),
                    ..Default::default()
                }),
                None,
                None,
            );
            while let Some(progress) = pull.next().await {
                let progress =
                    progress.map_err(|e| transport(format!("pull {}: {}", options.image, e)))?;
                if let Some(status) = progress.status {
                    match progress.progress {
                        Some(bar) => tracing::debug!("{} {}", status, bar),
                        None => tracing::debug!("{}", status),
                    }
                }
            }

            let created = docker
                .create_container(
                    None::<CreateContainerOptions<String>>,
                    ContainerConfig {
                        image: Some(options.image.clone()),
                        cmd: Some(vec![
                            "tail".to_string(),
                            "-f".to_string(),
                            "/dev/null".to_string(),
                        ]),
                        ..Default::default()
                    },
                )
                .await
                .map_err(|e| transport(format!("create container from {}: {}", options.image, e)))?;
            *container_id = created.id.clone();
            for warning in &created.warnings {
                tracing::warn!("{}", warning);
            }
            lifecycle.apply(ContainerEvent::Create)?;

            docker
                .start_container(&created.id, None::<StartContainerOptions<String>>)
                .await
                .map_err(|e| transport(format!("start {}: {}", created.id, e)))?;
            lifecycle.apply(ContainerEvent::Start)?;

            tracing::info!("created container {}", created.id);
            Ok(())
        }
    }
}

async fn run_exec(
    docker: &Docker,
    container: &str,
    cmd: Vec<String>,
    env: Vec<String>,
    working_dir: Option<String>,
) -> Result<ExecResult> {
    let exec = docker
        .create_exec(
            container,
            CreateExecOptions {
                attach_stdout: Some(true),
                attach_stderr: Some(true),
                cmd: Some(cmd),
                env: Some(env),
                working_dir,
                ..Default::default()
            },
        )
        .await
        .map_err(|e| transport(format!("create exec: {}", e)))?;

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let started = docker
        .start_exec(&exec.id, None)
        .await
        .map_err(|e| transport(format!("start exec: {}", e)))?;
    if let StartExecResults::Attached { mut output, .. } = started {
        while let Some(chunk) = output.next().await {
            match chunk.map_err(|e| transport(format!("exec output: {}", e)))? {
                LogOutput::StdErr { message } => stderr.extend_from_slice(&message),
                LogOutput::StdOut { message } | LogOutput::Console { message } => {
                    stdout.extend_from_slice(&message)
                }
                LogOutput::StdIn { .. } => {}
            }
        }
    }

    let inspect = docker
        .inspect_exec(&exec.id)
        .await
        .map_err(|e| transport(format!("inspect exec: {}", e)))?;

    Ok(ExecResult {
        stdout,
        stderr,
        exit_code: inspect.exit_code,
    })
}

/// Whether a container build succeeded.
///
/// The exit code is not always reported through the exec path, so any
/// output containing `failed` counts as a failure.
pub fn build_succeeded(exit_code: Option<i64>, stdout: &[u8], stderr: &[u8]) -> bool {
    let exited_ok = exit_code.map_or(true, |code| code == 0);
    let text = [
        String::from_utf8_lossy(stdout),
        String::from_utf8_lossy(stderr),
    ]
    .concat();
    exited_ok && !text.contains("failed")
}

impl RemoteTarget for DockerTarget {
    fn info(&self) -> String {
        let subject = if self.options.container.is_empty() {
            &self.options.image
        } else {
            &self.options.container
        };
        format!("Docker Build ({} on {})", subject, self.options.host)
    }

    fn init_and_connect(&mut self, hash_tag: &str) -> Result<()> {
        self.tag = hash_tag.to_string();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;
        let docker = {
            let _guard = runtime.enter();
            connect(&self.options.host)?
        };

        let provisioned = runtime
            .block_on(docker.version())
            .map_err(|e| anyhow::Error::from(transport(format!("{}: {}", self.options.host, e))))
            .and_then(|version| {
                tracing::debug!(
                    "connected to docker {} ({})",
                    version.version.unwrap_or_default(),
                    self.options.host
                );
                runtime.block_on(provision(
                    &docker,
                    &self.options,
                    &mut self.lifecycle,
                    &mut self.container_id,
                ))
            });

        // Kept even on failure so `close` can tear down a half-made container.
        self.runtime = Some(runtime);
        self.client = Some(docker);
        provisioned?;

        if !self.lifecycle.is_running() {
            return Err(transport(format!("container is {}", self.lifecycle.state())).into());
        }
        Ok(())
    }

    fn copy_shadow_project_to(&mut self, shadow: &Path) -> Result<()> {
        self.shadow = Some(shadow.to_path_buf());
        let workdir = self.workdir();

        let tarball = archive::pack_dir(shadow)?;
        let mkdir = self.exec(
            vec!["mkdir".to_string(), "-p".to_string(), workdir.clone()],
            Vec::new(),
            None,
        )?;
        if mkdir.exit_code.unwrap_or(0) != 0 {
            return Err(transport(format!(
                "mkdir {}: {}",
                workdir,
                String::from_utf8_lossy(&mkdir.stderr).trim()
            ))
            .into());
        }

        let (rt, docker) = self.connected()?;
        tracing::debug!("uploading {} bytes to {}", tarball.len(), workdir);
        rt.block_on(docker.upload_to_container(
            &self.container_id,
            Some(UploadToContainerOptions {
                path: workdir.clone(),
                ..Default::default()
            }),
            tarball.into(),
        ))
        .map_err(|e| transport(format!("upload to {}: {}", workdir, e)))?;

        Ok(())
    }

    fn build_exec(
        &mut self,
        cmd: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<BuildOutput> {
        let mut command = vec![
            cmd.to_string(),
            "build".to_string(),
            "-buildvcs=false".to_string(),
        ];
        command.extend(args.iter().cloned());
        let env = cross_env(&self.platform, &self.arch, env)
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let result = self.exec(command, env, Some(self.workdir()))?;
        Ok(BuildOutput {
            success: build_succeeded(result.exit_code, &result.stdout, &result.stderr),
            stdout: result.stdout,
            stderr: result.stderr,
        })
    }

    fn copy_file_back(&mut self, remote_rel: &str, local_dest: &Path) -> Result<()> {
        let shadow = self
            .shadow
            .clone()
            .context("docker target has no shadow project")?;
        let staging = shadow.parent().unwrap_or(&shadow).to_path_buf();

        let rel = remote_rel.trim_start_matches("./");
        let rel_dir = match rel.rfind('/') {
            Some(idx) => &rel[..idx],
            None => "",
        };
        let remote_dir = remote_join(&self.workdir(), rel_dir);

        let (rt, docker) = self.connected()?;
        let tarball = rt.block_on(async {
            let mut stream = docker.download_from_container(
                &self.container_id,
                Some(DownloadFromContainerOptions {
                    path: remote_dir.clone(),
                }),
            );
            let mut data = Vec::new();
            while let Some(chunk) = stream.next().await {
                data.extend_from_slice(&chunk.map_err(|e| {
                    transport(format!("download {}: {}", remote_dir, e))
                })?);
            }
            Ok::<_, anyhow::Error>(data)
        })?;

        let tar_path = staging.join("docker_return.tar");
        bake_fs::write_bytes(&tar_path, &tarball)?;
        let unpacked = staging.join("docker_return");
        archive::unpack(&tarball, &unpacked, false)?;

        // The archive root is the downloaded directory itself.
        let src = if rel_dir.is_empty() {
            unpacked.join(rel)
        } else {
            let base = rel_dir.rsplit('/').next().unwrap_or(rel_dir);
            let file = &rel[rel_dir.len() + 1..];
            unpacked.join(base).join(file)
        };
        bake_fs::copy_file(&src, local_dest)
    }

    fn close(&mut self) -> Result<()> {
        if self.client.is_none() {
            return Ok(());
        }
        if self.container_id.is_empty() {
            self.client = None;
            self.runtime = None;
            return Ok(());
        }

        match self.lifecycle.teardown() {
            Teardown::Remove => {
                let (rt, docker) = self.connected()?;
                rt.block_on(docker.remove_container(
                    &self.container_id,
                    Some(RemoveContainerOptions {
                        force: true,
                        v: true,
                        ..Default::default()
                    }),
                ))
                .map_err(|e| BakeError::cleanup(format!("remove {}: {}", self.container_id, e)))?;
                tracing::debug!("removed container {}", self.container_id);
            }
            teardown @ (Teardown::CleanTemp | Teardown::Stop) => {
                let workdir = self.workdir();
                let rm = self.exec(
                    vec!["rm".to_string(), "-rf".to_string(), workdir.clone()],
                    Vec::new(),
                    None,
                )?;
                if rm.exit_code.unwrap_or(0) != 0 {
                    tracing::warn!(
                        "failed to remove {} in container: {}",
                        workdir,
                        String::from_utf8_lossy(&rm.stderr).trim()
                    );
                }

                if teardown == Teardown::Stop {
                    let (rt, docker) = self.connected()?;
                    rt.block_on(docker.stop_container(
                        &self.container_id,
                        Some(StopContainerOptions { t: STOP_GRACE_SECS }),
                    ))
                    .map_err(|e| {
                        BakeError::cleanup(format!("stop {}: {}", self.container_id, e))
                    })?;
                    tracing::debug!("stopped container {}", self.container_id);
                }
            }
        }

        self.client = None;
        self.runtime = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_output_overrides_exit_code() {
        assert!(build_succeeded(Some(0), b"", b""));
        assert!(build_succeeded(None, b"ok", b""));
        assert!(!build_succeeded(Some(0), b"", b"go: build failed"));
        assert!(!build_succeeded(Some(0), b"link failed\n", b""));
        assert!(!build_succeeded(Some(2), b"", b""));
    }

    #[test]
    fn test_empty_host_is_rejected() {
        match connect("") {
            Err(err) => assert!(err.to_string().contains("use 'local'")),
            Ok(_) => panic!("empty host must not connect"),
        }
    }

    #[test]
    fn test_default_temp_and_workdir() {
        let mut target = DockerTarget::new(&DockerOptions::default(), "linux", "amd64");
        target.tag = "abcdefghijkl".to_string();
        assert_eq!(target.workdir(), "/BAKE_DOCKER_TMP/abcdefghijkl");

        let options = DockerOptions {
            host: "local".to_string(),
            image: "golang:1.22".to_string(),
            temp: "/work/".to_string(),
            ..Default::default()
        };
        let mut target = DockerTarget::new(&options, "linux", "arm64");
        target.tag = "abcdefghijkl".to_string();
        assert_eq!(target.workdir(), "/work/abcdefghijkl");
        assert_eq!(target.info(), "Docker Build (golang:1.22 on local)");
    }

    #[test]
    fn test_close_without_connect_is_noop() {
        let mut target = DockerTarget::new(&DockerOptions::default(), "linux", "amd64");
        target.close().unwrap();
        assert_eq!(target.lifecycle().state(), crate::target::ContainerState::Unprovisioned);
    }

    fn unreachable_engine() -> (Runtime, Docker) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let docker = {
            let _guard = runtime.enter();
            connect("tcp://127.0.0.1:1").unwrap()
        };
        (runtime, docker)
    }

    #[test]
    fn test_failed_connect_keeps_client_for_close() {
        let options = DockerOptions {
            host: "tcp://127.0.0.1:1".to_string(),
            image: "golang:1.22".to_string(),
            ..Default::default()
        };
        let mut target = DockerTarget::new(&options, "linux", "amd64");

        let err = target.init_and_connect("abcdefghijkl").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BakeError>(),
            Some(BakeError::Transport { backend: "docker", .. })
        ));
        assert!(target.client.is_some());

        // Nothing was provisioned, so there is nothing to tear down.
        target.close().unwrap();
        assert!(target.client.is_none());
    }

    #[test]
    fn test_close_removes_container_created_before_failure() {
        let mut target = DockerTarget::new(&DockerOptions::default(), "linux", "amd64");
        for event in [
            ContainerEvent::Inspect,
            ContainerEvent::NotFound,
            ContainerEvent::Pull,
            ContainerEvent::Create,
        ] {
            target.lifecycle.apply(event).unwrap();
        }
        let (runtime, docker) = unreachable_engine();
        target.runtime = Some(runtime);
        target.client = Some(docker);
        target.container_id = "0123456789ab".to_string();

        // The engine is gone, but close must still attempt the removal.
        let err = target.close().unwrap_err();
        match err.downcast_ref::<BakeError>() {
            Some(BakeError::Cleanup { message }) => assert!(message.starts_with("remove 0123456789ab")),
            other => panic!("unexpected: {:?}", other),
        }
    }
}

