//! SSH sessions shared by the SSH build target and the output uploader.

use std::fs;
use std::io::{self, Read};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use ssh2::{Channel, OpenFlags, OpenType, Session, Sftp};
use walkdir::WalkDir;

use crate::core::errors::BakeError;
use crate::core::options::SshConnection;

/// Port used when a connection leaves it unset.
pub const DEFAULT_PORT: u16 = 22;

/// Quote a string for a POSIX shell.
pub fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Authentication method, in preference order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SshAuth {
    PrivateKey {
        path: PathBuf,
        passphrase: Option<String>,
    },
    Password(String),
    Agent,
}

impl SshAuth {
    /// Pick the authentication method for a connection.
    ///
    /// The agent is only used when neither a key nor a password is
    /// configured, and requires `agent_sock` (the `SSH_AUTH_SOCK` value).
    pub fn choose(conn: &SshConnection, agent_sock: Option<&str>) -> Result<SshAuth, BakeError> {
        if !conn.private_key_path.is_empty() {
            let passphrase = if conn.private_key_password.is_empty() {
                None
            } else {
                Some(conn.private_key_password.clone())
            };
            return Ok(SshAuth::PrivateKey {
                path: PathBuf::from(&conn.private_key_path),
                passphrase,
            });
        }

        if !conn.password.is_empty() {
            return Ok(SshAuth::Password(conn.password.clone()));
        }

        match agent_sock {
            Some(sock) if !sock.is_empty() => Ok(SshAuth::Agent),
            _ => Err(BakeError::transport(
                "ssh",
                "no private key or password configured and SSH_AUTH_SOCK is not set",
            )),
        }
    }
}

/// Captured output of a remote command.
#[derive(Debug, Clone, Default)]
pub struct RemoteOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_status: i32,
}

/// An authenticated SSH session with an open SFTP channel.
pub struct SshClient {
    session: Session,
    sftp: Sftp,
    address: String,
}

impl SshClient {
    /// Connect and authenticate.
    ///
    /// Host keys are not verified.
    pub fn connect(conn: &SshConnection) -> Result<SshClient> {
        if conn.user.is_empty() {
            return Err(BakeError::config(format!("ssh user is empty for host `{}`", conn.host)).into());
        }
        let port = if conn.port == 0 { DEFAULT_PORT } else { conn.port };
        let address = format!("{}@{}:{}", conn.user, conn.host, port);

        let auth = SshAuth::choose(conn, std::env::var("SSH_AUTH_SOCK").ok().as_deref())?;

        let tcp = TcpStream::connect((conn.host.as_str(), port))
            .map_err(|e| BakeError::transport("ssh", format!("connect {}: {}", address, e)))?;
        let mut session = Session::new()
            .map_err(|e| BakeError::transport("ssh", format!("session: {}", e)))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| BakeError::transport("ssh", format!("handshake with {}: {}", address, e)))?;
        tracing::debug!("host key of {} accepted without verification", conn.host);

        let authed = match &auth {
            SshAuth::PrivateKey { path, passphrase } => session.userauth_pubkey_file(
                &conn.user,
                None,
                path,
                passphrase.as_deref(),
            ),
            SshAuth::Password(password) => session.userauth_password(&conn.user, password),
            SshAuth::Agent => session.userauth_agent(&conn.user),
        };
        authed.map_err(|e| {
            BakeError::transport("ssh", format!("authentication for {} failed: {}", address, e))
        })?;

        let sftp = session
            .sftp()
            .map_err(|e| BakeError::transport("ssh", format!("sftp on {}: {}", address, e)))?;

        tracing::debug!("connected to {}", address);
        Ok(SshClient {
            session,
            sftp,
            address,
        })
    }

    /// `user@host:port`
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Run a command line through the remote shell.
    pub fn exec(&self, command: &str) -> Result<RemoteOutput> {
        tracing::debug!("ssh {}: {}", self.address, command);

        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| BakeError::transport("ssh", format!("open channel: {}", e)))?;
        channel
            .exec(command)
            .map_err(|e| BakeError::transport("ssh", format!("exec: {}", e)))?;

        // Both streams are drained together; a full stderr window would
        // otherwise stall a stdout-first read.
        self.session.set_blocking(false);
        let drained = drain(&mut channel);
        self.session.set_blocking(true);
        let (stdout, stderr) = drained.context("failed to read remote output")?;

        channel.wait_close().context("failed to close ssh channel")?;
        let exit_status = channel.exit_status().context("failed to read exit status")?;

        Ok(RemoteOutput {
            stdout,
            stderr,
            exit_status,
        })
    }

    /// Create a remote directory and its missing parents.
    pub fn mkdir_all(&self, remote: &str) -> Result<()> {
        let mut current = String::new();
        for component in remote.split('/').filter(|c| !c.is_empty()) {
            if current.is_empty() && !remote.starts_with('/') {
                current.push_str(component);
            } else {
                current.push('/');
                current.push_str(component);
            }

            let path = Path::new(&current);
            if self.sftp.stat(path).is_err() {
                self.sftp
                    .mkdir(path, 0o755)
                    .with_context(|| format!("failed to create remote directory {}", current))?;
            }
        }
        Ok(())
    }

    /// Upload one file, keeping its mode.
    pub fn upload_file(&self, local: &Path, remote: &str) -> Result<()> {
        let mode = file_mode(local)?;
        let mut source = fs::File::open(local)
            .with_context(|| format!("failed to open {}", local.display()))?;

        let mut dest = self
            .sftp
            .open_mode(
                Path::new(remote),
                OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
                mode,
                OpenType::File,
            )
            .with_context(|| format!("failed to create remote file {}", remote))?;

        io::copy(&mut source, &mut dest)
            .with_context(|| format!("failed to upload {} to {}", local.display(), remote))?;
        Ok(())
    }

    /// Upload a directory tree under `remote`.
    pub fn upload_dir(&self, local: &Path, remote: &str, progress: bool) -> Result<()> {
        let files: Vec<_> = WalkDir::new(local)
            .into_iter()
            .collect::<Result<_, _>>()
            .with_context(|| format!("failed to read directory: {}", local.display()))?;

        let pb = if progress {
            let pb = ProgressBar::new(files.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        self.mkdir_all(remote)?;
        for entry in &files {
            let rel = entry.path().strip_prefix(local).unwrap_or(entry.path());
            let rel = rel.to_string_lossy().replace('\\', "/");
            let target = crate::target::remote_join(remote, &rel);
            pb.set_message(rel.clone());

            if entry.file_type().is_dir() {
                self.mkdir_all(&target)?;
            } else if entry.file_type().is_file() {
                self.upload_file(entry.path(), &target)?;
            } else {
                tracing::debug!("skipping non-regular file {}", entry.path().display());
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        tracing::debug!("uploaded {} entries to {}:{}", files.len(), self.address, remote);
        Ok(())
    }

    /// Download one file, applying the remote mode locally.
    pub fn download_file(&self, remote: &str, local: &Path) -> Result<()> {
        let remote_path = Path::new(remote);
        let mut source = self
            .sftp
            .open(remote_path)
            .with_context(|| format!("failed to open remote file {}", remote))?;

        if let Some(parent) = local.parent() {
            crate::util::fs::ensure_dir(parent)?;
        }
        let mut dest = fs::File::create(local)
            .with_context(|| format!("failed to create {}", local.display()))?;
        io::copy(&mut source, &mut dest)
            .with_context(|| format!("failed to download {}", remote))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(perm) = self.sftp.stat(remote_path).ok().and_then(|s| s.perm) {
                fs::set_permissions(local, fs::Permissions::from_mode(perm & 0o7777))
                    .with_context(|| format!("failed to set permissions: {}", local.display()))?;
            }
        }

        Ok(())
    }
}

/// A channel with separate stdout and stderr streams.
trait SplitOutput {
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl SplitOutput for Channel {
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf)
    }

    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stderr().read(buf)
    }
}

/// Read both streams of a non-blocking channel until each reports EOF.
fn drain(channel: &mut impl SplitOutput) -> io::Result<(Vec<u8>, Vec<u8>)> {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut out_done = false;
    let mut err_done = false;
    let mut buf = [0u8; 16 * 1024];

    while !(out_done && err_done) {
        let mut idle = true;

        if !out_done {
            match channel.read_stdout(&mut buf) {
                Ok(0) => out_done = true,
                Ok(n) => {
                    stdout.extend_from_slice(&buf[..n]);
                    idle = false;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }
        }
        if !err_done {
            match channel.read_stderr(&mut buf) {
                Ok(0) => err_done = true,
                Ok(n) => {
                    stderr.extend_from_slice(&buf[..n]);
                    idle = false;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }
        }

        if idle {
            thread::sleep(Duration::from_millis(10));
        }
    }

    Ok((stdout, stderr))
}

#[cfg(unix)]
fn file_mode(path: &Path) -> Result<i32> {
    use std::os::unix::fs::PermissionsExt;
    let meta = fs::metadata(path).with_context(|| format!("failed to stat {}", path.display()))?;
    Ok((meta.permissions().mode() & 0o7777) as i32)
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> Result<i32> {
    Ok(0o644)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> SshConnection {
        SshConnection {
            host: "builder.local".to_string(),
            user: "root".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_shell_escape() {
        assert_eq!(shell_escape("plain"), "'plain'");
        assert_eq!(shell_escape("-X main.v=1"), "'-X main.v=1'");
        assert_eq!(shell_escape("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_auth_prefers_private_key() {
        let mut c = conn();
        c.private_key_path = "/root/.ssh/id_ed25519".to_string();
        c.private_key_password = "phrase".to_string();
        c.password = "pw".to_string();

        assert_eq!(
            SshAuth::choose(&c, Some("/tmp/agent.sock")).unwrap(),
            SshAuth::PrivateKey {
                path: PathBuf::from("/root/.ssh/id_ed25519"),
                passphrase: Some("phrase".to_string()),
            }
        );
    }

    #[test]
    fn test_auth_password_then_agent() {
        let mut c = conn();
        c.password = "pw".to_string();
        assert_eq!(SshAuth::choose(&c, None).unwrap(), SshAuth::Password("pw".to_string()));

        let c = conn();
        assert_eq!(SshAuth::choose(&c, Some("/tmp/agent.sock")).unwrap(), SshAuth::Agent);
    }

    #[test]
    fn test_auth_without_any_method_fails() {
        let err = SshAuth::choose(&conn(), None).unwrap_err();
        assert!(matches!(err, BakeError::Transport { backend: "ssh", .. }));

        let err = SshAuth::choose(&conn(), Some("")).unwrap_err();
        assert!(matches!(err, BakeError::Transport { .. }));
    }

    /// Replays scripted reads; `None` stands for `WouldBlock`.
    struct ScriptedChannel {
        stdout: Vec<Option<Vec<u8>>>,
        stderr: Vec<Option<Vec<u8>>>,
    }

    fn next_read(script: &mut Vec<Option<Vec<u8>>>, buf: &mut [u8]) -> io::Result<usize> {
        if script.is_empty() {
            return Ok(0);
        }
        match script.remove(0) {
            Some(chunk) => {
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
            None => Err(io::ErrorKind::WouldBlock.into()),
        }
    }

    impl SplitOutput for ScriptedChannel {
        fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            next_read(&mut self.stdout, buf)
        }

        fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            next_read(&mut self.stderr, buf)
        }
    }

    #[test]
    fn test_drain_reads_stderr_while_stdout_blocks() {
        // stdout stays blocked until a large stderr backlog is consumed.
        let mut stdout = vec![None; 6];
        stdout.push(Some(b"done\n".to_vec()));
        let stderr = (0..5).map(|i| Some(vec![b'a' + i; 4096])).collect();
        let mut channel = ScriptedChannel { stdout, stderr };

        let (out, err) = drain(&mut channel).unwrap();
        assert_eq!(out, b"done\n");
        assert_eq!(err.len(), 5 * 4096);
        assert!(err.starts_with(&[b'a'; 4096]));
    }

    #[test]
    fn test_drain_propagates_read_errors() {
        struct Broken;
        impl SplitOutput for Broken {
            fn read_stdout(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            }
            fn read_stderr(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Ok(0)
            }
        }

        let err = drain(&mut Broken).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }
}

