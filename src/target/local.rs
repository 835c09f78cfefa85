//! Local build target.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::target::{cross_env, BuildOutput, RemoteTarget};
use crate::util::fs::copy_file;
use crate::util::process::ProcessBuilder;

/// Builds in the shadow workspace with a local child process.
#[derive(Debug)]
pub struct LocalTarget {
    platform: String,
    arch: String,
    workdir: Option<PathBuf>,
}

impl LocalTarget {
    pub fn new(platform: &str, arch: &str) -> Self {
        LocalTarget {
            platform: platform.to_string(),
            arch: arch.to_string(),
            workdir: None,
        }
    }

    fn workdir(&self) -> Result<&Path> {
        self.workdir
            .as_deref()
            .context("local target has no shadow project")
    }
}

impl RemoteTarget for LocalTarget {
    fn info(&self) -> String {
        format!("Local Build ({}/{})", self.platform, self.arch)
    }

    fn init_and_connect(&mut self, _hash_tag: &str) -> Result<()> {
        Ok(())
    }

    fn copy_shadow_project_to(&mut self, shadow: &Path) -> Result<()> {
        self.workdir = Some(shadow.to_path_buf());
        Ok(())
    }

    fn build_exec(
        &mut self,
        cmd: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<BuildOutput> {
        let output = ProcessBuilder::new(cmd)
            .arg("build")
            .args(args)
            .envs(cross_env(&self.platform, &self.arch, env))
            .cwd(self.workdir()?)
            .exec()?;

        Ok(BuildOutput {
            success: output.status.success(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    fn copy_file_back(&mut self, remote_rel: &str, local_dest: &Path) -> Result<()> {
        let src = self.workdir()?.join(remote_rel.trim_start_matches("./"));
        copy_file(&src, local_dest)
    }

    fn close(&mut self) -> Result<()> {
        self.workdir = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[cfg(unix)]
    fn fake_builder(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("fake-go");
        fs::write(
            &script,
            "#!/bin/sh\n\
             # fake-go build -o <out> <entrance>\n\
             out=\"$3\"\n\
             mkdir -p \"$(dirname \"$out\")\"\n\
             echo \"$CGO_ENABLED $GOOS $GOARCH $GOARM\" > \"$out\"\n",
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    #[test]
    fn test_local_build_and_copy_back() {
        let tmp = TempDir::new().unwrap();
        let shadow = tmp.path().join("SHADOW_PROJECT");
        fs::create_dir_all(&shadow).unwrap();
        let builder = fake_builder(tmp.path());

        let mut target = LocalTarget::new("linux", "arm");
        target.init_and_connect("abcdefghijkl").unwrap();
        target.copy_shadow_project_to(&shadow).unwrap();

        let mut env = BTreeMap::new();
        env.insert("GOARM".to_string(), "7".to_string());
        let args = vec![
            "-o".to_string(),
            "./shadow_bin/app".to_string(),
            "./cmd/app".to_string(),
        ];
        let output = target
            .build_exec(builder.to_str().unwrap(), &args, &env)
            .unwrap();
        assert!(output.success, "{}", output.stderr_lossy());

        let dest = tmp.path().join("bin/app");
        target.copy_file_back("./shadow_bin/app", &dest).unwrap();
        assert_eq!(fs::read_to_string(dest).unwrap().trim(), "0 linux arm 7");

        target.close().unwrap();
    }

    #[test]
    fn test_build_before_copy_fails() {
        let mut target = LocalTarget::new("linux", "amd64");
        assert!(target.build_exec("go", &[], &BTreeMap::new()).is_err());
    }
}
