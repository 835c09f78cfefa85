//! Shadow workspaces.
//!
//! A shadow workspace is a disposable copy of the project at
//! `<base>/<tag>/SHADOW_PROJECT`. Vendoring and substitution mutate the
//! copy, never the real project.

pub mod substitute;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::errors::BakeError;
use crate::core::replace::ReplaceScope;
use crate::util::fs::{copy_dir_excluding, ensure_dir, remove_dir_all_if_exists};
use crate::util::process::{find_executable, ProcessBuilder};
use crate::util::tag::random_tag;

pub use substitute::{substitute, SubstituteReport};

/// Directory name of the project copy inside the tag directory.
pub const SHADOW_DIR: &str = "SHADOW_PROJECT";

/// Directory, relative to the shadow project, the builder writes into.
pub const SHADOW_BIN: &str = "shadow_bin";

/// Default base directory under the system temp dir.
pub const SHADOW_BASE: &str = "BAKE_TMP";

const NOT_A_PROJECT: &str = "go.mod file not found";

/// A disposable copy of a project.
#[derive(Debug)]
pub struct ShadowWorkspace {
    tag: String,
    root: PathBuf,
    path: PathBuf,
}

impl ShadowWorkspace {
    /// Copy `project` into a fresh workspace under `base`.
    ///
    /// `base` may sit inside the project; it is left out of the copy. On
    /// failure nothing is left behind under `base`.
    pub fn create(project: &Path, base: &Path) -> Result<ShadowWorkspace> {
        let tag = random_tag();
        let root = base.join(&tag);
        let path = root.join(SHADOW_DIR);

        let copied = ensure_dir(&root).and_then(|_| copy_dir_excluding(project, &path, &[base]));
        if let Err(e) = copied {
            if let Err(cleanup) = remove_dir_all_if_exists(&root) {
                tracing::warn!("{:#}", cleanup);
            }
            return Err(BakeError::Copy {
                path: project.to_path_buf(),
                message: format!("{:#}", e),
            }
            .into());
        }

        let path = path
            .canonicalize()
            .with_context(|| format!("failed to resolve {}", path.display()))?;
        tracing::debug!("shadow workspace {}", path.display());

        Ok(ShadowWorkspace { tag, root, path })
    }

    /// The random tag keying this workspace.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The project copy.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The tag directory holding the copy and any staging files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run `<builder> mod vendor`, then rename vendored dependencies.
    pub fn vendor(&self, builder: &str, dependency: &BTreeMap<String, String>) -> Result<()> {
        let bare = !builder.contains('/') && !builder.contains('\\');
        if bare && find_executable(builder).is_none() {
            return Err(BakeError::config(format!("builder `{}` not found in PATH", builder)).into());
        }

        let output = ProcessBuilder::new(builder)
            .args(["mod", "vendor"])
            .cwd(&self.path)
            .exec()
            .with_context(|| format!("failed to run `{} mod vendor`", builder))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            tracing::debug!("{}", stdout.trim());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains(NOT_A_PROJECT) {
            return Err(BakeError::NotAProject {
                diagnostic: stderr.trim().to_string(),
            }
            .into());
        }
        if !stderr.trim().is_empty() {
            tracing::warn!("vendor: {}", stderr.trim());
        }

        let vendor = self.path.join("vendor");
        for (old, new) in dependency {
            let from = vendor.join(old);
            let to = vendor.join(new);
            if let Some(parent) = to.parent() {
                ensure_dir(parent)?;
            }
            std::fs::rename(&from, &to).with_context(|| {
                format!("failed to rename vendored dependency `{}` to `{}`", old, new)
            })?;
            tracing::debug!("vendor/{} -> vendor/{}", old, new);
        }

        Ok(())
    }

    /// Rewrite words in place; see [`substitute::substitute`].
    pub fn substitute(
        &self,
        words: &BTreeMap<String, String>,
        scope: Option<&ReplaceScope>,
    ) -> SubstituteReport {
        substitute(&self.path, words, scope)
    }

    /// Delete the tag directory.
    ///
    /// In dev mode nothing is deleted and `DevModeSkip` carries the
    /// retained path.
    pub fn close(self, dev: bool) -> Result<()> {
        if dev {
            return Err(BakeError::DevModeSkip { path: self.path }.into());
        }
        remove_dir_all_if_exists(&self.root)
            .map_err(|e| BakeError::cleanup(format!("{:#}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sample_project(dir: &Path) {
        fs::create_dir_all(dir.join("cmd/app")).unwrap();
        fs::write(dir.join("go.mod"), "module example.com/app\n").unwrap();
        fs::write(dir.join("cmd/app/main.go"), "package main\n").unwrap();
    }

    #[cfg(unix)]
    fn fake_go(dir: &Path, stderr: &str, vendor: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("fake-go");
        fs::write(
            &script,
            format!(
                "#!/bin/sh\n{}\necho '{}' >&2\n",
                if vendor.is_empty() {
                    String::new()
                } else {
                    format!("mkdir -p vendor/{0} && touch vendor/{0}/x.go", vendor)
                },
                stderr
            ),
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[test]
    fn test_create_and_close() {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path().join("project");
        let base = tmp.path().join("base");
        sample_project(&project);

        let ws = ShadowWorkspace::create(&project, &base).unwrap();
        assert_eq!(ws.tag().len(), 12);
        assert!(ws.path().ends_with(SHADOW_DIR));
        assert!(ws.path().join("cmd/app/main.go").exists());

        let root = ws.root().to_path_buf();
        ws.close(false).unwrap();
        assert!(!root.exists());
        assert!(project.join("go.mod").exists());
    }

    #[test]
    fn test_close_in_dev_mode_retains() {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path().join("project");
        sample_project(&project);

        let ws = ShadowWorkspace::create(&project, &tmp.path().join("base")).unwrap();
        let path = ws.path().to_path_buf();

        let err = ws.close(true).unwrap_err();
        match err.downcast_ref::<BakeError>() {
            Some(BakeError::DevModeSkip { path: retained }) => assert_eq!(retained, &path),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(path.exists());
    }

    #[test]
    fn test_create_failure_leaves_nothing() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("base");

        let err = ShadowWorkspace::create(&tmp.path().join("missing"), &base).unwrap_err();
        assert!(matches!(err.downcast_ref::<BakeError>(), Some(BakeError::Copy { .. })));
        assert_eq!(fs::read_dir(&base).map(|d| d.count()).unwrap_or(0), 0);
    }

    #[test]
    fn test_substitute_only_touches_shadow() {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path().join("project");
        sample_project(&project);
        fs::write(project.join("version.go"), "const V = \"dev\"\n").unwrap();

        let ws = ShadowWorkspace::create(&project, &tmp.path().join("base")).unwrap();
        let mut words = BTreeMap::new();
        words.insert("dev".to_string(), "1.0.0".to_string());
        let report = ws.substitute(&words, None);

        assert_eq!(report.rewritten.len(), 1);
        assert_eq!(
            fs::read_to_string(ws.path().join("version.go")).unwrap(),
            "const V = \"1.0.0\"\n"
        );
        assert_eq!(
            fs::read_to_string(project.join("version.go")).unwrap(),
            "const V = \"dev\"\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_vendor_not_a_project() {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path().join("project");
        fs::create_dir_all(&project).unwrap();
        let go = fake_go(
            tmp.path(),
            "go: go.mod file not found in current directory or any parent directory",
            "",
        );

        let ws = ShadowWorkspace::create(&project, &tmp.path().join("base")).unwrap();
        let err = ws.vendor(go.to_str().unwrap(), &BTreeMap::new()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BakeError>(),
            Some(BakeError::NotAProject { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_vendor_warning_and_rename() {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path().join("project");
        sample_project(&project);
        let go = fake_go(tmp.path(), "go: downloading github.com/a/b v1.0.0", "github.com/a/b");

        let ws = ShadowWorkspace::create(&project, &tmp.path().join("base")).unwrap();
        let mut dependency = BTreeMap::new();
        dependency.insert("github.com/a/b".to_string(), "github.com/fork/b".to_string());

        ws.vendor(go.to_str().unwrap(), &dependency).unwrap();
        assert!(ws.path().join("vendor/github.com/fork/b/x.go").exists());
        assert!(!ws.path().join("vendor/github.com/a/b").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_vendor_rename_of_missing_dependency_fails() {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path().join("project");
        sample_project(&project);
        let go = fake_go(tmp.path(), "", "");

        let ws = ShadowWorkspace::create(&project, &tmp.path().join("base")).unwrap();
        let mut dependency = BTreeMap::new();
        dependency.insert("github.com/none/x".to_string(), "github.com/y/x".to_string());

        assert!(ws.vendor(go.to_str().unwrap(), &dependency).is_err());
    }

    #[test]
    fn test_vendor_missing_builder() {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path().join("project");
        sample_project(&project);

        let ws = ShadowWorkspace::create(&project, &tmp.path().join("base")).unwrap();
        let err = ws.vendor("bake-no-such-go", &BTreeMap::new()).unwrap_err();
        assert!(matches!(err.downcast_ref::<BakeError>(), Some(BakeError::Config { .. })));
    }

    #[test]
    fn test_create_with_base_inside_project() {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path().join("project");
        sample_project(&project);
        let base = project.join("shadow");

        let first = ShadowWorkspace::create(&project, &base).unwrap();
        let second = ShadowWorkspace::create(&project, &base).unwrap();

        assert!(second.path().join("cmd/app/main.go").exists());
        assert!(!first.path().join("shadow").exists());
        assert!(!second.path().join("shadow").exists());

        first.close(false).unwrap();
        second.close(false).unwrap();
        assert_eq!(fs::read_dir(&base).unwrap().count(), 0);
    }
}
