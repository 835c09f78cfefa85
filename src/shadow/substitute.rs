//! In-place text substitution over a shadow workspace.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::core::replace::ReplaceScope;

/// Outcome of a substitution sweep.
#[derive(Debug, Default)]
pub struct SubstituteReport {
    /// Files whose contents changed
    pub rewritten: Vec<PathBuf>,

    /// Files that could not be read or written, with the reason
    pub failures: Vec<(PathBuf, String)>,
}

/// Replace every occurrence of `from` with `to` in `haystack`.
pub fn replace_bytes(haystack: &[u8], from: &[u8], to: &[u8]) -> Option<Vec<u8>> {
    if from.is_empty() || haystack.len() < from.len() {
        return None;
    }

    let mut out = Vec::with_capacity(haystack.len());
    let mut i = 0;
    let mut changed = false;
    while i < haystack.len() {
        if haystack[i..].starts_with(from) {
            out.extend_from_slice(to);
            i += from.len();
            changed = true;
        } else {
            out.push(haystack[i]);
            i += 1;
        }
    }

    changed.then_some(out)
}

/// Rewrite files under `root`.
///
/// Words are applied in key order. Individual file failures are recorded
/// and the sweep continues.
pub fn substitute(
    root: &Path,
    words: &BTreeMap<String, String>,
    scope: Option<&ReplaceScope>,
) -> SubstituteReport {
    let mut report = SubstituteReport::default();
    if words.is_empty() {
        return report;
    }

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                report.failures.push((path, e.to_string()));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if let Some(scope) = scope {
            let rel = path.strip_prefix(root).unwrap_or(path);
            if !scope.matches(rel) {
                continue;
            }
        }

        let mut content = match fs::read(path) {
            Ok(content) => content,
            Err(e) => {
                report.failures.push((path.to_path_buf(), e.to_string()));
                continue;
            }
        };

        let mut changed = false;
        for (from, to) in words {
            if let Some(next) = replace_bytes(&content, from.as_bytes(), to.as_bytes()) {
                content = next;
                changed = true;
            }
        }
        if !changed {
            continue;
        }

        match fs::write(path, &content) {
            Ok(()) => report.rewritten.push(path.to_path_buf()),
            Err(e) => report.failures.push((path.to_path_buf(), e.to_string())),
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn words(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_replace_bytes() {
        assert_eq!(replace_bytes(b"a-X-X", b"X", b"YY"), Some(b"a-YY-YY".to_vec()));
        assert_eq!(replace_bytes(b"abc", b"z", b"y"), None);
        assert_eq!(replace_bytes(b"abc", b"", b"y"), None);
        assert_eq!(replace_bytes(&[0xff, 0x00, 0xfe], &[0x00], &[0x01, 0x02]), Some(vec![0xff, 0x01, 0x02, 0xfe]));
    }

    #[test]
    fn test_substitute_whole_tree() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("pkg")).unwrap();
        fs::write(tmp.path().join("main.go"), "const Name = \"X\"\n").unwrap();
        fs::write(tmp.path().join("pkg/util.go"), "// X marks\n").unwrap();
        fs::write(tmp.path().join("README.md"), "nothing here\n").unwrap();

        let report = substitute(tmp.path(), &words(&[("X", "Y")]), None);

        assert_eq!(report.rewritten.len(), 2);
        assert!(report.failures.is_empty());
        assert_eq!(
            fs::read_to_string(tmp.path().join("main.go")).unwrap(),
            "const Name = \"Y\"\n"
        );
        assert_eq!(fs::read_to_string(tmp.path().join("pkg/util.go")).unwrap(), "// Y marks\n");
    }

    #[test]
    fn test_substitute_respects_scope() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("internal")).unwrap();
        fs::create_dir_all(tmp.path().join("cmd")).unwrap();
        fs::write(tmp.path().join("internal/a.go"), "X").unwrap();
        fs::write(tmp.path().join("internal/a.txt"), "X").unwrap();
        fs::write(tmp.path().join("cmd/b.go"), "X").unwrap();

        let scope = ReplaceScope::compile(&["internal".to_string()], &[r"\.go$".to_string()]).unwrap();
        let report = substitute(tmp.path(), &words(&[("X", "Y")]), Some(&scope));

        assert_eq!(report.rewritten, vec![tmp.path().join("internal/a.go")]);
        assert_eq!(fs::read_to_string(tmp.path().join("internal/a.go")).unwrap(), "Y");
        assert_eq!(fs::read_to_string(tmp.path().join("internal/a.txt")).unwrap(), "X");
        assert_eq!(fs::read_to_string(tmp.path().join("cmd/b.go")).unwrap(), "X");
    }

    #[cfg(unix)]
    #[test]
    fn test_substitute_continues_past_failures() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let locked = tmp.path().join("a.go");
        fs::write(&locked, "X").unwrap();
        fs::write(tmp.path().join("b.go"), "X").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let report = substitute(tmp.path(), &words(&[("X", "Y")]), None);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

        assert_eq!(fs::read_to_string(tmp.path().join("b.go")).unwrap(), "Y");
        // Root can read anything, so the locked file may have been rewritten too.
        assert_eq!(report.rewritten.len() + report.failures.len(), 2);
    }
}
