//! Compiled replace rules.

use std::collections::BTreeMap;
use std::path::Path;

use glob::Pattern;
use regex::Regex;

use crate::core::errors::BakeError;
use crate::core::options::ReplaceOptions;

/// The set of files a text substitution may touch.
///
/// A file is in scope when it lies under a directory matching one of the
/// directory rules (if any are given) and its file name matches one of the
/// file regexps (if any are given).
#[derive(Debug, Clone)]
pub struct ReplaceScope {
    dir_rules: Vec<Pattern>,
    file_regexps: Vec<Regex>,
}

impl ReplaceScope {
    /// Compile the scope, failing on the first invalid pattern.
    pub fn compile(dir_rules: &[String], file_regexps: &[String]) -> Result<Self, BakeError> {
        let dir_rules = dir_rules
            .iter()
            .map(|rule| {
                let rule = rule.trim_start_matches("./").trim_end_matches('/');
                Pattern::new(rule).map_err(|e| {
                    BakeError::config(format!("invalid dir rule `{}`: {}", rule, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let file_regexps = file_regexps
            .iter()
            .map(|re| {
                Regex::new(re)
                    .map_err(|e| BakeError::config(format!("invalid file regexp `{}`: {}", re, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ReplaceScope {
            dir_rules,
            file_regexps,
        })
    }

    /// Check a file path relative to the workspace root.
    pub fn matches(&self, relative: &Path) -> bool {
        self.matches_dir(relative) && self.matches_name(relative)
    }

    fn matches_dir(&self, relative: &Path) -> bool {
        if self.dir_rules.is_empty() {
            return true;
        }
        relative
            .ancestors()
            .skip(1)
            .filter(|dir| !dir.as_os_str().is_empty())
            .any(|dir| self.dir_rules.iter().any(|rule| rule.matches_path(dir)))
    }

    fn matches_name(&self, relative: &Path) -> bool {
        if self.file_regexps.is_empty() {
            return true;
        }
        let name = match relative.file_name() {
            Some(name) => name.to_string_lossy(),
            None => return false,
        };
        self.file_regexps.iter().any(|re| re.is_match(&name))
    }
}

/// Dependency renames, text replacements and their optional scope.
#[derive(Debug, Clone, Default)]
pub struct ReplaceRule {
    /// `vendor/<old>` is renamed to `vendor/<new>`
    pub dependency: BTreeMap<String, String>,

    /// Literal byte-sequence replacements
    pub words: BTreeMap<String, String>,

    /// `None` means the whole workspace
    pub scope: Option<ReplaceScope>,
}

impl ReplaceRule {
    /// Compile replace options into a rule.
    pub fn parse(options: &ReplaceOptions) -> Result<Self, BakeError> {
        let scope = if options.dir_rules.is_empty() && options.file_regexps.is_empty() {
            None
        } else {
            Some(ReplaceScope::compile(
                &options.dir_rules,
                &options.file_regexps,
            )?)
        };

        Ok(ReplaceRule {
            dependency: options.dependency.clone(),
            words: options.text.clone(),
            scope,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_scope_without_rules() {
        let mut options = ReplaceOptions::default();
        options.text.insert("X".to_string(), "Y".to_string());

        let rule = ReplaceRule::parse(&options).unwrap();
        assert!(rule.scope.is_none());
        assert_eq!(rule.words["X"], "Y");
    }

    #[test]
    fn test_invalid_regexp_is_config_error() {
        let options = ReplaceOptions {
            file_regexps: vec!["(unclosed".to_string()],
            ..Default::default()
        };

        let err = ReplaceRule::parse(&options).unwrap_err();
        assert!(matches!(err, BakeError::Config { .. }));
    }

    #[test]
    fn test_scope_dir_and_name() {
        let scope =
            ReplaceScope::compile(&["./internal/".to_string()], &[r"\.go$".to_string()]).unwrap();

        assert!(scope.matches(Path::new("internal/config/config.go")));
        assert!(scope.matches(Path::new("internal/main.go")));
        assert!(!scope.matches(Path::new("internal/README.md")));
        assert!(!scope.matches(Path::new("cmd/app/main.go")));
        assert!(!scope.matches(Path::new("main.go")));
    }

    #[test]
    fn test_scope_glob_dir_rule() {
        let scope = ReplaceScope::compile(&["cmd/*".to_string()], &[]).unwrap();

        assert!(scope.matches(Path::new("cmd/app/main.go")));
        assert!(scope.matches(Path::new("cmd/app/assets/logo.txt")));
        assert!(!scope.matches(Path::new("cmd/root.go")));
    }

    #[test]
    fn test_scope_regexps_only() {
        let scope = ReplaceScope::compile(&[], &["^version".to_string()]).unwrap();

        assert!(scope.matches(Path::new("version.go")));
        assert!(scope.matches(Path::new("pkg/version_info.txt")));
        assert!(!scope.matches(Path::new("pkg/main.go")));
    }
}
