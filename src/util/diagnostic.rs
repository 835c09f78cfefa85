//! Diagnostics printed for failed pairs and recipes.
//!
//! ```text
//! error: entrance error
//!   at /srv/app/RECIPE.toml
//!   | the builder found no Go files at the entrance
//!   = help: Check `entrance` in RECIPE.toml
//! ```

use std::path::PathBuf;

/// Suggestions shared by several conditions.
pub mod suggestions {
    pub const NO_RECIPE: &str = "Create a RECIPE.toml or pass `--recipe <path>`";

    pub const BUILD_FAILED: &str = "Run `bake --verbose build` for more details";

    pub const DEV_MODE: &str = "Remove the retained directory once inspected";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    fn label(self, color: bool) -> &'static str {
        match (self, color) {
            (Severity::Error, false) => "error",
            (Severity::Warning, false) => "warning",
            (Severity::Error, true) => "\x1b[1;31merror\x1b[0m",
            (Severity::Warning, true) => "\x1b[1;33mwarning\x1b[0m",
        }
    }
}

/// A short reason plus the detail needed to act on it.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    pub severity: Severity,
    pub context: Vec<String>,
    pub suggestions: Vec<String>,
    pub location: Option<PathBuf>,
}

impl Diagnostic {
    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity,
            context: Vec::new(),
            suggestions: Vec::new(),
            location: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    /// Attach detail, e.g. the builder's own output. Multi-line text is
    /// kept line by line.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let context = context.into();
        self.context
            .extend(context.lines().filter(|l| !l.trim().is_empty()).map(str::to_string));
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(path.into());
        self
    }

    /// Render for a terminal; `color` adds ANSI styling to the severity.
    pub fn format(&self, color: bool) -> String {
        let mut lines = vec![format!("{}: {}", self.severity.label(color), self.message)];
        lines.extend(self.location.iter().map(|p| format!("  at {}", p.display())));
        lines.extend(self.context.iter().map(|c| format!("  | {}", c)));
        lines.extend(self.suggestions.iter().map(|s| format!("  = help: {}", s)));

        let mut output = lines.join("\n");
        output.push('\n');
        output
    }
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, color: bool) {
    eprint!("{}", diagnostic.format(color));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let diag = Diagnostic::error("could not reach docker target")
            .with_context("connection refused\n\n(tcp://10.0.0.2:2375)")
            .with_suggestion("Check the `docker` table of this pair")
            .with_suggestion("Use host = \"local\" for the local engine");

        assert_eq!(
            diag.format(false),
            "error: could not reach docker target\n\
             \x20 | connection refused\n\
             \x20 | (tcp://10.0.0.2:2375)\n\
             \x20 = help: Check the `docker` table of this pair\n\
             \x20 = help: Use host = \"local\" for the local engine\n"
        );
    }

    #[test]
    fn test_warning_with_location() {
        let diag = Diagnostic::warning("shadow workspace retained").with_location("/tmp/BAKE_TMP/abc");
        assert_eq!(
            diag.format(false),
            "warning: shadow workspace retained\n  at /tmp/BAKE_TMP/abc\n"
        );
    }

    #[test]
    fn test_color_only_styles_severity() {
        let output = Diagnostic::error("build failed").format(true);
        assert!(output.starts_with("\x1b[1;31merror\x1b[0m: build failed"));
    }
}
