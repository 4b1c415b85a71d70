//! The task contract.
//!
//! A task is a named transform over a set of source files. Its configuration
//! is captured when it is declared; the only per-run input is the
//! [`TaskContext`].

use std::path::{Path, PathBuf};

use kiln_core::{BuildMode, Diagnostic};
use thiserror::Error;

/// Task failures.
#[derive(Debug, Error)]
pub enum TaskError {
    /// A lint gate found error-severity diagnostics.
    #[error("lint failed with {} error(s): {}", error_count(.diagnostics), first_error(.diagnostics))]
    Lint { diagnostics: Vec<Diagnostic> },

    /// A compiler or optimizer rejected its input.
    #[error("failed to transform {}: {message}", .path.display())]
    Transform { path: PathBuf, message: String },

    /// Reading a source or writing an output failed.
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn error_count(diagnostics: &[Diagnostic]) -> usize {
    diagnostics.iter().filter(|d| d.is_error()).count()
}

fn first_error(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .find(|d| d.is_error())
        .map(ToString::to_string)
        .unwrap_or_default()
}

impl TaskError {
    /// Create a transform error for `path`.
    pub fn transform(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Transform {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an IO error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Fail with `diagnostics` if any of them is an error.
    pub fn check_lint(diagnostics: &[Diagnostic]) -> Result<()> {
        if diagnostics.iter().any(Diagnostic::is_error) {
            return Err(Self::Lint {
                diagnostics: diagnostics.to_vec(),
            });
        }
        Ok(())
    }
}

/// Result type for task operations.
pub type Result<T> = std::result::Result<T, TaskError>;

/// Attach the offending path to IO results.
pub trait IoContext<T> {
    /// Map an IO error into [`TaskError::Io`] for `path`.
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|e| TaskError::io(path, e))
    }
}

/// Per-run input handed to every task.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskContext {
    /// One-shot build or development session.
    pub mode: BuildMode,
}

impl TaskContext {
    /// Create a context for `mode`.
    #[must_use]
    pub fn new(mode: BuildMode) -> Self {
        Self { mode }
    }
}

/// What a successful task run produced.
#[derive(Debug, Clone, Default)]
pub struct TaskReport {
    /// Files written under the build root.
    pub written: Vec<PathBuf>,

    /// Non-fatal diagnostics.
    pub warnings: Vec<Diagnostic>,

    /// Results served from a cache.
    pub cache_hits: usize,

    /// Results computed and stored in a cache.
    pub cache_misses: usize,
}

impl TaskReport {
    /// Empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a written file.
    pub fn wrote(&mut self, path: impl Into<PathBuf>) {
        self.written.push(path.into());
    }

    /// Record warnings.
    pub fn warn(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.warnings.extend(diagnostics);
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: TaskReport) {
        self.written.extend(other.written);
        self.warnings.extend(other.warnings);
        self.cache_hits += other.cache_hits;
        self.cache_misses += other.cache_misses;
    }
}

/// A named build step.
pub trait Task: Send + Sync {
    /// Unique task name, used in logs, dependencies and watch bindings.
    fn name(&self) -> &'static str;

    /// Paths this task writes (files or directories). Every entry must lie
    /// under the build root.
    fn outputs(&self) -> Vec<PathBuf>;

    /// Execute the task.
    fn run(&self, ctx: &TaskContext) -> Result<TaskReport>;
}

#[cfg(test)]
mod tests {
    use kiln_core::Severity;

    use super::*;

    #[test]
    fn test_check_lint_passes_warnings() {
        let warnings = vec![Diagnostic::new(
            "a.js",
            1,
            1,
            "no-console",
            "unexpected console",
            Severity::Warn,
        )];
        assert!(TaskError::check_lint(&warnings).is_ok());
    }

    #[test]
    fn test_check_lint_fails_on_error() {
        let diagnostics = vec![
            Diagnostic::new("a.js", 1, 1, "no-var", "unexpected var", Severity::Warn),
            Diagnostic::new("a.js", 2, 3, "no-debugger", "debugger", Severity::Error),
        ];
        let err = TaskError::check_lint(&diagnostics).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("1 error(s)"));
        assert!(message.contains("a.js:2:3"));
    }

    #[test]
    fn test_io_context_names_path() {
        let err = std::fs::read("/nonexistent/kiln/file")
            .at(Path::new("/nonexistent/kiln/file"))
            .unwrap_err();
        assert!(matches!(err, TaskError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/kiln/file"));
    }

    #[test]
    fn test_report_merge() {
        let mut a = TaskReport::new();
        a.wrote("build/a.css");
        a.cache_hits = 1;
        let mut b = TaskReport::new();
        b.wrote("build/b.css");
        b.cache_misses = 2;
        a.merge(b);
        assert_eq!(a.written.len(), 2);
        assert_eq!(a.cache_hits, 1);
        assert_eq!(a.cache_misses, 2);
    }
}
