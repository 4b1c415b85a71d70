//! Pass-through copying of vendored and static files.

use std::{fs, path::PathBuf};

use tracing::{debug, info};

use crate::{
    sources::SourceSet,
    task::{IoContext, Result, Task, TaskContext, TaskReport},
};

/// One copy rule: files selected by `sources` land under `dest`, keeping
/// their path relative to the pattern's literal prefix.
#[derive(Debug, Clone)]
pub struct CopyRule {
    sources: SourceSet,
    dest: PathBuf,
}

impl CopyRule {
    /// Create a rule copying `pattern` (relative to `src_root`) into `dest`.
    pub fn new(src_root: impl Into<PathBuf>, pattern: &str, dest: impl Into<PathBuf>) -> Self {
        Self {
            sources: SourceSet::new(src_root, &[pattern]),
            dest: dest.into(),
        }
    }
}

/// The `copy` task.
#[derive(Debug)]
pub struct CopyTask {
    rules: Vec<CopyRule>,
}

impl CopyTask {
    /// Create a copy task from explicit rules.
    #[must_use]
    pub fn new(rules: Vec<CopyRule>) -> Self {
        Self { rules }
    }

    /// Standard rules: vendored stylesheets, vendored scripts and static files.
    #[must_use]
    pub fn standard(src_root: impl Into<PathBuf>, build_root: impl Into<PathBuf>) -> Self {
        let src_root = src_root.into();
        let build_root = build_root.into();
        Self::new(vec![
            CopyRule::new(&src_root, "css/lib/*.css", build_root.join("css/lib")),
            CopyRule::new(&src_root, "js/lib/*.js", build_root.join("js/lib")),
            CopyRule::new(&src_root, "files/**/*", build_root.join("files")),
        ])
    }
}

impl Task for CopyTask {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn outputs(&self) -> Vec<PathBuf> {
        self.rules.iter().map(|rule| rule.dest.clone()).collect()
    }

    fn run(&self, _ctx: &TaskContext) -> Result<TaskReport> {
        let mut report = TaskReport::new();

        for rule in &self.rules {
            for (source, relative) in rule.sources.files_with_relative() {
                let dest = rule.dest.join(&relative);
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).at(parent)?;
                }
                fs::copy(&source, &dest).at(&source)?;

                debug!(
                    src = %source.display(),
                    dest = %dest.display(),
                    "copied file"
                );
                report.wrote(dest);
            }
        }

        info!(count = report.written.len(), "files copied");
        Ok(report)
    }
}
