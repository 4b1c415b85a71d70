//! Build root management.

use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::task::{IoContext, Result, Task, TaskContext, TaskReport};

/// Recursively remove the build root. Succeeds when it does not exist.
pub fn clean(build_root: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(build_root) {
        Ok(()) => {
            debug!(dir = %build_root.display(), "removed build root");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Write `contents` to `path`, creating parent directories.
pub fn write_output(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).at(parent)?;
    }
    fs::write(path, contents).at(path)?;
    debug!(path = %path.display(), "wrote output");
    Ok(())
}

/// Swap the extension of `file_name` for `extension`, e.g. `main.scss` ->
/// `main.min.css`.
#[must_use]
pub fn with_extension(file_name: &Path, extension: &str) -> PathBuf {
    let stem = file_name.file_stem().unwrap_or_default().to_string_lossy();
    PathBuf::from(format!("{stem}.{extension}"))
}

/// The `clean` task.
#[derive(Debug)]
pub struct CleanTask {
    build_root: PathBuf,
}

impl CleanTask {
    /// Create a clean task for `build_root`.
    #[must_use]
    pub fn new(build_root: impl Into<PathBuf>) -> Self {
        Self {
            build_root: build_root.into(),
        }
    }
}

impl Task for CleanTask {
    fn name(&self) -> &'static str {
        "clean"
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.build_root.clone()]
    }

    fn run(&self, _ctx: &TaskContext) -> Result<TaskReport> {
        clean(&self.build_root).at(&self.build_root)?;
        Ok(TaskReport::new())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_clean_removes_tree() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("build");
        fs::create_dir_all(root.join("css/lib")).unwrap();
        fs::write(root.join("css/lib/reset.css"), "*{}").unwrap();

        clean(&root).unwrap();
        assert!(!root.exists());
    }

    #[test]
    fn test_clean_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("build");
        fs::create_dir_all(&root).unwrap();

        let task = CleanTask::new(&root);
        let ctx = TaskContext::default();
        task.run(&ctx).unwrap();
        assert!(!root.exists());
        task.run(&ctx).unwrap();
        assert!(!root.exists());
    }

    #[test]
    fn test_write_output_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("build/js/app.min.js");
        write_output(&path, "x").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "x");
    }

    #[test]
    fn test_with_extension() {
        assert_eq!(
            with_extension(Path::new("main.scss"), "min.css"),
            PathBuf::from("main.min.css")
        );
        assert_eq!(
            with_extension(Path::new("icons.ttf"), "woff2"),
            PathBuf::from("icons.woff2")
        );
    }
}
