//! Source file sets described by glob patterns.
//!
//! Patterns are relative to a base directory and support `*`, `?`, `**` and
//! `{a,b}` alternatives. `*` never crosses a `/`.

use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern};
use tracing::warn;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A set of files under `base` selected by glob patterns.
#[derive(Debug, Clone)]
pub struct SourceSet {
    base: PathBuf,
    patterns: Vec<String>,
    compiled: Vec<Pattern>,
}

impl SourceSet {
    /// Create a source set. Invalid patterns are dropped with a warning.
    pub fn new(base: impl Into<PathBuf>, patterns: &[&str]) -> Self {
        let patterns: Vec<String> = patterns
            .iter()
            .flat_map(|p| expand_braces(p))
            .collect();
        let compiled = patterns
            .iter()
            .filter_map(|p| match Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "ignoring invalid glob pattern");
                    None
                }
            })
            .collect();

        Self {
            base: base.into(),
            patterns,
            compiled,
        }
    }

    /// Whether `path` (absolute or relative to the current directory) is
    /// selected by this set.
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.base) else {
            return false;
        };
        self.compiled
            .iter()
            .any(|pattern| pattern.matches_path_with(relative, MATCH_OPTIONS))
    }

    /// All regular files currently selected, sorted and deduplicated.
    #[must_use]
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self
            .patterns
            .iter()
            .flat_map(|pattern| self.files_for(pattern))
            .collect();
        files.sort();
        files.dedup();
        files
    }

    /// Files selected by one pattern, paired with their path relative to the
    /// pattern's literal prefix (the part before the first wildcard).
    #[must_use]
    pub fn files_with_relative(&self) -> Vec<(PathBuf, PathBuf)> {
        let mut pairs: Vec<(PathBuf, PathBuf)> = self
            .patterns
            .iter()
            .flat_map(|pattern| {
                let root = self.base.join(literal_prefix(pattern));
                self.files_for(pattern).into_iter().filter_map(move |file| {
                    let relative = file.strip_prefix(&root).ok()?.to_path_buf();
                    Some((file, relative))
                })
            })
            .collect();
        pairs.sort();
        pairs.dedup();
        pairs
    }

    fn files_for(&self, pattern: &str) -> Vec<PathBuf> {
        let full = self.base.join(pattern);
        let full = full.to_string_lossy();
        match glob::glob_with(&full, MATCH_OPTIONS) {
            Ok(paths) => paths
                .filter_map(|entry| entry.ok())
                .filter(|path| path.is_file() && !is_hidden(path))
                .collect(),
            Err(e) => {
                warn!(pattern = %full, error = %e, "ignoring invalid glob pattern");
                Vec::new()
            }
        }
    }
}

/// Expand `{a,b}` alternatives. Groups may appear several times but not nest.
#[must_use]
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };
    let Some(close) = pattern[open..].find('}').map(|i| open + i) else {
        return vec![pattern.to_string()];
    };

    let head = &pattern[..open];
    let tail = &pattern[close + 1..];
    pattern[open + 1..close]
        .split(',')
        .flat_map(|alt| expand_braces(&format!("{head}{alt}{tail}")))
        .collect()
}

/// Leading path components that contain no glob metacharacters.
#[must_use]
pub fn literal_prefix(pattern: &str) -> PathBuf {
    let mut prefix = PathBuf::new();
    let components: Vec<_> = Path::new(pattern).components().collect();
    // The last component is the file-name pattern even when it is literal.
    for component in components.iter().take(components.len().saturating_sub(1)) {
        let Component::Normal(part) = component else {
            continue;
        };
        let part = part.to_string_lossy();
        if part.contains(['*', '?', '[', '{']) {
            break;
        }
        prefix.push(part.as_ref());
    }
    prefix
}

/// Dotfiles are never selected.
fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with('.'))
}
