//! Build mode passed explicitly to every task invocation.

use std::fmt;

/// How the pipeline is being driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BuildMode {
    /// One-shot production build (`kiln build`).
    #[default]
    Build,

    /// Development session with the dev server and watchers (`kiln start`).
    Develop,
}

impl BuildMode {
    /// Whether the live reload client is injected.
    #[must_use]
    pub fn is_develop(self) -> bool {
        matches!(self, Self::Develop)
    }

    /// Stable lowercase name, also exposed to templates as `mode`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Develop => "develop",
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
