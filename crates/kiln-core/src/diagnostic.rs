//! Lint and validation diagnostics.
//!
//! Linters report [`Diagnostic`]s; the [`Severity`] decides whether a
//! diagnostic is a warning that lets the owning task succeed or an error that
//! fails it.

use std::{collections::BTreeMap, fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

/// Severity of a lint rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Rule disabled.
    Off,
    /// Reported, task still succeeds.
    Warn,
    /// Reported, task fails.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Off => "off",
            Self::Warn => "warning",
            Self::Error => "error",
        })
    }
}

/// A single finding located in a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// File the finding belongs to.
    pub file: PathBuf,
    /// 1-based line, 0 when unknown.
    pub line: usize,
    /// 1-based column, 0 when unknown.
    pub column: usize,
    /// Rule identifier, e.g. `no-debugger`.
    pub rule: String,
    /// Human readable message.
    pub message: String,
    /// Effective severity.
    pub severity: Severity,
}

impl Diagnostic {
    /// Create a diagnostic.
    pub fn new(
        file: impl Into<PathBuf>,
        line: usize,
        column: usize,
        rule: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            file: file.into(),
            line,
            column,
            rule: rule.into(),
            message: message.into(),
            severity,
        }
    }

    /// Whether this diagnostic fails its task.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file.display())?;
        if self.line > 0 {
            write!(f, ":{}", self.line)?;
            if self.column > 0 {
                write!(f, ":{}", self.column)?;
            }
        }
        write!(f, " {} {} ({})", self.severity, self.message, self.rule)
    }
}

/// Per-rule severity overrides, keyed by rule name.
///
/// ```toml
/// [lint.scripts]
/// no-console = "off"
/// eqeqeq = "error"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet(BTreeMap<String, Severity>);

impl RuleSet {
    /// Empty rule set: every rule keeps its default severity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the severity of a rule.
    #[must_use]
    pub fn with(mut self, rule: impl Into<String>, severity: Severity) -> Self {
        self.0.insert(rule.into(), severity);
        self
    }

    /// Effective severity of `rule`, falling back to `default`.
    #[must_use]
    pub fn severity(&self, rule: &str, default: Severity) -> Severity {
        self.0.get(rule).copied().unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic::new(
            "src/js/app.js",
            3,
            5,
            "no-debugger",
            "unexpected debugger statement",
            Severity::Error,
        );
        assert_eq!(
            diag.to_string(),
            "src/js/app.js:3:5 error unexpected debugger statement (no-debugger)"
        );
        assert!(diag.is_error());
    }

    #[test]
    fn test_diagnostic_display_without_location() {
        let diag = Diagnostic::new("a.pug", 0, 0, "bem", "orphan element", Severity::Warn);
        assert_eq!(diag.to_string(), "a.pug warning orphan element (bem)");
        assert!(!diag.is_error());
    }

    #[test]
    fn test_rule_set_overrides() {
        let rules = RuleSet::new().with("no-console", Severity::Off);
        assert_eq!(rules.severity("no-console", Severity::Warn), Severity::Off);
        assert_eq!(rules.severity("eqeqeq", Severity::Warn), Severity::Warn);
    }

    #[test]
    fn test_rule_set_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            rules: RuleSet,
        }

        let parsed: Wrapper = toml::from_str(
            r#"
[rules]
no-var = "error"
eqeqeq = "off"
"#,
        )
        .unwrap();
        assert_eq!(parsed.rules.severity("no-var", Severity::Warn), Severity::Error);
        assert_eq!(parsed.rules.severity("eqeqeq", Severity::Warn), Severity::Off);
    }
}
