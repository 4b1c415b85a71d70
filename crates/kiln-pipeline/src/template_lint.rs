//! Template linting.
//!
//! Works line by line on the source so that problems are reported even when
//! the template would not compile.

use std::{collections::HashSet, path::Path};

use kiln_core::{Diagnostic, RuleSet, Severity};

use crate::template::{ElementLine, parse_element_line};

pub const RULE_INDENTATION: &str = "validate-indentation";
pub const RULE_TRAILING_SPACES: &str = "disallow-trailing-spaces";
pub const RULE_LOWER_CASE_TAGS: &str = "require-lower-case-tags";
pub const RULE_DUPLICATE_ATTRIBUTES: &str = "disallow-duplicate-attributes";
pub const RULE_SYNTAX: &str = "syntax";

struct Linter<'a> {
    file: &'a Path,
    rules: &'a RuleSet,
    diagnostics: Vec<Diagnostic>,
}

impl Linter<'_> {
    fn report(&mut self, line: usize, column: usize, rule: &str, message: impl Into<String>) {
        let severity = self.rules.severity(rule, Severity::Error);
        if severity == Severity::Off {
            return;
        }
        self.diagnostics.push(Diagnostic::new(
            self.file, line, column, rule, message, severity,
        ));
    }

    fn check_element(&mut self, line: usize, column: usize, element: &ElementLine) {
        if element.explicit_tag && element.tag != element.tag.to_ascii_lowercase() {
            self.report(
                line,
                column,
                RULE_LOWER_CASE_TAGS,
                format!("tag '{}' must be lower case", element.tag),
            );
        }

        let mut seen = HashSet::new();
        if element.id.is_some() {
            seen.insert("id".to_string());
        }
        for attr in &element.attrs {
            if !seen.insert(attr.name.to_ascii_lowercase()) {
                self.report(
                    line,
                    column,
                    RULE_DUPLICATE_ATTRIBUTES,
                    format!("duplicate attribute '{}'", attr.name),
                );
            }
        }
    }
}

/// Lint one template source. Rule severities come from `rules`; rules not
/// listed there are errors.
#[must_use]
pub fn lint_source(file: &Path, source: &str, rules: &RuleSet) -> Vec<Diagnostic> {
    let mut linter = Linter {
        file,
        rules,
        diagnostics: Vec::new(),
    };

    let mut unit: Option<usize> = None;
    let mut previous_indent = 0;
    // Indent of the line that opened a raw block (comment or block text).
    let mut raw_block: Option<usize> = None;

    for (idx, raw) in source.lines().enumerate() {
        let number = idx + 1;

        let trimmed = raw.trim_end();
        if trimmed.len() != raw.len() {
            linter.report(
                number,
                trimmed.chars().count() + 1,
                RULE_TRAILING_SPACES,
                "trailing whitespace",
            );
        }
        if trimmed.trim_start().is_empty() {
            continue;
        }

        let leading = &raw[..raw.len() - raw.trim_start().len()];
        let indent = leading.len();
        if let Some(block) = raw_block {
            if indent > block {
                continue;
            }
            raw_block = None;
        }

        if leading.contains('\t') {
            linter.report(
                number,
                1,
                RULE_INDENTATION,
                "indentation must use spaces, not tabs",
            );
        } else if leading.contains(|c: char| c != ' ') {
            linter.report(
                number,
                1,
                RULE_INDENTATION,
                "indentation must use ASCII spaces",
            );
        } else if indent > 0 {
            let unit = *unit.get_or_insert(indent);
            if indent % unit != 0 {
                linter.report(
                    number,
                    1,
                    RULE_INDENTATION,
                    format!("indentation of {indent} is not a multiple of {unit}"),
                );
            } else if indent > previous_indent + unit {
                linter.report(
                    number,
                    1,
                    RULE_INDENTATION,
                    "indentation increased by more than one level",
                );
            }
        }
        previous_indent = indent;

        let text = raw.trim();
        if text.starts_with("//") {
            raw_block = Some(indent);
            continue;
        }
        if text.starts_with('|')
            || text.starts_with('<')
            || text == "doctype"
            || text.starts_with("doctype ")
            || text.starts_with("include ")
        {
            continue;
        }

        let column = indent + 1;
        let mut current = Some(text.to_string());
        while let Some(line) = current.take() {
            match parse_element_line(&line) {
                Ok(element) => {
                    linter.check_element(number, column, &element);
                    if element.block_text {
                        raw_block = Some(indent);
                    }
                    current = element.expansion;
                }
                Err(message) => linter.report(number, column, RULE_SYNTAX, message),
            }
        }
    }

    linter.diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules_of(diags: &[Diagnostic]) -> Vec<&str> {
        diags.iter().map(|d| d.rule.as_str()).collect()
    }

    fn lint(source: &str) -> Vec<Diagnostic> {
        lint_source(Path::new("page.pug"), source, &RuleSet::new())
    }

    #[test]
    fn test_clean_template() {
        let source = "doctype html\nhtml\n  body\n    h1.title Hello\n    p\n      | text\n";
        assert!(lint(source).is_empty());
    }

    #[test]
    fn test_trailing_spaces() {
        let diags = lint("div\n  p hi  \n");
        assert_eq!(rules_of(&diags), vec![RULE_TRAILING_SPACES]);
        assert_eq!(diags[0].line, 2);
        assert_eq!(diags[0].column, 7);
        assert!(diags[0].is_error());
    }

    #[test]
    fn test_unicode_space_indentation() {
        let diags = lint("div\n  p a\n \u{3000}p b\n");
        assert_eq!(rules_of(&diags), vec![RULE_INDENTATION]);
        assert_eq!(diags[0].line, 3);
    }

    #[test]
    fn test_indentation_rules() {
        let diags = lint("div\n  p a\n   p b\n\tp c\nul\n  li\n      a x\n");
        assert_eq!(
            rules_of(&diags),
            vec![RULE_INDENTATION, RULE_INDENTATION, RULE_INDENTATION]
        );
        assert_eq!(
            diags.iter().map(|d| d.line).collect::<Vec<_>>(),
            vec![3, 4, 7]
        );
    }

    #[test]
    fn test_upper_case_tag() {
        let diags = lint("DIV.box\n");
        assert_eq!(rules_of(&diags), vec![RULE_LOWER_CASE_TAGS]);
    }

    #[test]
    fn test_duplicate_attributes() {
        let diags = lint("a(href=\"/a\" href=\"/b\")\ndiv#main(id=\"other\")\n");
        assert_eq!(
            rules_of(&diags),
            vec![RULE_DUPLICATE_ATTRIBUTES, RULE_DUPLICATE_ATTRIBUTES]
        );
    }

    #[test]
    fn test_expansion_is_checked() {
        let diags = lint("li: A(href=\"/\") x\n");
        assert_eq!(rules_of(&diags), vec![RULE_LOWER_CASE_TAGS]);
    }

    #[test]
    fn test_raw_blocks_are_skipped() {
        let source = "script.\n  var A = 1;   \n     odd();\n//\n   NOT A TAG\np ok\n";
        let diags = lint(source);
        assert_eq!(rules_of(&diags), vec![RULE_TRAILING_SPACES]);
    }

    #[test]
    fn test_syntax_error() {
        let diags = lint("p= name\n");
        assert_eq!(rules_of(&diags), vec![RULE_SYNTAX]);
    }

    #[test]
    fn test_rule_severity_overrides() {
        let rules = RuleSet::new()
            .with(RULE_TRAILING_SPACES, Severity::Off)
            .with(RULE_LOWER_CASE_TAGS, Severity::Warn);
        let diags = lint_source(Path::new("page.pug"), "P hi \n", &rules);
        assert_eq!(rules_of(&diags), vec![RULE_LOWER_CASE_TAGS]);
        assert_eq!(diags[0].severity, Severity::Warn);
    }
}
