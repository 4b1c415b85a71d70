//! Script linting and minification.
//!
//! Scripts are parsed with tree-sitter. Linting walks the syntax tree;
//! minification re-emits the leaf tokens with comments dropped and the
//! whitespace between tokens reduced to what keeps the program equivalent.

use std::{
    fs,
    path::{Path, PathBuf},
};

use kiln_core::{Diagnostic, RuleSet, Severity};
use tracing::{debug, info, warn};
use tree_sitter::{Node, Parser, Tree};

use crate::{
    output::{with_extension, write_output},
    sources::SourceSet,
    task::{IoContext, Result, Task, TaskContext, TaskError, TaskReport},
};

pub const RULE_SYNTAX: &str = "syntax";
pub const RULE_NO_DEBUGGER: &str = "no-debugger";
pub const RULE_NO_VAR: &str = "no-var";
pub const RULE_EQEQEQ: &str = "eqeqeq";
pub const RULE_NO_CONSOLE: &str = "no-console";

/// Node kinds emitted verbatim by the minifier.
const ATOMIC_KINDS: [&str; 3] = ["string", "template_string", "regex"];

/// Parse JavaScript source.
pub fn parse(source: &str) -> std::result::Result<Tree, String> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_javascript::LANGUAGE.into())
        .map_err(|e| e.to_string())?;
    parser
        .parse(source, None)
        .ok_or_else(|| "parser produced no tree".to_string())
}

/// Depth-first walk. `visit` returns whether to descend into the node.
fn walk<'t>(tree: &'t Tree, mut visit: impl FnMut(Node<'t>) -> bool) {
    let mut cursor = tree.walk();
    let mut descend = visit(cursor.node());
    loop {
        if descend && cursor.goto_first_child() {
            descend = visit(cursor.node());
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                descend = visit(cursor.node());
                break;
            }
            if !cursor.goto_parent() {
                return;
            }
        }
    }
}

fn text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    &source[node.byte_range()]
}

/// Lint a parsed script. Syntax errors are always errors; other rules take
/// their severity from `rules`.
#[must_use]
pub fn lint(file: &Path, source: &str, tree: &Tree, rules: &RuleSet) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let mut report = |node: Node<'_>, rule: &str, message: String, default: Severity| {
        let severity = if rule == RULE_SYNTAX {
            Severity::Error
        } else {
            rules.severity(rule, default)
        };
        if severity == Severity::Off {
            return;
        }
        let position = node.start_position();
        diagnostics.push(Diagnostic::new(
            file,
            position.row + 1,
            position.column + 1,
            rule,
            message,
            severity,
        ));
    };

    walk(tree, |node| {
        if node.is_error() {
            let snippet: String = text(node, source).chars().take(20).collect();
            report(
                node,
                RULE_SYNTAX,
                format!("unexpected token near '{}'", snippet.trim()),
                Severity::Error,
            );
            return false;
        }
        if node.is_missing() {
            report(
                node,
                RULE_SYNTAX,
                format!("missing '{}'", node.kind()),
                Severity::Error,
            );
            return false;
        }

        match node.kind() {
            "debugger_statement" => report(
                node,
                RULE_NO_DEBUGGER,
                "unexpected 'debugger' statement".to_string(),
                Severity::Error,
            ),
            "variable_declaration" => report(
                node,
                RULE_NO_VAR,
                "unexpected var, use let or const instead".to_string(),
                Severity::Warn,
            ),
            "binary_expression" => {
                if let Some(op) = node.child_by_field_name("operator") {
                    let op = op.kind();
                    if op == "==" || op == "!=" {
                        report(
                            node,
                            RULE_EQEQEQ,
                            format!("expected '{op}=' and instead saw '{op}'"),
                            Severity::Warn,
                        );
                    }
                }
            }
            "call_expression" => {
                let is_console = node
                    .child_by_field_name("function")
                    .filter(|f| f.kind() == "member_expression")
                    .and_then(|f| f.child_by_field_name("object"))
                    .is_some_and(|o| text(o, source) == "console");
                if is_console {
                    report(
                        node,
                        RULE_NO_CONSOLE,
                        "unexpected console statement".to_string(),
                        Severity::Warn,
                    );
                }
            }
            _ => {}
        }
        true
    });

    diagnostics
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || !c.is_ascii()
}

fn needs_space(last: char, next: char) -> bool {
    (is_word(last) && is_word(next))
        || (last == '+' && next == '+')
        || (last == '-' && next == '-')
        || (last.is_ascii_digit() && next == '.')
}

/// A line break between tokens can be dropped when the previous token cannot
/// end a statement or the next one cannot start one.
fn needs_newline(last: char, next: char) -> bool {
    !(";{(,[:".contains(last) || "})],;.".contains(next))
}

/// Minify a parsed script.
#[must_use]
pub fn minify(source: &str, tree: &Tree) -> String {
    let mut tokens = Vec::new();
    walk(tree, |node| {
        if node.kind() == "comment" {
            return false;
        }
        if node.child_count() == 0 || ATOMIC_KINDS.contains(&node.kind()) {
            if node.start_byte() < node.end_byte() {
                tokens.push(node.byte_range());
            }
            return false;
        }
        true
    });

    let mut out = String::with_capacity(source.len());
    let mut previous_end: Option<usize> = None;
    for range in tokens {
        let token = &source[range.clone()];
        if let (Some(end), Some(last), Some(next)) =
            (previous_end, out.chars().last(), token.chars().next())
        {
            let gap = &source[end..range.start];
            if gap.contains('\n') && needs_newline(last, next) {
                out.push('\n');
            } else if !gap.is_empty() && needs_space(last, next) {
                out.push(' ');
            }
        }
        out.push_str(token);
        previous_end = Some(range.end);
    }
    out
}

/// The `scripts` task.
#[derive(Debug)]
pub struct ScriptsTask {
    sources: SourceSet,
    dest: PathBuf,
    rules: RuleSet,
}

impl ScriptsTask {
    /// Create the task for `src_root/js/*.js`.
    pub fn new(src_root: impl Into<PathBuf>, build_root: &Path, rules: RuleSet) -> Self {
        Self {
            sources: SourceSet::new(src_root, &["js/*.js"]),
            dest: build_root.join("js"),
            rules,
        }
    }
}

impl Task for ScriptsTask {
    fn name(&self) -> &'static str {
        "scripts"
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.dest.clone()]
    }

    fn run(&self, _ctx: &TaskContext) -> Result<TaskReport> {
        let mut parsed = Vec::new();
        let mut diagnostics = Vec::new();

        for file in self.sources.files() {
            let source = fs::read_to_string(&file).at(&file)?;
            let tree = parse(&source).map_err(|m| TaskError::transform(&file, m))?;
            diagnostics.extend(lint(&file, &source, &tree, &self.rules));
            parsed.push((file, source, tree));
        }

        for diagnostic in &diagnostics {
            warn!("{diagnostic}");
        }
        TaskError::check_lint(&diagnostics)?;

        let mut report = TaskReport::new();
        for (file, source, tree) in &parsed {
            let name = file.file_name().map(Path::new).unwrap_or(file.as_path());
            let original = self.dest.join(with_extension(name, "js"));
            let minified = self.dest.join(with_extension(name, "min.js"));

            let min = minify(source, tree);
            write_output(&original, source)?;
            write_output(&minified, &min)?;

            debug!(
                src = %file.display(),
                bytes = source.len(),
                min_bytes = min.len(),
                "minified script"
            );
            report.wrote(original);
            report.wrote(minified);
        }

        report.warn(diagnostics);
        info!(count = parsed.len(), "scripts processed");
        Ok(report)
    }
}
