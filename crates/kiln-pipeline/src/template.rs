//! Indentation-based page templates.
//!
//! A small template language in the style of pug, compiled to pretty-printed
//! HTML without pulling in a template engine. Supported syntax:
//!
//! - `doctype html`
//! - elements: `tag#id.class.other(attr="value", flag) inline text`, where a
//!   leading `.class` or `#id` implies `div`
//! - block expansion: `li: a(href="/") Home`
//! - block text: `script.` followed by indented raw lines
//! - piped text `| text` and literal HTML lines starting with `<`
//! - comments: `// shown` and `//- hidden`
//! - `include path` relative to the including file (`.pug` implied)
//! - interpolation: `#{name}` (escaped), `!{name}` (raw), `#{name?}`
//!   (empty when missing)

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use thiserror::Error;

/// Template errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Malformed template line.
    #[error("{}:{line}: {message}", .file.display())]
    Syntax {
        file: PathBuf,
        line: usize,
        message: String,
    },

    /// Missing required variable.
    #[error("{}:{line}: missing required variable: {name}", .file.display())]
    MissingVariable {
        file: PathBuf,
        line: usize,
        name: String,
    },

    /// A template includes itself, directly or indirectly.
    #[error("{}: include cycle", .file.display())]
    IncludeCycle { file: PathBuf },

    /// A template or included file could not be read.
    #[error("cannot read {}: {source}", .file.display())]
    Io {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for template operations.
pub type Result<T> = std::result::Result<T, TemplateError>;

/// Template context with variables for interpolation.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    variables: HashMap<String, String>,
}

impl TemplateContext {
    /// Create a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a variable into the context.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    /// Create context with initial variables.
    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Get a variable value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }
}

/// An attribute from an attribute list. `None` marks a boolean attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub name: String,
    pub value: Option<String>,
}

/// The syntactic parts of one element line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementLine {
    pub tag: String,
    /// False when the tag was implied by a `.class` or `#id` shorthand.
    pub explicit_tag: bool,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attrs: Vec<Attr>,
    /// Line ends with `.`: indented lines below are raw text.
    pub block_text: bool,
    /// Line ends with `/`.
    pub self_closing: bool,
    /// Nested element after `: `.
    pub expansion: Option<String>,
    /// Inline text after the tag.
    pub text: Option<String>,
}

/// A parsed template node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Doctype(String),
    Comment(String),
    Text(String),
    Element(Element),
}

/// A parsed element with its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attrs: Vec<Attr>,
    pub self_closing: bool,
    pub text: Option<String>,
    pub raw: Vec<String>,
    pub children: Vec<Node>,
    pub file: Arc<Path>,
    pub line: usize,
}

impl Element {
    /// Shorthand classes followed by the words of any `class` attributes.
    #[must_use]
    pub fn all_classes(&self) -> Vec<String> {
        let mut classes = self.classes.clone();
        for attr in self.attrs.iter().filter(|a| a.name == "class") {
            if let Some(value) = &attr.value {
                classes.extend(value.split_whitespace().map(str::to_string));
            }
        }
        classes
    }

    fn open_tag(&self) -> String {
        let mut tag = format!("<{}", self.tag);
        if let Some(id) = &self.id {
            tag.push_str(&format!(r#" id="{}""#, escape_attr(id)));
        }
        let classes = self.all_classes();
        if !classes.is_empty() {
            tag.push_str(&format!(r#" class="{}""#, escape_attr(&classes.join(" "))));
        }
        for attr in self.attrs.iter().filter(|a| a.name != "class") {
            match &attr.value {
                Some(value) => tag.push_str(&format!(r#" {}="{}""#, attr.name, escape_attr(value))),
                None => tag.push_str(&format!(" {}", attr.name)),
            }
        }
        tag.push('>');
        tag
    }
}

const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn scan_name(chars: &[char], start: usize) -> usize {
    let mut end = start;
    while end < chars.len() && is_name_char(chars[end]) {
        end += 1;
    }
    end
}

fn collect(chars: &[char]) -> String {
    chars.iter().collect()
}

/// Parse an element line such as `a.btn(href="/") Go`.
pub fn parse_element_line(line: &str) -> std::result::Result<ElementLine, String> {
    let chars: Vec<char> = line.chars().collect();
    let mut element = ElementLine::default();

    let mut i = scan_name(&chars, 0);
    if i > 0 {
        if !chars[0].is_ascii_alphabetic() {
            return Err(format!("tag name '{}' must start with a letter", collect(&chars[..i])));
        }
        element.tag = collect(&chars[..i]);
        element.explicit_tag = true;
    } else if matches!(chars.first(), Some('.' | '#')) {
        element.tag = "div".to_string();
    } else {
        return Err(match chars.first() {
            Some(c) => format!("unexpected character '{c}'"),
            None => "empty element line".to_string(),
        });
    }

    loop {
        match chars.get(i) {
            Some('.') => {
                let end = scan_name(&chars, i + 1);
                if end == i + 1 {
                    if end == chars.len() {
                        element.block_text = true;
                        i = end;
                        break;
                    }
                    return Err("expected class name after '.'".to_string());
                }
                element.classes.push(collect(&chars[i + 1..end]));
                i = end;
            }
            Some('#') => {
                let end = scan_name(&chars, i + 1);
                if end == i + 1 {
                    return Err("expected id after '#'".to_string());
                }
                if element.id.is_some() {
                    return Err("element has more than one id".to_string());
                }
                element.id = Some(collect(&chars[i + 1..end]));
                i = end;
            }
            Some('(') => {
                let (attrs, end) = parse_attrs(&chars, i + 1)?;
                element.attrs.extend(attrs);
                i = end;
            }
            _ => break,
        }
    }

    match chars.get(i) {
        None => {}
        Some(':') => {
            let rest = collect(&chars[i + 1..]);
            let rest = rest.trim_start();
            if rest.is_empty() {
                return Err("expected an element after ':'".to_string());
            }
            element.expansion = Some(rest.to_string());
        }
        Some(' ') => {
            let text = collect(&chars[i + 1..]);
            if !text.is_empty() {
                element.text = Some(text);
            }
        }
        Some('/') if i + 1 == chars.len() => element.self_closing = true,
        Some('=' | '!') => return Err("buffered code is not supported".to_string()),
        Some(c) => return Err(format!("unexpected character '{c}'")),
    }

    Ok(element)
}

fn parse_attrs(chars: &[char], start: usize) -> std::result::Result<(Vec<Attr>, usize), String> {
    let mut attrs = Vec::new();
    let mut i = start;

    loop {
        while i < chars.len() && (chars[i].is_whitespace() || chars[i] == ',') {
            i += 1;
        }
        match chars.get(i) {
            None => return Err("unterminated attribute list".to_string()),
            Some(')') => return Ok((attrs, i + 1)),
            _ => {}
        }

        let name_start = i;
        while i < chars.len() && !matches!(chars[i], '=' | ')' | ',') && !chars[i].is_whitespace()
        {
            i += 1;
        }
        let mut name = collect(&chars[name_start..i]);
        if name.ends_with('!') && chars.get(i) == Some(&'=') {
            name.pop();
        }
        if name.is_empty() {
            return Err("expected attribute name".to_string());
        }

        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        if chars.get(i) != Some(&'=') {
            attrs.push(Attr { name, value: None });
            continue;
        }
        i += 1;
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }

        match chars.get(i).copied() {
            Some(quote @ ('"' | '\'')) => {
                i += 1;
                let mut value = String::new();
                loop {
                    match chars.get(i).copied() {
                        None => return Err(format!("unterminated string in attribute '{name}'")),
                        Some('\\') if i + 1 < chars.len() => {
                            value.push(chars[i + 1]);
                            i += 2;
                        }
                        Some(c) if c == quote => {
                            i += 1;
                            break;
                        }
                        Some(c) => {
                            value.push(c);
                            i += 1;
                        }
                    }
                }
                attrs.push(Attr {
                    name,
                    value: Some(value),
                });
            }
            _ => {
                let value_start = i;
                while i < chars.len() && !matches!(chars[i], ',' | ')') && !chars[i].is_whitespace()
                {
                    i += 1;
                }
                match collect(&chars[value_start..i]).as_str() {
                    "" => return Err(format!("expected value for attribute '{name}'")),
                    "true" => attrs.push(Attr { name, value: None }),
                    "false" => {}
                    value => attrs.push(Attr {
                        name,
                        value: Some(value.to_string()),
                    }),
                }
            }
        }
    }
}

/// A non-blank source line.
#[derive(Debug)]
struct Line {
    number: usize,
    indent: usize,
    raw: String,
    text: String,
}

fn split_lines(source: &str) -> Vec<Line> {
    source
        .lines()
        .enumerate()
        .filter(|(_, raw)| !raw.trim().is_empty())
        .map(|(idx, raw)| Line {
            number: idx + 1,
            indent: raw.bytes().take_while(|b| matches!(b, b' ' | b'\t')).count(),
            raw: raw.trim_end().to_string(),
            text: raw.trim().to_string(),
        })
        .collect()
}

/// Compile a template file into its node tree.
pub fn compile_file(path: &Path, context: &TemplateContext) -> Result<Vec<Node>> {
    Compiler {
        context,
        include_stack: Vec::new(),
    }
    .parse_file(path)
}

/// Compile `path` and render it to HTML.
pub fn render_file(path: &Path, context: &TemplateContext) -> Result<String> {
    Ok(render_html(&compile_file(path, context)?))
}

struct Compiler<'a> {
    context: &'a TemplateContext,
    include_stack: Vec<PathBuf>,
}

impl Compiler<'_> {
    fn parse_file(&mut self, path: &Path) -> Result<Vec<Node>> {
        if self.include_stack.iter().any(|p| p == path) {
            return Err(TemplateError::IncludeCycle {
                file: path.to_path_buf(),
            });
        }

        let source = fs::read_to_string(path).map_err(|source| TemplateError::Io {
            file: path.to_path_buf(),
            source,
        })?;

        let lines = split_lines(&source);
        if let Some(line) = lines
            .iter()
            .find(|l| l.raw[l.indent..].starts_with(char::is_whitespace))
        {
            return Err(syntax(
                path,
                line.number,
                "indentation must use ASCII spaces or tabs",
            ));
        }

        self.include_stack.push(path.to_path_buf());
        let file: Arc<Path> = Arc::from(path);
        let mut pos = 0;
        let nodes = self.parse_block(&lines, &mut pos, None, &file);
        self.include_stack.pop();
        nodes
    }

    fn parse_block(
        &mut self,
        lines: &[Line],
        pos: &mut usize,
        parent_indent: Option<usize>,
        file: &Arc<Path>,
    ) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();
        let mut level = None;

        while let Some(line) = lines.get(*pos) {
            if parent_indent.is_some_and(|parent| line.indent <= parent) {
                break;
            }
            match level {
                None => level = Some(line.indent),
                Some(level) if line.indent != level => {
                    return Err(syntax(file, line.number, "inconsistent indentation"));
                }
                Some(_) => {}
            }
            *pos += 1;
            self.parse_line(line, lines, pos, file, &mut nodes)?;
        }

        Ok(nodes)
    }

    fn parse_line(
        &mut self,
        line: &Line,
        lines: &[Line],
        pos: &mut usize,
        file: &Arc<Path>,
        out: &mut Vec<Node>,
    ) -> Result<()> {
        let text = line.text.as_str();

        if text.starts_with("//-") {
            collect_raw(lines, pos, line.indent);
            return Ok(());
        }
        if let Some(comment) = text.strip_prefix("//") {
            let mut body = vec![comment.trim().to_string()];
            body.extend(collect_raw(lines, pos, line.indent));
            let body: Vec<_> = body.into_iter().filter(|l| !l.is_empty()).collect();
            out.push(Node::Comment(body.join("\n")));
            return Ok(());
        }
        if let Some(piped) = text.strip_prefix('|') {
            let piped = piped.strip_prefix(' ').unwrap_or(piped);
            out.push(Node::Text(self.interpolate(piped, file, line.number, true)?));
            return Ok(());
        }
        if text.starts_with('<') {
            out.push(Node::Text(self.interpolate(text, file, line.number, true)?));
            return Ok(());
        }
        if text == "doctype" || text.starts_with("doctype ") {
            let kind = text["doctype".len()..].trim();
            let kind = if kind.is_empty() { "html" } else { kind };
            out.push(Node::Doctype(kind.to_string()));
            return Ok(());
        }
        if let Some(target) = text.strip_prefix("include ") {
            out.extend(self.include(target.trim(), file, line.number)?);
            return Ok(());
        }

        let element = self.parse_element(text, line, lines, pos, file)?;
        out.push(Node::Element(element));
        Ok(())
    }

    fn include(&mut self, target: &str, file: &Arc<Path>, line: usize) -> Result<Vec<Node>> {
        if target.is_empty() {
            return Err(syntax(file, line, "include needs a path"));
        }
        let mut path = file.parent().unwrap_or(Path::new("")).join(target);
        if path.extension().is_none() {
            path.set_extension("pug");
        }

        if path.extension().is_some_and(|ext| ext == "pug") {
            return self.parse_file(&path);
        }

        let raw = fs::read_to_string(&path).map_err(|source| TemplateError::Io {
            file: path.clone(),
            source,
        })?;
        Ok(vec![Node::Text(raw.trim_end().to_string())])
    }

    fn parse_element(
        &mut self,
        text: &str,
        line: &Line,
        lines: &[Line],
        pos: &mut usize,
        file: &Arc<Path>,
    ) -> Result<Element> {
        let parsed = parse_element_line(text).map_err(|m| syntax(file, line.number, m))?;

        let attrs = parsed
            .attrs
            .into_iter()
            .map(|attr| {
                let value = attr
                    .value
                    .map(|v| self.interpolate(&v, file, line.number, false))
                    .transpose()?;
                Ok(Attr {
                    name: attr.name,
                    value,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let inline = parsed
            .text
            .map(|t| self.interpolate(&t, file, line.number, true))
            .transpose()?;

        let mut element = Element {
            tag: parsed.tag,
            id: parsed.id,
            classes: parsed.classes,
            attrs,
            self_closing: parsed.self_closing,
            text: inline,
            raw: Vec::new(),
            children: Vec::new(),
            file: Arc::clone(file),
            line: line.number,
        };

        if let Some(expansion) = parsed.expansion {
            let child = self.parse_element(&expansion, line, lines, pos, file)?;
            element.children.push(Node::Element(child));
            return Ok(element);
        }

        if parsed.block_text {
            element.raw = collect_raw(lines, pos, line.indent)
                .iter()
                .map(|raw| self.interpolate(raw, file, line.number, true))
                .collect::<Result<Vec<_>>>()?;
            return Ok(element);
        }

        if lines.get(*pos).is_some_and(|next| next.indent > line.indent) {
            element.children = self.parse_block(lines, pos, Some(line.indent), file)?;
        }

        Ok(element)
    }

    fn interpolate(&self, text: &str, file: &Path, line: usize, escape: bool) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find(['#', '!']) {
            let (before, tail) = rest.split_at(start);
            if !tail[1..].starts_with('{') {
                out.push_str(before);
                out.push_str(&tail[..1]);
                rest = &tail[1..];
                continue;
            }
            if let Some(literal) = before.strip_suffix('\\') {
                out.push_str(literal);
                out.push_str(&tail[..2]);
                rest = &tail[2..];
                continue;
            }

            out.push_str(before);
            let end = tail
                .find('}')
                .ok_or_else(|| syntax(file, line, "unclosed interpolation"))?;
            let name = tail[2..end].trim();
            let (name, optional) = match name.strip_suffix('?') {
                Some(stripped) => (stripped, true),
                None => (name, false),
            };

            let value = match self.context.get(name) {
                Some(v) => v,
                None if optional => "",
                None => {
                    return Err(TemplateError::MissingVariable {
                        file: file.to_path_buf(),
                        line,
                        name: name.to_string(),
                    });
                }
            };

            if escape && tail.starts_with('#') {
                out.push_str(&escape_html(value));
            } else {
                out.push_str(value);
            }
            rest = &tail[end + 1..];
        }

        out.push_str(rest);
        Ok(out)
    }
}

fn syntax(file: &Path, line: usize, message: impl Into<String>) -> TemplateError {
    TemplateError::Syntax {
        file: file.to_path_buf(),
        line,
        message: message.into(),
    }
}

/// Consume every line indented deeper than `indent`, returning them with the
/// common leading indentation removed.
fn collect_raw(lines: &[Line], pos: &mut usize, indent: usize) -> Vec<String> {
    let start = *pos;
    while lines.get(*pos).is_some_and(|l| l.indent > indent) {
        *pos += 1;
    }
    let block = &lines[start..*pos];
    let common = block.iter().map(|l| l.indent).min().unwrap_or(0);
    block.iter().map(|l| l.raw[common..].to_string()).collect()
}

/// Escape text content.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_attr(value: &str) -> String {
    escape_html(value)
}

/// Render nodes as indented HTML.
#[must_use]
pub fn render_html(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        render_node(node, 0, &mut out);
    }
    out
}

fn render_node(node: &Node, depth: usize, out: &mut String) {
    let pad = "  ".repeat(depth);
    match node {
        Node::Doctype(kind) if kind == "html" => out.push_str("<!DOCTYPE html>\n"),
        Node::Doctype(kind) => out.push_str(&format!("<!DOCTYPE {kind}>\n")),
        Node::Comment(text) => out.push_str(&format!("{pad}<!-- {text} -->\n")),
        Node::Text(text) => {
            for line in text.lines() {
                out.push_str(&format!("{pad}{line}\n"));
            }
        }
        Node::Element(element) => {
            let open = element.open_tag();
            let tag = &element.tag;

            if element.self_closing || VOID_ELEMENTS.contains(&tag.as_str()) {
                out.push_str(&format!("{pad}{open}\n"));
            } else if !element.raw.is_empty() {
                out.push_str(&format!("{pad}{open}\n"));
                for line in &element.raw {
                    out.push_str(&format!("{pad}  {line}\n"));
                }
                out.push_str(&format!("{pad}</{tag}>\n"));
            } else if element.children.is_empty() {
                let text = element.text.as_deref().unwrap_or_default();
                out.push_str(&format!("{pad}{open}{text}</{tag}>\n"));
            } else {
                out.push_str(&format!("{pad}{open}\n"));
                if let Some(text) = &element.text {
                    out.push_str(&format!("{pad}  {text}\n"));
                }
                for child in &element.children {
                    render_node(child, depth + 1, out);
                }
                out.push_str(&format!("{pad}</{tag}>\n"));
            }
        }
    }
}
