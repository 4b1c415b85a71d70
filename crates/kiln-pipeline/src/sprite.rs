//! SVG stack sprite.
//!
//! Every icon becomes a nested `<svg id="name">` that is only displayed when
//! targeted, so `sprite.svg#name` renders a single icon.

use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use regex::Regex;
use tracing::info;

use crate::{
    output::write_output,
    sources::SourceSet,
    task::{IoContext, Result, Task, TaskContext, TaskError, TaskReport},
};

const SVG_NS: &str = "http://www.w3.org/2000/svg";
const STACK_STYLE: &str = ":root>svg{display:none}:root>svg:target{display:block}";

static ROOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<svg\b([^>]*)>(.*)</svg>").expect("valid regex"));
static VIEW_BOX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bviewBox\s*=\s*["']([^"']*)["']"#).expect("valid regex"));
static WIDTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bwidth\s*=\s*["']([\d.]+)"#).expect("valid regex"));
static HEIGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bheight\s*=\s*["']([\d.]+)"#).expect("valid regex"));
static PAINT_ATTRS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\s(?:fill|style)\s*=\s*("[^"]*"|'[^']*')"#).expect("valid regex"));
static COMMENTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));

/// One icon ready to be stacked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteIcon {
    pub id: String,
    pub view_box: String,
    pub body: String,
}

/// Extract an icon from an SVG document, stripping `fill` and `style`
/// attributes so the icon takes its color from CSS.
pub fn parse_icon(id: &str, svg: &str) -> std::result::Result<SpriteIcon, String> {
    let svg = COMMENTS.replace_all(svg, "");
    let captures = ROOT
        .captures(&svg)
        .ok_or_else(|| "no <svg> root element".to_string())?;
    let attrs = &captures[1];

    let view_box = match VIEW_BOX.captures(attrs) {
        Some(vb) => vb[1].trim().to_string(),
        None => {
            let width = WIDTH.captures(attrs).map(|c| c[1].to_string());
            let height = HEIGHT.captures(attrs).map(|c| c[1].to_string());
            match (width, height) {
                (Some(w), Some(h)) => format!("0 0 {w} {h}"),
                _ => return Err("svg needs a viewBox or width and height".to_string()),
            }
        }
    };

    let body = PAINT_ATTRS.replace_all(captures[2].trim(), "").into_owned();
    Ok(SpriteIcon {
        id: id.to_string(),
        view_box,
        body,
    })
}

/// Assemble icons into a stack sprite.
#[must_use]
pub fn build_sprite(icons: &[SpriteIcon]) -> String {
    let mut out = format!(r#"<svg xmlns="{SVG_NS}"><style>{STACK_STYLE}</style>"#);
    for icon in icons {
        let _ = write!(
            out,
            r#"<svg id="{}" viewBox="{}">{}</svg>"#,
            icon.id, icon.view_box, icon.body
        );
    }
    out.push_str("</svg>\n");
    out
}

/// The `sprite` task.
#[derive(Debug)]
pub struct SpriteTask {
    sources: SourceSet,
    dest: PathBuf,
}

impl SpriteTask {
    /// Create the task for `src_root/img/svg/*.svg`.
    pub fn new(src_root: impl Into<PathBuf>, build_root: &Path) -> Self {
        Self {
            sources: SourceSet::new(src_root, &["img/svg/*.svg"]),
            dest: build_root.join("img/svg/sprite.svg"),
        }
    }
}

impl Task for SpriteTask {
    fn name(&self) -> &'static str {
        "sprite"
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.dest.clone()]
    }

    fn run(&self, _ctx: &TaskContext) -> Result<TaskReport> {
        let mut icons = Vec::new();
        for file in self.sources.files() {
            // A previous build's sprite is never an input.
            if file.file_name().is_some_and(|n| n == "sprite.svg") {
                continue;
            }
            let id = file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let svg = fs::read_to_string(&file).at(&file)?;
            icons.push(parse_icon(&id, &svg).map_err(|m| TaskError::transform(&file, m))?);
        }

        let mut report = TaskReport::new();
        if icons.is_empty() {
            return Ok(report);
        }

        write_output(&self.dest, build_sprite(&icons))?;
        info!(icons = icons.len(), "sprite assembled");
        report.wrote(self.dest.clone());
        Ok(report)
    }
}
