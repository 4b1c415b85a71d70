//! SCSS compilation, vendor prefixing and minification.

use std::path::{Path, PathBuf};

use kiln_core::config::BrowserTargets;
use lightningcss::{
    stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet},
    targets::{Browsers, Targets},
};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::{
    output::{with_extension, write_output},
    sources::SourceSet,
    task::{Result, Task, TaskContext, TaskError, TaskReport},
};

/// Readable and minified forms of one stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledStyles {
    pub expanded: String,
    pub minified: String,
}

/// lightningcss encodes versions as `major << 16 | minor << 8 | patch`.
fn version(major: Option<u32>) -> Option<u32> {
    major.map(|v| v << 16)
}

fn targets(browsers: &BrowserTargets) -> Targets {
    Targets::from(Browsers {
        chrome: version(browsers.chrome),
        edge: version(browsers.edge),
        firefox: version(browsers.firefox),
        safari: version(browsers.safari),
        ios_saf: version(browsers.ios_saf),
        samsung: version(browsers.samsung),
        ..Browsers::default()
    })
}

/// Prefix and merge plain CSS for `browsers`, printing both variants.
pub fn process_css(
    css: &str,
    filename: &str,
    browsers: &BrowserTargets,
) -> std::result::Result<CompiledStyles, String> {
    let print = |minify: bool| -> std::result::Result<String, String> {
        let mut sheet = StyleSheet::parse(
            css,
            ParserOptions {
                filename: filename.to_string(),
                ..ParserOptions::default()
            },
        )
        .map_err(|e| e.to_string())?;

        sheet
            .minify(MinifyOptions {
                targets: targets(browsers),
                ..MinifyOptions::default()
            })
            .map_err(|e| e.to_string())?;

        let printed = sheet
            .to_css(PrinterOptions {
                minify,
                targets: targets(browsers),
                ..PrinterOptions::default()
            })
            .map_err(|e| e.to_string())?;
        Ok(printed.code)
    };

    Ok(CompiledStyles {
        expanded: print(false)?,
        minified: print(true)?,
    })
}

/// Compile an SCSS entry point. `@use`/`@import` resolve relative to its
/// directory.
pub fn compile_scss(path: &Path) -> std::result::Result<String, String> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let options = grass::Options::default()
        .style(grass::OutputStyle::Expanded)
        .load_path(dir);
    grass::from_path(path, &options).map_err(|e| e.to_string())
}

/// The `styles` task.
#[derive(Debug)]
pub struct StylesTask {
    sources: SourceSet,
    dest: PathBuf,
    browsers: BrowserTargets,
}

impl StylesTask {
    /// Create the task for `src_root/css/*.scss`.
    pub fn new(src_root: impl Into<PathBuf>, build_root: &Path, browsers: BrowserTargets) -> Self {
        Self {
            sources: SourceSet::new(src_root, &["css/*.scss"]),
            dest: build_root.join("css"),
            browsers,
        }
    }

    /// Entry stylesheets; `_partial.scss` files are only compiled through
    /// imports.
    fn entries(&self) -> Vec<PathBuf> {
        self.sources
            .files()
            .into_iter()
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| !n.starts_with('_'))
            })
            .collect()
    }

    fn compile(&self, source: &Path) -> Result<Vec<PathBuf>> {
        let css = compile_scss(source).map_err(|m| TaskError::transform(source, m))?;
        let name = source.file_name().map(Path::new).unwrap_or(source);
        let filename = name.to_string_lossy();

        let compiled =
            process_css(&css, &filename, &self.browsers).map_err(|m| TaskError::transform(source, m))?;

        let expanded = self.dest.join(with_extension(name, "css"));
        let minified = self.dest.join(with_extension(name, "min.css"));
        write_output(&expanded, &compiled.expanded)?;
        write_output(&minified, &compiled.minified)?;

        debug!(
            src = %source.display(),
            bytes = compiled.expanded.len(),
            min_bytes = compiled.minified.len(),
            "compiled stylesheet"
        );
        Ok(vec![expanded, minified])
    }
}

impl Task for StylesTask {
    fn name(&self) -> &'static str {
        "styles"
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.dest.clone()]
    }

    fn run(&self, _ctx: &TaskContext) -> Result<TaskReport> {
        let written: Vec<PathBuf> = self
            .entries()
            .par_iter()
            .map(|source| self.compile(source))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect();

        info!(count = written.len(), "stylesheets compiled");
        Ok(TaskReport {
            written,
            ..TaskReport::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_compile_scss_with_partial() {
        let dir = TempDir::new().unwrap();
        write(&dir.path().join("_vars.scss"), "$brand: #ff0000;\n");
        write(
            &dir.path().join("main.scss"),
            "@import 'vars';\n.nav {\n  a { color: $brand; }\n}\n",
        );
        let css = compile_scss(&dir.path().join("main.scss")).unwrap();
        assert!(css.contains(".nav a"));
        assert!(css.contains("#ff0000") || css.contains("red"));
    }

    #[test]
    fn test_compile_scss_error() {
        let dir = TempDir::new().unwrap();
        write(&dir.path().join("bad.scss"), ".a { color: $missing; }\n");
        assert!(compile_scss(&dir.path().join("bad.scss")).is_err());
    }

    #[test]
    fn test_process_css_minified_is_smaller() {
        let css = ".a {\n  color: red;\n}\n\n.b {\n  color: red;\n}\n";
        let out = process_css(css, "t.css", &BrowserTargets::default()).unwrap();
        assert!(out.minified.len() <= out.expanded.len());
        assert!(!out.minified.trim_end().contains('\n'));
        assert!(out.expanded.contains("color: red"));
    }

    #[test]
    fn test_process_css_prefixes_for_old_targets() {
        let old = BrowserTargets {
            chrome: None,
            edge: None,
            firefox: None,
            safari: Some(8),
            ios_saf: None,
            samsung: None,
        };
        let out = process_css(".a { user-select: none; }", "t.css", &old).unwrap();
        assert!(out.expanded.contains("-webkit-user-select"));
    }

    #[test]
    fn test_styles_task_outputs() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let build = dir.path().join("build");
        write(&src.join("css/_mixins.scss"), "@mixin flex { display: flex; }\n");
        write(
            &src.join("css/main.scss"),
            "@import 'mixins';\n.row { @include flex; }\n",
        );

        let task = StylesTask::new(&src, &build, BrowserTargets::default());
        let report = task.run(&TaskContext::default()).unwrap();

        assert_eq!(
            report.written,
            vec![build.join("css/main.css"), build.join("css/main.min.css")]
        );
        assert!(!build.join("css/_mixins.css").exists());

        let first = fs::read(build.join("css/main.min.css")).unwrap();
        task.run(&TaskContext::default()).unwrap();
        assert_eq!(fs::read(build.join("css/main.min.css")).unwrap(), first);
    }

    #[test]
    fn test_styles_task_failure() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        write(&src.join("css/main.scss"), ".a { color: ; ");

        let err = StylesTask::new(&src, &dir.path().join("build"), BrowserTargets::default())
            .run(&TaskContext::default())
            .unwrap_err();
        assert!(matches!(err, TaskError::Transform { .. }));
    }
}
