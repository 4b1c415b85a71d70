//! Template lint and render tasks.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use kiln_core::{RuleSet, livereload};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::{
    bem,
    output::{with_extension, write_output},
    sources::SourceSet,
    task::{IoContext, Result, Task, TaskContext, TaskError, TaskReport},
    template::{TemplateContext, compile_file, render_html},
    template_lint::lint_source,
};

/// The `lint-templates` task. Checks every template, partials included.
#[derive(Debug)]
pub struct LintTemplatesTask {
    sources: SourceSet,
    rules: RuleSet,
}

impl LintTemplatesTask {
    /// Create the task for templates under `src_root/html`.
    pub fn new(src_root: impl Into<PathBuf>, rules: RuleSet) -> Self {
        Self {
            sources: SourceSet::new(src_root, &["html/**/*.pug"]),
            rules,
        }
    }
}

impl Task for LintTemplatesTask {
    fn name(&self) -> &'static str {
        "lint-templates"
    }

    fn outputs(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    fn run(&self, _ctx: &TaskContext) -> Result<TaskReport> {
        let mut diagnostics = Vec::new();
        for file in self.sources.files() {
            let source = fs::read_to_string(&file).at(&file)?;
            diagnostics.extend(lint_source(&file, &source, &self.rules));
        }

        for diagnostic in &diagnostics {
            warn!("{diagnostic}");
        }
        TaskError::check_lint(&diagnostics)?;

        let mut report = TaskReport::new();
        report.warn(diagnostics);
        Ok(report)
    }
}

/// The `render-templates` task. Renders `html/pages/*.pug` into the build
/// root; everything else under `html/` is only reachable through `include`.
#[derive(Debug)]
pub struct RenderTemplatesTask {
    sources: SourceSet,
    dest: PathBuf,
    locals: BTreeMap<String, String>,
    bem: bool,
    notify: bool,
}

impl RenderTemplatesTask {
    /// Create the task.
    pub fn new(
        src_root: impl Into<PathBuf>,
        build_root: &Path,
        locals: BTreeMap<String, String>,
    ) -> Self {
        Self {
            sources: SourceSet::new(src_root, &["html/pages/*.pug"]),
            dest: build_root.to_path_buf(),
            locals,
            bem: true,
            notify: false,
        }
    }

    /// Toggle BEM naming warnings.
    #[must_use]
    pub fn with_bem(mut self, bem: bool) -> Self {
        self.bem = bem;
        self
    }

    /// Show reload toasts from the injected live-reload client.
    #[must_use]
    pub fn with_notify(mut self, notify: bool) -> Self {
        self.notify = notify;
        self
    }

    fn context(&self, ctx: &TaskContext) -> TemplateContext {
        let mut context = TemplateContext::new();
        for (key, value) in &self.locals {
            context.insert(key.as_str(), value.as_str());
        }
        context.insert("mode", ctx.mode.as_str());
        context
    }
}

impl Task for RenderTemplatesTask {
    fn name(&self) -> &'static str {
        "render-templates"
    }

    fn outputs(&self) -> Vec<PathBuf> {
        self.sources
            .files()
            .iter()
            .filter_map(|source| source.file_name())
            .map(|name| self.dest.join(with_extension(Path::new(name), "html")))
            .collect()
    }

    fn run(&self, ctx: &TaskContext) -> Result<TaskReport> {
        let context = self.context(ctx);

        let rendered = self
            .sources
            .files()
            .par_iter()
            .map(|source| {
                let nodes = compile_file(source, &context)
                    .map_err(|e| TaskError::transform(source, e.to_string()))?;
                let warnings = if self.bem {
                    bem::validate(&nodes)
                } else {
                    Vec::new()
                };

                let mut html = render_html(&nodes);
                if ctx.mode.is_develop() {
                    html = livereload::inject(&html, self.notify);
                }

                let name = source.file_name().map(Path::new).unwrap_or(source.as_path());
                let dest = self.dest.join(with_extension(name, "html"));
                write_output(&dest, html)?;
                Ok((dest, warnings))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut report = TaskReport::new();
        for (dest, warnings) in rendered {
            for warning in &warnings {
                warn!("{warning}");
            }
            report.wrote(dest);
            report.warn(warnings);
        }

        info!(count = report.written.len(), "pages rendered");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use kiln_core::{BuildMode, Severity, livereload::LIVERELOAD_PATH};
    use tempfile::TempDir;

    use super::*;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn site() -> TempDir {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        write(
            &src.join("html/pages/index.pug"),
            "doctype html\nhtml\n  body\n    include ../blocks/header\n    p.note #{greeting}\n",
        );
        write(&src.join("html/blocks/header.pug"), "header.header\n  h1.header__title Kiln\n");
        dir
    }

    fn locals() -> BTreeMap<String, String> {
        BTreeMap::from([("greeting".to_string(), "Hi".to_string())])
    }

    #[test]
    fn test_render_pages_only() {
        let dir = site();
        let src = dir.path().join("src");
        let build = dir.path().join("build");

        let task = RenderTemplatesTask::new(&src, &build, locals());
        assert_eq!(task.outputs(), vec![build.join("index.html")]);

        let report = task.run(&TaskContext::default()).unwrap();
        assert_eq!(report.written, vec![build.join("index.html")]);
        assert!(report.warnings.is_empty());
        assert!(!build.join("header.html").exists());

        let html = fs::read_to_string(build.join("index.html")).unwrap();
        assert!(html.contains("<h1 class=\"header__title\">Kiln</h1>"));
        assert!(html.contains("<p class=\"note\">Hi</p>"));
        assert!(!html.contains(LIVERELOAD_PATH));
    }

    #[test]
    fn test_develop_mode_injects_livereload() {
        let dir = site();
        let build = dir.path().join("build");
        RenderTemplatesTask::new(dir.path().join("src"), &build, locals())
            .run(&TaskContext::new(BuildMode::Develop))
            .unwrap();

        let html = fs::read_to_string(build.join("index.html")).unwrap();
        assert!(html.contains(LIVERELOAD_PATH));
        assert!(html.find(LIVERELOAD_PATH).unwrap() < html.rfind("</body>").unwrap());
    }

    #[test]
    fn test_mode_local() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        write(&src.join("html/pages/mode.pug"), "p #{mode}\n");
        let build = dir.path().join("build");

        RenderTemplatesTask::new(&src, &build, BTreeMap::new())
            .run(&TaskContext::new(BuildMode::Develop))
            .unwrap();
        let html = fs::read_to_string(build.join("mode.html")).unwrap();
        assert!(html.starts_with("<p>develop</p>"));
    }

    #[test]
    fn test_config_locals_keep_key_case() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        write(&src.join("html/pages/about.pug"), "h1 #{siteTitle}\n");
        let config_path = dir.path().join("kiln.toml");
        fs::write(&config_path, "[templates.locals]\nsiteTitle = \"Landing\"\n").unwrap();

        let config = kiln_core::Config::load_with_env(&config_path)
            .unwrap()
            .rooted_at(dir.path());
        RenderTemplatesTask::new(&config.paths.src, &config.paths.build, config.templates.locals)
            .run(&TaskContext::default())
            .unwrap();

        let html = fs::read_to_string(config.paths.build.join("about.html")).unwrap();
        assert!(html.starts_with("<h1>Landing</h1>"));
    }

    #[test]
    fn test_render_missing_variable_fails() {
        let dir = site();
        let build = dir.path().join("build");
        let err = RenderTemplatesTask::new(dir.path().join("src"), &build, BTreeMap::new())
            .run(&TaskContext::default())
            .unwrap_err();
        assert!(matches!(err, TaskError::Transform { .. }));
    }

    #[test]
    fn test_bem_warnings_reported() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        write(&src.join("html/pages/index.pug"), "div\n  span.card__title x\n");
        let build = dir.path().join("build");

        let report = RenderTemplatesTask::new(&src, &build, BTreeMap::new())
            .run(&TaskContext::default())
            .unwrap();
        assert_eq!(report.warnings.len(), 1);

        let report = RenderTemplatesTask::new(&src, &build, BTreeMap::new())
            .with_bem(false)
            .run(&TaskContext::default())
            .unwrap();
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_lint_gate() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        write(&src.join("html/blocks/bad.pug"), "div  \n");

        let err = LintTemplatesTask::new(&src, RuleSet::new())
            .run(&TaskContext::default())
            .unwrap_err();
        let TaskError::Lint { diagnostics } = err else {
            panic!("expected lint failure");
        };
        assert_eq!(diagnostics.len(), 1);

        let rules = RuleSet::new().with("disallow-trailing-spaces", Severity::Warn);
        let report = LintTemplatesTask::new(&src, rules)
            .run(&TaskContext::default())
            .unwrap();
        assert_eq!(report.warnings.len(), 1);
    }
}
