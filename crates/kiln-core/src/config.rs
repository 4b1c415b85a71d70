//! Project configuration management.
//!
//! Every value has a default, so a project following the standard
//! `src/` -> `build/` layout needs no configuration file at all.

use std::{
    collections::{BTreeMap, HashMap},
    path::{Component, Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    diagnostic::RuleSet,
    error::{CoreError, Result},
};

/// Main configuration structure for Kiln.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Source, output and cache locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Development server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Stylesheet compilation settings.
    #[serde(default)]
    pub styles: StylesConfig,

    /// Raster image optimization settings.
    #[serde(default)]
    pub images: ImagesConfig,

    /// Template rendering settings.
    #[serde(default)]
    pub templates: TemplatesConfig,

    /// Lint rule severity overrides.
    #[serde(default)]
    pub lint: LintConfig,

    /// Project root set by [`Config::rooted_at`].
    #[serde(skip)]
    root: Option<PathBuf>,
}

/// Filesystem layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Source tree root.
    #[serde(default = "default_src_dir")]
    pub src: PathBuf,

    /// Build root. Wholly owned by the pipeline and deleted on every build.
    #[serde(default = "default_build_dir")]
    pub build: PathBuf,

    /// Cache root for memoized transform results. Survives `clean`.
    #[serde(default = "default_cache_dir")]
    pub cache: PathBuf,
}

/// Development server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Open the browser once the server is listening.
    #[serde(default = "default_true")]
    pub open: bool,

    /// Send permissive CORS headers.
    #[serde(default = "default_true")]
    pub cors: bool,

    /// Show connect/reload toasts in the browser.
    #[serde(default)]
    pub notify: bool,

    /// Quiet period before a burst of file events triggers a rebuild.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

/// Stylesheet configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StylesConfig {
    /// Minimum browser versions used for vendor prefixing.
    #[serde(default)]
    pub browsers: BrowserTargets,
}

/// Minimum supported browser major versions. `None` means not targeted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserTargets {
    #[serde(default)]
    pub chrome: Option<u32>,
    #[serde(default)]
    pub edge: Option<u32>,
    #[serde(default)]
    pub firefox: Option<u32>,
    #[serde(default)]
    pub safari: Option<u32>,
    #[serde(default)]
    pub ios_saf: Option<u32>,
    #[serde(default)]
    pub samsung: Option<u32>,
}

/// PNG compression effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PngCompression {
    Fast,
    Default,
    Best,
}

/// Image optimization configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    /// JPEG re-encode quality (1..=100).
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// PNG re-encode effort.
    #[serde(default = "default_png_compression")]
    pub png_compression: PngCompression,

    /// Memoize optimized images in the cache directory.
    #[serde(default = "default_true")]
    pub cache: bool,
}

/// Template configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// Values available to templates as `#{name}`.
    #[serde(default)]
    pub locals: BTreeMap<String, String>,

    /// Report BEM naming violations in rendered pages.
    #[serde(default = "default_true")]
    pub bem: bool,
}

/// Lint severity overrides per asset class.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LintConfig {
    /// Template lint rules.
    #[serde(default)]
    pub templates: RuleSet,

    /// Script lint rules.
    #[serde(default)]
    pub scripts: RuleSet,
}

// Default value functions
fn default_src_dir() -> PathBuf {
    PathBuf::from("src")
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("build")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".kiln-cache")
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    200
}

fn default_jpeg_quality() -> u8 {
    80
}

fn default_png_compression() -> PngCompression {
    PngCompression::Best
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            src: default_src_dir(),
            build: default_build_dir(),
            cache: default_cache_dir(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            open: true,
            cors: true,
            notify: false,
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for BrowserTargets {
    fn default() -> Self {
        Self {
            chrome: Some(109),
            edge: Some(120),
            firefox: Some(115),
            safari: Some(15),
            ios_saf: Some(15),
            samsung: Some(23),
        }
    }
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: default_jpeg_quality(),
            png_compression: default_png_compression(),
            cache: true,
        }
    }
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            locals: BTreeMap::new(),
            bem: true,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            CoreError::config_with_source(
                format!("Failed to parse config file: {}", path.display()),
                e,
            )
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional file layered with `KILN__*`
    /// environment variables (e.g. `KILN__SERVER__PORT=4000`).
    pub fn load_with_env(path: &Path) -> Result<Self> {
        Self::load_layered(path, None)
    }

    /// Same as [`Config::load_with_env`] with an explicit environment map.
    fn load_layered(path: &Path, env: Option<HashMap<String, String>>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("KILN")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;

        let mut config: Config = settings.try_deserialize()?;
        // The config crate lowercases keys; template locals are case-sensitive.
        if let Some(locals) = file_locals(path)? {
            for (key, value) in locals {
                let value = config
                    .templates
                    .locals
                    .remove(&key.to_lowercase())
                    .unwrap_or(value);
                config.templates.locals.insert(key, value);
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.paths.build.as_os_str().is_empty() {
            return Err(CoreError::config("paths.build cannot be empty"));
        }

        let build = resolve(&self.paths.build);
        let escapes_root = build.as_os_str().is_empty()
            || build.starts_with(Component::ParentDir)
            || self
                .root
                .as_deref()
                .is_some_and(|root| resolve(root).starts_with(&build));
        if escapes_root {
            return Err(CoreError::config(format!(
                "paths.build ({}) must be a directory inside the project root",
                self.paths.build.display()
            )));
        }

        if resolve(&self.paths.src).starts_with(&build) {
            return Err(CoreError::config(format!(
                "paths.build ({}) must not contain the source tree ({})",
                self.paths.build.display(),
                self.paths.src.display()
            )));
        }

        if resolve(&self.paths.cache).starts_with(&build) {
            tracing::warn!(
                cache = %self.paths.cache.display(),
                "cache directory lives inside the build root and is wiped on every build"
            );
        }

        if !(1..=100).contains(&self.images.jpeg_quality) {
            return Err(CoreError::config(format!(
                "images.jpeg_quality must be between 1 and 100, got {}",
                self.images.jpeg_quality
            )));
        }

        Ok(())
    }

    /// Resolve a path relative to the source root.
    #[must_use]
    pub fn src_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.paths.src.join(relative)
    }

    /// Resolve a path relative to the build root.
    #[must_use]
    pub fn build_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.paths.build.join(relative)
    }

    /// Re-root all paths under `root`; relative paths become `root/<path>`.
    #[must_use]
    pub fn rooted_at(mut self, root: &Path) -> Self {
        self.paths.src = root.join(&self.paths.src);
        self.paths.build = root.join(&self.paths.build);
        self.paths.cache = root.join(&self.paths.cache);
        self.root = Some(root.to_path_buf());
        self
    }
}

/// `[templates.locals]` read straight from the TOML file, keys unchanged.
fn file_locals(path: &Path) -> Result<Option<BTreeMap<String, String>>> {
    #[derive(Deserialize)]
    struct LocalsFile {
        #[serde(default)]
        templates: LocalsTable,
    }

    #[derive(Default, Deserialize)]
    struct LocalsTable {
        #[serde(default)]
        locals: BTreeMap<String, String>,
    }

    if !path.is_file() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    let file: LocalsFile = toml::from_str(&content)?;
    Ok(Some(file.templates.locals))
}

/// Remove `.` and `..` components without touching the filesystem. Leading
/// `..` of a relative path is kept.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(Component::ParentDir),
            },
            other => out.push(other),
        }
    }
    out
}

/// Normalize `path`; absolute paths also get their deepest existing ancestor
/// canonicalized so symlinked locations compare equal.
fn resolve(path: &Path) -> PathBuf {
    let lexical = normalize(path);
    if lexical.is_relative() {
        return lexical;
    }

    let mut existing = lexical.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return missing
                .iter()
                .rev()
                .fold(canonical, |acc, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return lexical,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::diagnostic::Severity;

    fn create_test_config() -> String {
        r#"
[paths]
src = "assets"
build = "dist"

[server]
port = 8080
open = false
notify = true

[styles.browsers]
chrome = 90
safari = 13

[images]
jpeg_quality = 70
png_compression = "fast"

[templates.locals]
title = "Landing"

[lint.scripts]
no-console = "off"
"#
        .to_string()
    }

    #[test]
    fn test_load_config() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join("kiln.toml");
        let mut file = std::fs::File::create(&config_path).expect("create file");
        file.write_all(create_test_config().as_bytes())
            .expect("write");

        let config = Config::load(&config_path).expect("load config");

        assert_eq!(config.paths.src, PathBuf::from("assets"));
        assert_eq!(config.paths.build, PathBuf::from("dist"));
        assert_eq!(config.paths.cache, PathBuf::from(".kiln-cache"));
        assert_eq!(config.server.port, 8080);
        assert!(!config.server.open);
        assert!(config.server.cors);
        assert!(config.server.notify);
        assert_eq!(config.styles.browsers.chrome, Some(90));
        assert_eq!(config.styles.browsers.firefox, None);
        assert_eq!(config.images.jpeg_quality, 70);
        assert_eq!(config.images.png_compression, PngCompression::Fast);
        assert_eq!(config.templates.locals.get("title").unwrap(), "Landing");
        assert_eq!(
            config.lint.scripts.severity("no-console", Severity::Warn),
            Severity::Off
        );
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_toml_str("").expect("empty config");

        assert_eq!(config.paths.src, PathBuf::from("src"));
        assert_eq!(config.paths.build, PathBuf::from("build"));
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert!(config.server.open);
        assert!(config.server.cors);
        assert!(!config.server.notify);
        assert_eq!(config.server.debounce_ms, 200);
        assert_eq!(config.images.jpeg_quality, 80);
        assert_eq!(config.images.png_compression, PngCompression::Best);
        assert!(config.templates.bem);
        assert_eq!(config.styles.browsers, BrowserTargets::default());
    }

    #[test]
    fn test_layered_config_without_file() {
        let env = HashMap::from([
            ("KILN__SERVER__PORT".to_string(), "4100".to_string()),
            ("KILN__PATHS__BUILD".to_string(), "out".to_string()),
        ]);
        let config =
            Config::load_layered(Path::new("/nonexistent/kiln.toml"), Some(env)).expect("load");

        assert_eq!(config.server.port, 4100);
        assert_eq!(config.paths.build, PathBuf::from("out"));
        assert_eq!(config.paths.src, PathBuf::from("src"));
    }

    #[test]
    fn test_layered_env_overrides_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join("kiln.toml");
        std::fs::write(&config_path, "[server]\nport = 5000\ncors = false\n").expect("write");

        let env = HashMap::from([("KILN__SERVER__PORT".to_string(), "5001".to_string())]);
        let config = Config::load_layered(&config_path, Some(env)).expect("load");

        assert_eq!(config.server.port, 5001);
        assert!(!config.server.cors);
    }

    #[test]
    fn test_validation_rejects_build_containing_src() {
        let result = Config::from_toml_str(
            r#"
[paths]
src = "build/src"
build = "build"
"#,
        );
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("must not contain"));
    }

    #[test]
    fn test_validation_rejects_build_at_or_above_root() {
        for build in ["src/..", "..", ".", "build/../.."] {
            let result = Config::from_toml_str(&format!("[paths]\nbuild = \"{build}\"\n"));
            assert!(result.is_err(), "build = {build:?} accepted");
        }
    }

    #[test]
    fn test_validation_rejects_rooted_build_at_or_above_root() {
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::create_dir_all(dir.path().join("src")).expect("create src");

        for build in ["src/..", "..", "."] {
            let mut config = Config::default();
            config.paths.build = PathBuf::from(build);
            let config = config.rooted_at(dir.path());
            assert!(config.validate().is_err(), "build = {build:?} accepted");
        }
    }

    #[test]
    fn test_validation_accepts_normalized_build() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut config = Config::default();
        config.paths.build = PathBuf::from("build/../dist");
        assert!(config.validate().is_ok());
        assert!(config.rooted_at(dir.path()).validate().is_ok());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("src/..")), PathBuf::new());
        assert_eq!(normalize(Path::new("./a/./b/../c")), PathBuf::from("a/c"));
        assert_eq!(normalize(Path::new("../../x")), PathBuf::from("../../x"));
        assert_eq!(normalize(Path::new("/site/src/..")), PathBuf::from("/site"));
        assert_eq!(normalize(Path::new("/..")), PathBuf::from("/"));
    }

    #[test]
    fn test_layered_locals_keep_key_case() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join("kiln.toml");
        std::fs::write(
            &config_path,
            "[templates.locals]\nsiteTitle = \"Landing\"\ntitle = \"Home\"\n",
        )
        .expect("write");

        let config = Config::load_layered(&config_path, Some(HashMap::new())).expect("load");
        assert_eq!(config.templates.locals.get("siteTitle").unwrap(), "Landing");
        assert_eq!(config.templates.locals.get("title").unwrap(), "Home");
        assert!(!config.templates.locals.contains_key("sitetitle"));

        let env = HashMap::from([(
            "KILN__TEMPLATES__LOCALS__SITETITLE".to_string(),
            "Override".to_string(),
        )]);
        let config = Config::load_layered(&config_path, Some(env)).expect("load");
        assert_eq!(config.templates.locals.get("siteTitle").unwrap(), "Override");
        assert_eq!(config.templates.locals.len(), 2);
    }

    #[test]
    fn test_validation_rejects_jpeg_quality() {
        let result = Config::from_toml_str("[images]\njpeg_quality = 0\n");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("jpeg_quality"));
    }

    #[test]
    fn test_config_not_found() {
        let result = Config::load(Path::new("/nonexistent/kiln.toml"));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not found"));
    }

    #[test]
    fn test_rooted_at() {
        let config = Config::default().rooted_at(Path::new("/tmp/site"));
        assert_eq!(config.paths.src, PathBuf::from("/tmp/site/src"));
        assert_eq!(config.build_path("css"), PathBuf::from("/tmp/site/build/css"));
        assert_eq!(config.src_path("js/app.js"), PathBuf::from("/tmp/site/src/js/app.js"));
    }
}
