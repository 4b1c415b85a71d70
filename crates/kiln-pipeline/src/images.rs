//! Image optimization.

use std::{
    path::{Path, PathBuf},
    sync::{
        LazyLock,
        atomic::{AtomicUsize, Ordering},
    },
};

use image::{
    DynamicImage, ImageFormat,
    codecs::{
        jpeg::JpegEncoder,
        png::{CompressionType, FilterType, PngEncoder},
    },
};
use kiln_core::config::{ImagesConfig, PngCompression};
use rayon::prelude::*;
use regex::{Captures, Regex};
use tracing::{debug, info, warn};

use crate::{
    image_cache::ImageCache,
    output::write_output,
    sources::SourceSet,
    task::{IoContext, Result, Task, TaskContext, TaskError, TaskReport},
};

/// Image formats the optimizer distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
    Ico,
    Svg,
}

impl ImageKind {
    /// Kind from the file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "ico" => Some(Self::Ico),
            "svg" => Some(Self::Svg),
            _ => None,
        }
    }
}

/// Transforms one image's bytes.
pub trait Optimizer: Send + Sync {
    /// Identifies the optimizer and its settings in cache keys.
    fn fingerprint(&self) -> String;

    /// Optimize `bytes` of the given kind.
    fn optimize(&self, kind: ImageKind, bytes: &[u8]) -> std::result::Result<Vec<u8>, String>;
}

/// Default optimizer: lossy JPEG and lossless PNG re-encoding, conservative
/// SVG minification, GIF and ICO untouched.
#[derive(Debug, Clone)]
pub struct ImageOptimizer {
    jpeg_quality: u8,
    png_compression: PngCompression,
}

impl ImageOptimizer {
    /// Create an optimizer from the images configuration.
    #[must_use]
    pub fn new(config: &ImagesConfig) -> Self {
        Self {
            jpeg_quality: config.jpeg_quality,
            png_compression: config.png_compression,
        }
    }

    fn jpeg(&self, bytes: &[u8]) -> std::result::Result<Vec<u8>, String> {
        let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
            .map_err(|e| e.to_string())?;
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(decoded.to_rgb8())
            .write_with_encoder(JpegEncoder::new_with_quality(&mut out, self.jpeg_quality))
            .map_err(|e| e.to_string())?;
        Ok(out)
    }

    fn png(&self, bytes: &[u8]) -> std::result::Result<Vec<u8>, String> {
        let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Png)
            .map_err(|e| e.to_string())?;
        let compression = match self.png_compression {
            PngCompression::Fast => CompressionType::Fast,
            PngCompression::Default => CompressionType::Default,
            PngCompression::Best => CompressionType::Best,
        };
        let mut out = Vec::new();
        decoded
            .write_with_encoder(PngEncoder::new_with_quality(
                &mut out,
                compression,
                FilterType::Adaptive,
            ))
            .map_err(|e| e.to_string())?;
        Ok(out)
    }
}

impl Optimizer for ImageOptimizer {
    fn fingerprint(&self) -> String {
        format!("kiln-img-v1;jpeg={};png={:?}", self.jpeg_quality, self.png_compression)
    }

    fn optimize(&self, kind: ImageKind, bytes: &[u8]) -> std::result::Result<Vec<u8>, String> {
        let optimized = match kind {
            ImageKind::Jpeg => self.jpeg(bytes)?,
            ImageKind::Png => self.png(bytes)?,
            ImageKind::Gif | ImageKind::Ico => return Ok(bytes.to_vec()),
            ImageKind::Svg => {
                let text = std::str::from_utf8(bytes).map_err(|e| e.to_string())?;
                minify_svg(text).into_bytes()
            }
        };

        if optimized.len() < bytes.len() {
            Ok(optimized)
        } else {
            Ok(bytes.to_vec())
        }
    }
}

static XML_PROLOG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\?xml[^>]*\?>").expect("valid regex"));
static XML_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static BETWEEN_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">\s+<").expect("valid regex"));
static TEXT_ELEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<text\b.*?</text>").expect("valid regex"));

/// Drop the XML prolog, comments and whitespace between tags. Whitespace
/// inside `<text>` is rendered and kept.
#[must_use]
pub fn minify_svg(svg: &str) -> String {
    let svg = XML_PROLOG.replace_all(svg, "");
    let svg = XML_COMMENT.replace_all(&svg, "");
    let text_spans: Vec<_> = TEXT_ELEMENT.find_iter(&svg).map(|m| m.range()).collect();
    BETWEEN_TAGS
        .replace_all(&svg, |caps: &Captures<'_>| {
            let whitespace = caps.get(0).map_or(0, |m| m.start() + 1);
            if text_spans.iter().any(|span| span.contains(&whitespace)) {
                caps[0].to_string()
            } else {
                "><".to_string()
            }
        })
        .trim()
        .to_string()
}

/// The `images` task.
pub struct ImagesTask {
    sources: SourceSet,
    dest: PathBuf,
    cache: Option<ImageCache>,
    optimizer: Box<dyn Optimizer>,
}

impl std::fmt::Debug for ImagesTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagesTask")
            .field("sources", &self.sources)
            .field("dest", &self.dest)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl ImagesTask {
    /// Create the task with the default optimizer. `cache_dir` is `None`
    /// when caching is disabled.
    pub fn new(
        src_root: impl Into<PathBuf>,
        build_root: &Path,
        cache_dir: Option<PathBuf>,
        config: &ImagesConfig,
    ) -> Self {
        Self::with_optimizer(
            src_root,
            build_root,
            cache_dir,
            Box::new(ImageOptimizer::new(config)),
        )
    }

    /// Create the task with a custom optimizer.
    pub fn with_optimizer(
        src_root: impl Into<PathBuf>,
        build_root: &Path,
        cache_dir: Option<PathBuf>,
        optimizer: Box<dyn Optimizer>,
    ) -> Self {
        Self {
            sources: SourceSet::new(src_root, &["img/**/*.{gif,png,jpg,jpeg,ico,svg}"]),
            dest: build_root.join("img"),
            cache: cache_dir.map(ImageCache::new),
            optimizer,
        }
    }

    /// Optimized bytes for `source`, and whether they came from the cache.
    fn process(&self, source: &Path, bytes: &[u8], fingerprint: &str) -> Result<(Vec<u8>, bool)> {
        let Some(kind) = ImageKind::from_path(source) else {
            return Ok((bytes.to_vec(), false));
        };

        let key = ImageCache::key(fingerprint, bytes);
        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(&key)) {
            return Ok((cached, true));
        }

        let optimized = self
            .optimizer
            .optimize(kind, bytes)
            .map_err(|m| TaskError::transform(source, m))?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(&key, &optimized) {
                warn!(src = %source.display(), error = %e, "failed to store image in cache");
            }
        }
        Ok((optimized, false))
    }
}

impl Task for ImagesTask {
    fn name(&self) -> &'static str {
        "images"
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.dest.clone()]
    }

    fn run(&self, _ctx: &TaskContext) -> Result<TaskReport> {
        let fingerprint = self.optimizer.fingerprint();
        let hits = AtomicUsize::new(0);
        let misses = AtomicUsize::new(0);

        let written = self
            .sources
            .files_with_relative()
            .par_iter()
            .map(|(source, relative)| {
                let bytes = std::fs::read(source).at(source)?;
                let (optimized, hit) = self.process(source, &bytes, &fingerprint)?;
                if hit {
                    hits.fetch_add(1, Ordering::Relaxed);
                } else {
                    misses.fetch_add(1, Ordering::Relaxed);
                }

                let dest = self.dest.join(relative);
                write_output(&dest, &optimized)?;
                debug!(
                    src = %source.display(),
                    before = bytes.len(),
                    after = optimized.len(),
                    cached = hit,
                    "optimized image"
                );
                Ok(dest)
            })
            .collect::<Result<Vec<_>>>()?;

        let report = TaskReport {
            written,
            warnings: Vec::new(),
            cache_hits: hits.into_inner(),
            cache_misses: misses.into_inner(),
        };
        info!(
            count = report.written.len(),
            cache_hits = report.cache_hits,
            "images optimized"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, io::Cursor, sync::Arc};

    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    use super::*;

    fn png_bytes() -> Vec<u8> {
        let img = RgbImage::from_fn(32, 32, |x, y| Rgb([(x * 8) as u8, (y * 8) as u8, 128]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn jpeg_bytes() -> Vec<u8> {
        let img = RgbImage::from_fn(32, 32, |x, y| Rgb([(x * 8) as u8, 64, (y * 8) as u8]));
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_with_encoder(JpegEncoder::new_with_quality(&mut out, 100))
            .unwrap();
        out
    }

    /// Counts invocations and returns a fixed marker.
    struct CountingOptimizer(Arc<AtomicUsize>);

    impl Optimizer for CountingOptimizer {
        fn fingerprint(&self) -> String {
            "counting".to_string()
        }

        fn optimize(&self, _kind: ImageKind, bytes: &[u8]) -> std::result::Result<Vec<u8>, String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(bytes.iter().rev().copied().collect())
        }
    }

    #[test]
    fn test_image_kind_from_path() {
        assert_eq!(ImageKind::from_path(Path::new("a/b.JPG")), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::from_path(Path::new("icon.svg")), Some(ImageKind::Svg));
        assert_eq!(ImageKind::from_path(Path::new("notes.txt")), None);
    }

    #[test]
    fn test_minify_svg() {
        let svg = "<?xml version=\"1.0\"?>\n<!-- exported -->\n<svg viewBox=\"0 0 10 10\">\n  <path d=\"M0 0h10\"/>\n</svg>\n";
        assert_eq!(minify_svg(svg), "<svg viewBox=\"0 0 10 10\"><path d=\"M0 0h10\"/></svg>");
    }

    #[test]
    fn test_minify_svg_keeps_text_whitespace() {
        let svg = "<svg>\n  <text x=\"0\"><tspan>a</tspan> <tspan>b</tspan></text>\n  <path d=\"M0 0\"/>\n</svg>\n";
        assert_eq!(
            minify_svg(svg),
            "<svg><text x=\"0\"><tspan>a</tspan> <tspan>b</tspan></text><path d=\"M0 0\"/></svg>"
        );
    }

    #[test]
    fn test_optimizer_never_grows_output() {
        let optimizer = ImageOptimizer::new(&ImagesConfig::default());
        for (kind, bytes) in [(ImageKind::Png, png_bytes()), (ImageKind::Jpeg, jpeg_bytes())] {
            let out = optimizer.optimize(kind, &bytes).unwrap();
            assert!(out.len() <= bytes.len());
            assert!(image::load_from_memory(&out).is_ok());
        }
    }

    #[test]
    fn test_passthrough_kinds() {
        let optimizer = ImageOptimizer::new(&ImagesConfig::default());
        let gif = b"GIF89a-not-really".to_vec();
        assert_eq!(optimizer.optimize(ImageKind::Gif, &gif).unwrap(), gif);
    }

    #[test]
    fn test_corrupt_image_fails() {
        let optimizer = ImageOptimizer::new(&ImagesConfig::default());
        assert!(optimizer.optimize(ImageKind::Png, b"not a png").is_err());
    }

    #[test]
    fn test_cache_hit_skips_optimizer() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let build = dir.path().join("build");
        fs::create_dir_all(src.join("img/icons")).unwrap();
        fs::write(src.join("img/photo.png"), [1u8, 2, 3]).unwrap();
        fs::write(src.join("img/icons/a.gif"), [4u8, 5]).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let task = ImagesTask::with_optimizer(
            &src,
            &build,
            Some(dir.path().join(".cache/img")),
            Box::new(CountingOptimizer(Arc::clone(&calls))),
        );

        let first = task.run(&TaskContext::default()).unwrap();
        assert_eq!((first.cache_hits, first.cache_misses), (0, 2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let bytes = fs::read(build.join("img/photo.png")).unwrap();
        assert_eq!(bytes, vec![3, 2, 1]);
        assert!(build.join("img/icons/a.gif").exists());

        fs::remove_dir_all(&build).unwrap();
        let second = task.run(&TaskContext::default()).unwrap();
        assert_eq!((second.cache_hits, second.cache_misses), (2, 0));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(fs::read(build.join("img/photo.png")).unwrap(), bytes);
    }

    #[test]
    fn test_without_cache_always_optimizes() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("img")).unwrap();
        fs::write(src.join("img/a.png"), [1u8]).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let task = ImagesTask::with_optimizer(
            &src,
            &dir.path().join("build"),
            None,
            Box::new(CountingOptimizer(Arc::clone(&calls))),
        );
        task.run(&TaskContext::default()).unwrap();
        task.run(&TaskContext::default()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
