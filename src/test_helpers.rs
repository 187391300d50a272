//! Shared test utilities for the respix test suite.
//!
//! Provides synthetic image files, a site-shaped temp directory, and a
//! [`CountingGenerator`] that stands in for the real transcoder so
//! orchestration tests can assert how often generation actually ran.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let site = TestSite::new(&["test.jpg", "photos/sunset.jpg"]);
//! let generator = Arc::new(CountingGenerator::new(1920, 1080));
//!
//! let mut ctx = site.context("posts/hello.md");
//! // ... run the orchestrator ...
//! assert_eq!(generator.calls(), 1);
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use crate::config::PluginConfig;
use crate::imaging::{
    GenerateError, GenerateRequest, GeneratedImage, SourceFormat, Variant, VariantGenerator,
    plan_variants,
};
use crate::orchestrator::PassContext;

// =========================================================================
// Synthetic images
// =========================================================================

/// Write a solid-gradient JPEG of the given size.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    use image::{ImageEncoder, RgbImage};

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let file = std::fs::File::create(path).unwrap();
    image::codecs::jpeg::JpegEncoder::new_with_quality(file, 90)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
}

// =========================================================================
// Site fixture
// =========================================================================

/// Temp directory laid out like a small site:
///
/// ```text
/// <root>/public/     resource_path, holds the listed images
/// <root>/content/    where documents live
/// <root>/dist/img/   output_dir (not created up front)
/// ```
pub struct TestSite {
    pub tmp: TempDir,
}

impl TestSite {
    /// Create the site with small JPEGs at the given paths under `public/`.
    pub fn new(images: &[&str]) -> Self {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("public")).unwrap();
        std::fs::create_dir_all(tmp.path().join("content")).unwrap();
        for rel in images {
            create_test_jpeg(&tmp.path().join("public").join(rel), 64, 48);
        }
        Self { tmp }
    }

    pub fn root(&self) -> &Path {
        self.tmp.path()
    }

    pub fn public_dir(&self) -> PathBuf {
        self.root().join("public")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root().join("dist").join("img")
    }

    /// Add a small JPEG at a path relative to the site root.
    pub fn add_image(&self, rel: &str) -> PathBuf {
        let path = self.root().join(rel);
        create_test_jpeg(&path, 64, 48);
        path
    }

    /// A valid config writing into this site's `dist/img`.
    pub fn config(&self) -> PluginConfig {
        PluginConfig {
            output_dir: self.output_dir().to_string_lossy().into_owned(),
            public_path: "/img".into(),
            formats: vec!["webp".into()],
            ..PluginConfig::default()
        }
    }

    /// Pass context for a document at `content/<doc>`.
    pub fn context(&self, doc: &str) -> PassContext {
        PassContext::new(self.public_dir(), self.root().join("content").join(doc))
    }
}

// =========================================================================
// Counting generator
// =========================================================================

/// [`VariantGenerator`] that plans variants without encoding anything and
/// counts how often it was invoked.
///
/// Every source reports the same native dimensions. Sources whose path
/// contains a configured marker fail (or panic) instead. With a delay set,
/// each call sleeps while counted as running, and the highest number of
/// overlapping calls is kept in `peak()`.
pub struct CountingGenerator {
    calls: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
    delay: Option<Duration>,
    width: u32,
    height: u32,
    fail_marker: Option<String>,
    panic_marker: Option<String>,
}

impl CountingGenerator {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay: None,
            width,
            height,
            fail_marker: None,
            panic_marker: None,
        }
    }

    /// Fail with an unsupported-type error for sources containing `marker`.
    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_marker = Some(marker.to_string());
        self
    }

    /// Panic for sources containing `marker`.
    pub fn panicking_on(mut self, marker: &str) -> Self {
        self.panic_marker = Some(marker.to_string());
        self
    }

    /// Hold each successful call for `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most calls ever in flight at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl VariantGenerator for CountingGenerator {
    fn generate(&self, request: &GenerateRequest) -> Result<GeneratedImage, GenerateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let source = request.source.to_string_lossy();

        if let Some(marker) = &self.panic_marker
            && source.contains(marker.as_str())
        {
            panic!("transcoder crashed on {source}");
        }
        if let Some(marker) = &self.fail_marker
            && source.contains(marker.as_str())
        {
            return Err(GenerateError::UnsupportedType {
                found: SourceFormat::Gif,
            });
        }

        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        let variants = plan_variants(request, (self.width, self.height))
            .into_iter()
            .map(|(params, url)| Variant {
                width: params.width,
                height: params.height,
                format: params.format,
                output_path: params.output,
                url,
            })
            .collect();

        Ok(GeneratedImage {
            variants,
            width: self.width,
            height: self.height,
            source_format: SourceFormat::Jpeg,
        })
    }
}

/// Shorthand for the `Arc<dyn VariantGenerator>` the orchestrator takes.
pub fn shared(generator: &Arc<CountingGenerator>) -> Arc<dyn VariantGenerator> {
    Arc::clone(generator) as Arc<dyn VariantGenerator>
}
