//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations every backend must
//! support: identify, detect_format, and resize. A backend may also override
//! [`ImageBackend::resize_all`] to decode a source once for a whole batch of
//! variants.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend): pure Rust, no system
//! libraries.

use super::params::ResizeParams;
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Detected type of a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Jpeg,
    Png,
    Webp,
    Avif,
    Gif,
    Tiff,
    Bmp,
    Other,
}

impl SourceFormat {
    /// Source types the default backend can decode.
    pub const SUPPORTED: [SourceFormat; 4] = [Self::Jpeg, Self::Png, Self::Webp, Self::Avif];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Avif => "avif",
            Self::Gif => "gif",
            Self::Tiff => "tiff",
            Self::Bmp => "bmp",
            Self::Other => "unknown",
        }
    }

    pub fn is_supported(self) -> bool {
        Self::SUPPORTED.contains(&self)
    }

    /// Best guess from a file extension.
    pub fn from_extension(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Self::Jpeg,
            "png" => Self::Png,
            "webp" => Self::Webp,
            "avif" => Self::Avif,
            "gif" => Self::Gif,
            "tif" | "tiff" => Self::Tiff,
            "bmp" => Self::Bmp,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for image processing backends.
///
/// `Send + Sync` because generation jobs run on worker threads and share one
/// backend instance.
pub trait ImageBackend: Send + Sync {
    /// Get image dimensions.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Detect the source type from file content.
    fn detect_format(&self, path: &Path) -> Result<SourceFormat, BackendError>;

    /// Decode, resize, and encode one variant.
    fn resize(&self, params: &ResizeParams) -> Result<(), BackendError>;

    /// Produce every variant in `targets`, stopping at the first failure.
    ///
    /// Targets for the same source are expected to be adjacent.
    fn resize_all(&self, targets: &[ResizeParams]) -> Result<(), BackendError> {
        targets.iter().try_for_each(|params| self.resize(params))
    }
}
