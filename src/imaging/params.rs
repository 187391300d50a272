//! Parameter types for image operations.
//!
//! These structs describe *what* to produce, not *how*. They sit between the
//! [`generator`](super::generator) (which decides which variants to create)
//! and the [`backend`](super::backend) (which does the pixel work), so a mock
//! backend can stand in without touching generation logic.
//!
//! ## Types
//!
//! - [`Quality`]: lossy encoding quality (1–100, default 80). Clamped on construction.
//! - [`OutputFormat`]: one of the encodable output formats.
//! - [`SizeSpec`]: a requested target width and the filename suffix for it.
//! - [`ResizeParams`]: full specification for one resize: source, output, dimensions, format, quality.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

/// Encodable output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Webp,
    Avif,
    Jpeg,
    Png,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [Self::Webp, Self::Avif, Self::Jpeg, Self::Png];

    /// Name as written in config.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Webp => "webp",
            Self::Avif => "avif",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("unsupported format '{s}' (expected webp, avif, jpeg, png)"))
    }
}

/// A requested output width and the suffix appended to its filenames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SizeSpec {
    pub width: u32,
    pub suffix: String,
}

impl SizeSpec {
    pub fn new(width: u32, suffix: &str) -> Self {
        Self {
            width,
            suffix: suffix.to_string(),
        }
    }
}

/// Parameters for a single resize-and-encode operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeParams {
    pub source: PathBuf,
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    pub quality: Quality,
}
