//! Output filename and URL conventions for generated variants.
//!
//! Every variant is named from the source's base name, the size suffix, and
//! the output format's extension:
//!
//! - `photos/sunset.jpg`, suffix `sm`, WebP → `sunset-sm.webp`
//! - `hero.png`, suffix `1x`, JPEG → `hero-1x.jpg`
//!
//! URLs are the configured public path joined to the filename with exactly
//! one slash, whether or not the public path carries a trailing one:
//!
//! - `/images` + `sunset-sm.webp` → `/images/sunset-sm.webp`
//! - `/images/` + `sunset-sm.webp` → `/images/sunset-sm.webp`
//! - `https://cdn.example.com/img` + `a-sm.avif` → `https://cdn.example.com/img/a-sm.avif`

use crate::imaging::OutputFormat;
use std::path::Path;

/// Base name of a source file without its extension.
///
/// Falls back to `"image"` for paths with no usable file stem.
pub fn source_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "image".to_string())
}

/// Filename for one variant: `{stem}-{suffix}.{ext}`.
pub fn variant_filename(stem: &str, suffix: &str, format: OutputFormat) -> String {
    format!("{}-{}.{}", stem, suffix, format.extension())
}

/// Public URL for a generated file.
pub fn public_url(public_path: &str, filename: &str) -> String {
    format!("{}/{}", public_path.trim_end_matches('/'), filename)
}

/// Whether a `src` points somewhere other than the local filesystem.
///
/// Matches absolute URLs, protocol-relative URLs, and inline data URIs.
pub fn is_remote_src(src: &str) -> bool {
    let lower = src.trim_start().to_ascii_lowercase();
    lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("//")
        || lower.starts_with("data:")
}
