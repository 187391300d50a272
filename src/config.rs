//! Plugin configuration.
//!
//! Handles loading, layering, and validating `respix.toml`. Several files can
//! be given; each one overrides the keys it sets on top of the previous
//! layers, which sit on top of the stock defaults.
//!
//! ## Configuration Options
//!
//! ```toml
//! output_dir = "dist/_img"         # Where variants are written (required)
//! public_path = "/_img"            # URL prefix for variants (required)
//! formats = ["avif", "webp"]       # Output formats, in srcset order (required)
//! quality = 80                     # Encoder quality, 1-100
//! concurrency = 4                  # Max parallel generation jobs
//! cache_timeout = 3600             # Seconds a processed image stays memoized
//!
//! [[sizes]]
//! width = 640
//! suffix = "sm"
//!
//! [[sizes]]
//! width = 1024
//! suffix = "md"
//! ```
//!
//! Unknown keys are rejected to catch typos early. Validation happens before
//! anything is constructed and every error message names the offending field.

use crate::cache::hash_options;
use crate::imaging::{GenerateRequest, OutputFormat, Quality, SizeSpec};
use crate::queue::DEFAULT_CONCURRENCY;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Raw plugin configuration as written in `respix.toml`.
///
/// Required fields default to empty so that a missing key is reported by
/// [`validate`](Self::validate) with the field's name, the same as an
/// explicitly empty one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PluginConfig {
    /// Directory generated variants are written to.
    pub output_dir: String,
    /// Public URL prefix under which `output_dir` is served.
    pub public_path: String,
    /// Output formats, in the order they appear in `srcset`.
    pub formats: Vec<String>,
    /// Encoder quality (1 = worst, 100 = best).
    pub quality: u32,
    /// Target widths and their filename suffixes.
    pub sizes: Vec<SizeSpec>,
    /// Maximum number of generation jobs running at once.
    pub concurrency: usize,
    /// Seconds a processed image stays in the cache.
    pub cache_timeout: u64,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            output_dir: String::new(),
            public_path: String::new(),
            formats: Vec::new(),
            quality: Quality::default().value(),
            sizes: default_sizes(),
            concurrency: DEFAULT_CONCURRENCY,
            cache_timeout: 3600,
        }
    }
}

fn default_sizes() -> Vec<SizeSpec> {
    vec![
        SizeSpec::new(640, "sm"),
        SizeSpec::new(1024, "md"),
        SizeSpec::new(1920, "lg"),
    ]
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

impl PluginConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output_dir.trim().is_empty() {
            return Err(invalid("output_dir must not be empty"));
        }
        if self.public_path.trim().is_empty() {
            return Err(invalid("public_path must not be empty"));
        }
        self.output_formats()?;
        if !(1..=100).contains(&self.quality) {
            return Err(invalid(format!(
                "quality must be 1-100 (got {})",
                self.quality
            )));
        }
        let mut suffixes = HashSet::new();
        for (i, size) in self.sizes.iter().enumerate() {
            if size.width == 0 {
                return Err(invalid(format!(
                    "sizes[{i}].width must be a positive integer"
                )));
            }
            if size.suffix.trim().is_empty() {
                return Err(invalid(format!("sizes[{i}].suffix must not be empty")));
            }
            if !suffixes.insert(size.suffix.as_str()) {
                return Err(invalid(format!(
                    "sizes[{i}].suffix '{}' is used more than once",
                    size.suffix
                )));
            }
        }
        if self.concurrency == 0 {
            return Err(invalid("concurrency must be a positive integer"));
        }
        if self.cache_timeout == 0 {
            return Err(invalid("cache_timeout must be a positive number of seconds"));
        }
        Ok(())
    }

    /// Parse `formats` into [`OutputFormat`]s.
    pub fn output_formats(&self) -> Result<Vec<OutputFormat>, ConfigError> {
        if self.formats.is_empty() {
            return Err(invalid("formats must not be empty"));
        }
        self.formats
            .iter()
            .map(|f| f.parse().map_err(|e| invalid(format!("formats: {e}"))))
            .collect()
    }

    /// Validate and convert into the typed options the orchestrator runs on.
    pub fn resolve(&self) -> Result<ProcessOptions, ConfigError> {
        self.validate()?;
        Ok(ProcessOptions {
            output_dir: PathBuf::from(&self.output_dir),
            public_path: self.public_path.clone(),
            formats: self.output_formats()?,
            quality: Quality::new(self.quality),
            sizes: self.sizes.clone(),
            concurrency: self.concurrency,
            cache_ttl: Duration::from_secs(self.cache_timeout),
        })
    }
}

/// Validated, typed configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOptions {
    pub output_dir: PathBuf,
    pub public_path: String,
    pub formats: Vec<OutputFormat>,
    pub quality: Quality,
    pub sizes: Vec<SizeSpec>,
    pub concurrency: usize,
    pub cache_ttl: Duration,
}

impl ProcessOptions {
    /// Fingerprint of everything that shapes generated output.
    pub fn fingerprint(&self) -> String {
        let formats: Vec<&str> = self.formats.iter().map(|f| f.as_str()).collect();
        let sizes: Vec<(u32, &str)> = self
            .sizes
            .iter()
            .map(|s| (s.width, s.suffix.as_str()))
            .collect();
        hash_options(&formats, self.quality.value(), &sizes, &self.public_path)
    }

    /// Request template; the orchestrator fills in the source per job.
    pub fn generate_request(&self, source: &Path) -> GenerateRequest {
        GenerateRequest {
            source: source.to_path_buf(),
            output_dir: self.output_dir.clone(),
            sizes: self.sizes.clone(),
            formats: self.formats.clone(),
            quality: self.quality,
            public_path: self.public_path.clone(),
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer that user files are merged on top of.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(PluginConfig::default())
        .map_err(|e| invalid(format!("stock defaults do not serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely, so an
///   overlay's `sizes` array replaces the whole list.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load and layer config files, then validate the result.
///
/// Files are applied in order on top of the stock defaults; a missing file
/// is an error.
pub fn load_config(paths: &[&Path]) -> Result<PluginConfig, ConfigError> {
    let mut merged = stock_defaults_value()?;
    for path in paths {
        let content = fs::read_to_string(path)?;
        let layer: toml::Value = toml::from_str(&content)?;
        merged = merge_toml(merged, layer);
    }
    let config: PluginConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `respix.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# respix configuration
# =====================
# output_dir, public_path, and formats are required.
# Everything else is optional; values shown below are the defaults.
# Unknown keys will cause an error.

# Directory generated variants are written to. Created before processing.
output_dir = "dist/_img"

# URL prefix under which output_dir is served. Every srcset URL is
# public_path + "/" + filename.
public_path = "/_img"

# Output formats, in the order they appear in srcset.
# Supported: webp, avif, jpeg, png.
formats = ["webp"]

# Encoder quality (1 = worst, 100 = best). Passed through to the encoder
# verbatim; lossless encoders ignore it.
quality = 80

# Maximum number of images generated at the same time.
concurrency = 4

# Seconds a processed image stays memoized before it is regenerated.
cache_timeout = 3600

# ---------------------------------------------------------------------------
# Target widths. Each produces one file per format, named
# <source-stem>-<suffix>.<ext>. Widths larger than the source are clamped
# to the source width; images are never upscaled.
# ---------------------------------------------------------------------------
[[sizes]]
width = 640
suffix = "sm"

[[sizes]]
width = 1024
suffix = "md"

[[sizes]]
width = 1920
suffix = "lg"
"##
}
