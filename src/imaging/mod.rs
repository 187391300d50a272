//! Image processing in pure Rust, with no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Detect type** | `image::ImageReader::with_guessed_format` |
//! | **Identify** | `image::ImageReader::into_dimensions` |
//! | **Resize → WebP/AVIF/JPEG/PNG** | Lanczos3 + `image` codecs (rav1e for AVIF) |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Generator**: [`VariantGenerator`] contract + [`BackendGenerator`], which
//!   turns a request into one variant per size × format

pub mod backend;
mod calculations;
pub mod generator;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend, SourceFormat};
pub use calculations::{VariantSize, calculate_variant_size};
pub use generator::{
    BackendGenerator, GenerateError, GenerateRequest, GeneratedImage, Variant, VariantGenerator,
    plan_variants,
};
pub use params::{OutputFormat, Quality, ResizeParams, SizeSpec};
pub use rust_backend::RustBackend;
