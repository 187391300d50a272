//! Variant generation: the boundary between orchestration and pixels.
//!
//! The orchestrator only knows the [`VariantGenerator`] contract: hand it a
//! source image and the requested sizes/formats, get back one [`Variant`]
//! per (size × format) plus the source's native dimensions.
//!
//! [`BackendGenerator`] is the default implementation. It combines the pure
//! dimension math from [`calculations`](super::calculations) with any
//! [`ImageBackend`], so the generation logic can be tested against a
//! recording mock without encoding a single pixel.
//!
//! Output ordering is part of the contract: sizes outer, formats inner,
//! both in the order they were requested. `srcset` serialization relies on
//! it.

use super::backend::{BackendError, ImageBackend, SourceFormat};
use super::calculations::calculate_variant_size;
use super::params::{OutputFormat, Quality, ResizeParams, SizeSpec};
use crate::naming::{public_url, source_stem, variant_filename};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("unsupported image type '{found}' (supported: jpeg, png, webp, avif)")]
    UnsupportedType { found: SourceFormat },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Everything a generator needs to produce the variants of one source.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub source: PathBuf,
    pub output_dir: PathBuf,
    pub sizes: Vec<SizeSpec>,
    pub formats: Vec<OutputFormat>,
    pub quality: Quality,
    pub public_path: String,
}

/// One generated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    pub output_path: PathBuf,
    pub url: String,
}

/// Outcome of generating all variants for a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub variants: Vec<Variant>,
    /// Native width of the source.
    pub width: u32,
    /// Native height of the source.
    pub height: u32,
    pub source_format: SourceFormat,
}

/// External transcoder contract.
pub trait VariantGenerator: Send + Sync {
    fn generate(&self, request: &GenerateRequest) -> Result<GeneratedImage, GenerateError>;
}

/// [`VariantGenerator`] that drives an [`ImageBackend`].
pub struct BackendGenerator<B> {
    backend: B,
}

impl<B: ImageBackend> BackendGenerator<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

/// Plan every resize for a request without executing any of them.
///
/// Useful for testing parameter generation.
pub fn plan_variants(
    request: &GenerateRequest,
    source_dims: (u32, u32),
) -> Vec<(ResizeParams, String)> {
    let stem = source_stem(&request.source);
    let mut plan = Vec::with_capacity(request.sizes.len() * request.formats.len());

    for size in &request.sizes {
        let dims = calculate_variant_size(source_dims, size.width);
        for &format in &request.formats {
            let filename = variant_filename(&stem, &size.suffix, format);
            plan.push((
                ResizeParams {
                    source: request.source.clone(),
                    output: request.output_dir.join(&filename),
                    width: dims.width,
                    height: dims.height,
                    format,
                    quality: request.quality,
                },
                public_url(&request.public_path, &filename),
            ));
        }
    }

    plan
}

impl<B: ImageBackend> VariantGenerator for BackendGenerator<B> {
    fn generate(&self, request: &GenerateRequest) -> Result<GeneratedImage, GenerateError> {
        let source_format = self.backend.detect_format(&request.source)?;
        if !source_format.is_supported() {
            return Err(GenerateError::UnsupportedType {
                found: source_format,
            });
        }

        let dims = self.backend.identify(&request.source)?;
        let (targets, urls): (Vec<ResizeParams>, Vec<String>) =
            plan_variants(request, (dims.width, dims.height))
                .into_iter()
                .unzip();

        self.backend.resize_all(&targets)?;

        let variants = targets
            .into_iter()
            .zip(urls)
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
            width: dims.width,
            height: dims.height,
            source_format,
        })
    }
}
