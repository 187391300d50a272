//! Responsive attribute construction: `srcset`, `sizes`, and dimensions.
//!
//! [`ProcessedAttributes`] is what a successfully processed image node gains.
//! It is built once per source by the generation job, stored in the cache,
//! and shared (behind an `Arc`) by every node that references that source.
//!
//! ## `srcset`
//!
//! One `"{url} {width}w"` candidate per variant, in generation order (sizes
//! outer, formats inner), joined with `", "`:
//!
//! ```text
//! /img/sunset-sm.avif 640w, /img/sunset-sm.webp 640w, /img/sunset-md.avif 1024w, ...
//! ```
//!
//! ## `sizes`
//!
//! One `(max-width: Npx) 100vw` condition per distinct variant width, in
//! ascending order, followed by the largest width as the fallback slot:
//!
//! ```text
//! (max-width: 640px) 100vw, (max-width: 1024px) 100vw, 1024px
//! ```
//!
//! The image fills the viewport until the viewport outgrows the largest
//! variant, after which it is shown at that variant's natural width.

use crate::document::Attrs;
use crate::imaging::GeneratedImage;
use serde_json::Value;

/// Computed attributes merged into an image node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedAttributes {
    pub srcset: String,
    pub sizes: String,
    /// Native width of the source image.
    pub width: u32,
    /// Native height of the source image.
    pub height: u32,
    /// The `src` as written in the document.
    pub original_src: String,
}

impl ProcessedAttributes {
    pub fn from_generated(generated: &GeneratedImage, original_src: &str) -> Self {
        let widths: Vec<u32> = generated.variants.iter().map(|v| v.width).collect();
        Self {
            srcset: build_srcset(generated),
            sizes: build_sizes(&widths),
            width: generated.width,
            height: generated.height,
            original_src: original_src.to_string(),
        }
    }

    /// The computed fields as node attributes, keyed as the host expects.
    pub fn to_attrs(&self) -> Attrs {
        self.attrs_with_src(&self.original_src)
    }

    /// Like [`to_attrs`](Self::to_attrs), but reporting `src` as the
    /// original. Shared results are applied to nodes that may have spelled
    /// the same file differently.
    pub fn attrs_with_src(&self, src: &str) -> Attrs {
        let mut attrs = Attrs::new();
        attrs.insert("srcset".into(), Value::from(self.srcset.clone()));
        attrs.insert("sizes".into(), Value::from(self.sizes.clone()));
        attrs.insert("width".into(), Value::from(self.width));
        attrs.insert("height".into(), Value::from(self.height));
        attrs.insert("originalSrc".into(), Value::from(src));
        attrs
    }
}

/// Serialize variants into a `srcset` value.
pub fn build_srcset(generated: &GeneratedImage) -> String {
    generated
        .variants
        .iter()
        .map(|v| format!("{} {}w", v.url, v.width))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build a `sizes` value from the variant widths.
pub fn build_sizes(widths: &[u32]) -> String {
    let mut distinct: Vec<u32> = widths.to_vec();
    distinct.sort_unstable();
    distinct.dedup();

    let Some(&largest) = distinct.last() else {
        return "100vw".to_string();
    };

    let mut parts: Vec<String> = distinct
        .iter()
        .map(|w| format!("(max-width: {}px) 100vw", w))
        .collect();
    parts.push(format!("{}px", largest));
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::{OutputFormat, SourceFormat, Variant};
    use serde_json::json;

    fn variant(width: u32, height: u32, format: OutputFormat, name: &str) -> Variant {
        Variant {
            width,
            height,
            format,
            output_path: format!("/out/{name}").into(),
            url: format!("/img/{name}"),
        }
    }

    fn generated(variants: Vec<Variant>) -> GeneratedImage {
        GeneratedImage {
            variants,
            width: 1920,
            height: 1080,
            source_format: SourceFormat::Jpeg,
        }
    }

    #[test]
    fn srcset_lists_every_variant_in_order() {
        let g = generated(vec![
            variant(640, 360, OutputFormat::Avif, "a-sm.avif"),
            variant(640, 360, OutputFormat::Webp, "a-sm.webp"),
            variant(1024, 576, OutputFormat::Avif, "a-md.avif"),
        ]);
        assert_eq!(
            build_srcset(&g),
            "/img/a-sm.avif 640w, /img/a-sm.webp 640w, /img/a-md.avif 1024w"
        );
    }

    #[test]
    fn sizes_single_width() {
        assert_eq!(build_sizes(&[640]), "(max-width: 640px) 100vw, 640px");
    }

    #[test]
    fn sizes_dedups_and_sorts() {
        assert_eq!(
            build_sizes(&[1024, 640, 640, 1024]),
            "(max-width: 640px) 100vw, (max-width: 1024px) 100vw, 1024px"
        );
    }

    #[test]
    fn sizes_without_variants_fills_viewport() {
        assert_eq!(build_sizes(&[]), "100vw");
    }

    #[test]
    fn from_generated_uses_source_dimensions() {
        let g = generated(vec![variant(640, 360, OutputFormat::Webp, "a-sm.webp")]);
        let attrs = ProcessedAttributes::from_generated(&g, "/a.jpg");

        assert_eq!(attrs.width, 1920);
        assert_eq!(attrs.height, 1080);
        assert_eq!(attrs.original_src, "/a.jpg");
        assert!(attrs.srcset.contains("640w"));
        assert!(attrs.sizes.contains("vw"));
    }

    #[test]
    fn to_attrs_uses_host_key_names() {
        let attrs = ProcessedAttributes {
            srcset: "/img/a-sm.webp 640w".into(),
            sizes: "(max-width: 640px) 100vw, 640px".into(),
            width: 1920,
            height: 1080,
            original_src: "/a.jpg".into(),
        }
        .to_attrs();

        assert_eq!(attrs.len(), 5);
        assert_eq!(attrs["srcset"], json!("/img/a-sm.webp 640w"));
        assert_eq!(attrs["width"], json!(1920));
        assert_eq!(attrs["height"], json!(1080));
        assert_eq!(attrs["originalSrc"], json!("/a.jpg"));
    }

    #[test]
    fn attrs_with_src_overrides_original() {
        let processed = ProcessedAttributes {
            srcset: "/img/a-sm.webp 640w".into(),
            sizes: "640px".into(),
            width: 640,
            height: 480,
            original_src: "/a.jpg".into(),
        };

        let attrs = processed.attrs_with_src("./a.jpg");
        assert_eq!(attrs.len(), 5);
        assert_eq!(attrs["originalSrc"], json!("./a.jpg"));
        assert_eq!(attrs["srcset"], json!("/img/a-sm.webp 640w"));
    }
}
