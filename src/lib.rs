//! # respix
//!
//! Responsive images for content pipelines. respix walks a document tree,
//! finds image nodes, generates resized and re-encoded variants of each
//! referenced file, and rewrites the nodes with `srcset`, `sizes`, and
//! native dimensions, so a renderer can emit a responsive `<img>` without
//! knowing anything about image processing.
//!
//! # Architecture: One Pass Per Document
//!
//! A host pipeline drives a single [`orchestrator::ImageOrchestrator`]
//! through three lifecycle hooks:
//!
//! ```text
//! before_collect    create output_dir
//! process_content   once per document: find images → cache or generate → rewrite nodes
//! after_collect     wait for outstanding jobs, report totals
//! ```
//!
//! Within a pass, every distinct source is generated by exactly one job no
//! matter how many nodes reference it. Across passes, finished results are
//! memoized in a time-bounded cache keyed by source path and output options.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`orchestrator`] | Lifecycle hooks, source resolution, in-pass deduplication, node rewriting |
//! | [`cache`] | `TimedCache` with lazy TTL expiry, cache keys, pass statistics |
//! | [`queue`] | Bounded-concurrency FIFO job runner on a dedicated rayon pool |
//! | [`document`] | `{type, attrs, content}` node tree and index-path traversal |
//! | [`responsive`] | `srcset` / `sizes` construction and the attributes merged into nodes |
//! | [`imaging`] | `VariantGenerator` contract and the pure-Rust default transcoder |
//! | [`naming`] | Variant filename and public URL conventions |
//! | [`config`] | `respix.toml` loading, layering, and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Generation Behind a Trait
//!
//! The orchestrator never touches pixels. It talks to an
//! [`imaging::VariantGenerator`], which receives a source path plus the
//! requested sizes and formats and reports back the variants it wrote. The
//! default [`imaging::BackendGenerator`] over [`imaging::RustBackend`] uses
//! the `image` crate (Lanczos3 resampling, rav1e for AVIF), so there are no
//! system dependencies. Tests swap in generators that count calls or fail
//! on demand.
//!
//! ## Jobs Never See Nodes
//!
//! Generation jobs run on worker threads but receive only a path and
//! options. The calling thread keeps the only mutable reference to the
//! document and applies each job's result to its waiting nodes after the
//! job finishes. No locks guard the tree, and a failed job cannot leave a
//! half-written node behind.
//!
//! ## Options in the Cache Key
//!
//! A cache key is the canonical source path plus a SHA-256 fingerprint of
//! formats, quality, sizes, and public path. Changing any of those misses
//! the cache instead of serving attributes that point at the wrong files.

pub mod cache;
pub mod config;
pub mod document;
pub mod imaging;
pub mod naming;
pub mod orchestrator;
pub mod output;
pub mod queue;
pub mod responsive;

#[cfg(test)]
pub(crate) mod test_helpers;
