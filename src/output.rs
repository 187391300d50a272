//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Process
//!
//! One block per document, then a run summary:
//!
//! ```text
//! content/post.json → out/post.json
//!     1 cached, 2 generated, 1 skipped (4 total)
//!     Failed to process image /missing.jpg: cannot resolve public/missing.jpg: No such file or directory (os error 2)
//! content/about.json
//!     no images
//!
//! Processed 2 documents: 1 cached, 2 generated, 1 skipped (4 total)
//! ```
//!
//! ## Check
//!
//! ```text
//! Config
//!     Output: dist/_img
//!     Public: /_img
//!     Formats: avif, webp
//!     Sizes: sm 640px, md 1024px, lg 1920px
//!     Quality: 80
//!     Concurrency: 4
//!     Cache timeout: 3600s
//! ```
//!
//! # Architecture
//!
//! Each report has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure:
//! no I/O, no side effects.

use crate::cache::ProcessStats;
use crate::config::ProcessOptions;
use crate::orchestrator::ErrorRecord;
use std::path::Path;

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

// ============================================================================
// Process
// ============================================================================

/// Format the outcome of one document: header, counts, then each error.
pub fn format_document_result(
    source: &Path,
    dest: Option<&Path>,
    stats: &ProcessStats,
    errors: &[ErrorRecord],
) -> Vec<String> {
    let mut lines = Vec::new();
    match dest {
        Some(dest) => lines.push(format!("{} → {}", source.display(), dest.display())),
        None => lines.push(source.display().to_string()),
    }

    if stats.total() == 0 {
        lines.push(format!("{}no images", indent(1)));
    } else {
        lines.push(format!("{}{}", indent(1), stats));
    }

    for err in errors {
        lines.push(format!("{}{}", indent(1), err));
    }
    lines
}

pub fn print_document_result(
    source: &Path,
    dest: Option<&Path>,
    stats: &ProcessStats,
    errors: &[ErrorRecord],
) {
    for line in format_document_result(source, dest, stats, errors) {
        println!("{}", line);
    }
}

/// Format the closing summary of a `process` run.
pub fn format_run_summary(documents: usize, stats: &ProcessStats) -> Vec<String> {
    vec![
        String::new(),
        format!("Processed {}: {}", plural(documents, "document"), stats),
    ]
}

pub fn print_run_summary(documents: usize, stats: &ProcessStats) {
    for line in format_run_summary(documents, stats) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

/// Format the effective configuration.
pub fn format_config(options: &ProcessOptions) -> Vec<String> {
    let formats: Vec<&str> = options.formats.iter().map(|f| f.as_str()).collect();
    let sizes = if options.sizes.is_empty() {
        "none".to_string()
    } else {
        options
            .sizes
            .iter()
            .map(|s| format!("{} {}px", s.suffix, s.width))
            .collect::<Vec<_>>()
            .join(", ")
    };

    vec![
        "Config".to_string(),
        format!("{}Output: {}", indent(1), options.output_dir.display()),
        format!("{}Public: {}", indent(1), options.public_path),
        format!("{}Formats: {}", indent(1), formats.join(", ")),
        format!("{}Sizes: {}", indent(1), sizes),
        format!("{}Quality: {}", indent(1), options.quality.value()),
        format!("{}Concurrency: {}", indent(1), options.concurrency),
        format!(
            "{}Cache timeout: {}s",
            indent(1),
            options.cache_ttl.as_secs()
        ),
    ]
}

pub fn print_config(options: &ProcessOptions) {
    for line in format_config(options) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PluginConfig;

    // =========================================================================
    // Process output
    // =========================================================================

    #[test]
    fn document_with_output_path() {
        let stats = ProcessStats {
            cached: 1,
            generated: 2,
            skipped: 1,
            ..ProcessStats::default()
        };
        let lines = format_document_result(
            Path::new("content/post.json"),
            Some(Path::new("out/post.json")),
            &stats,
            &[],
        );
        assert_eq!(
            lines,
            vec![
                "content/post.json → out/post.json",
                "    1 cached, 2 generated, 1 skipped (4 total)",
            ]
        );
    }

    #[test]
    fn document_without_images() {
        let lines = format_document_result(
            Path::new("about.json"),
            None,
            &ProcessStats::default(),
            &[],
        );
        assert_eq!(lines, vec!["about.json", "    no images"]);
    }

    #[test]
    fn errors_listed_after_counts() {
        let stats = ProcessStats {
            failed: 1,
            ..ProcessStats::default()
        };
        let errors = vec![ErrorRecord {
            message: "Failed to process image /a.jpg: boom".into(),
        }];
        let lines = format_document_result(Path::new("post.json"), None, &stats, &errors);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "    0 cached, 0 generated, 1 failed (1 total)");
        assert_eq!(lines[2], "    Failed to process image /a.jpg: boom");
    }

    #[test]
    fn run_summary_pluralizes() {
        let stats = ProcessStats {
            generated: 3,
            deduplicated: 2,
            ..ProcessStats::default()
        };
        assert_eq!(
            format_run_summary(1, &stats)[1],
            "Processed 1 document: 0 cached, 3 generated, 2 shared (5 total)"
        );
        assert!(format_run_summary(4, &stats)[1].starts_with("Processed 4 documents:"));
    }

    // =========================================================================
    // Check output
    // =========================================================================

    #[test]
    fn config_report() {
        let options = PluginConfig {
            output_dir: "dist/_img".into(),
            public_path: "/_img".into(),
            formats: vec!["avif".into(), "webp".into()],
            ..PluginConfig::default()
        }
        .resolve()
        .unwrap();

        let lines = format_config(&options);
        assert_eq!(lines[0], "Config");
        assert!(lines.contains(&"    Formats: avif, webp".to_string()));
        assert!(lines.contains(&"    Sizes: sm 640px, md 1024px, lg 1920px".to_string()));
        assert!(lines.contains(&"    Cache timeout: 3600s".to_string()));
    }

    #[test]
    fn config_report_without_sizes() {
        let options = PluginConfig {
            output_dir: "out".into(),
            public_path: "/".into(),
            formats: vec!["png".into()],
            sizes: vec![],
            ..PluginConfig::default()
        }
        .resolve()
        .unwrap();

        assert!(format_config(&options).contains(&"    Sizes: none".to_string()));
    }
}
