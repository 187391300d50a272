//! Pure calculation functions for variant dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Dimensions of one variant to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantSize {
    /// Width that was asked for in config.
    pub requested: u32,
    /// Output width, never larger than the source.
    pub width: u32,
    /// Output height, scaled proportionally.
    pub height: u32,
}

/// Calculate the output dimensions for a requested width.
///
/// The width is clamped to the source width (no upscaling) and the height
/// follows from the source aspect ratio, rounded to the nearest pixel and
/// never below 1.
///
/// # Examples
/// ```
/// # use respix::imaging::calculate_variant_size;
/// // 1920x1080 at 640 wide → 640x360
/// let v = calculate_variant_size((1920, 1080), 640);
/// assert_eq!((v.width, v.height), (640, 360));
///
/// // Requests wider than the source are clamped
/// let v = calculate_variant_size((800, 600), 1024);
/// assert_eq!((v.width, v.height), (800, 600));
/// ```
pub fn calculate_variant_size(source: (u32, u32), requested: u32) -> VariantSize {
    let (src_w, src_h) = source;
    let width = requested.min(src_w);
    let height = if src_w == 0 {
        0
    } else {
        ((src_h as f64 * width as f64 / src_w as f64).round() as u32).max(1)
    };
    VariantSize {
        requested,
        width,
        height,
    }
}
