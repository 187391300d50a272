//! Pure Rust image processing backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Detect type | `image::ImageReader::with_guessed_format` (magic bytes), extension fallback |
//! | Identify | `image::ImageReader::into_dimensions` (header only) |
//! | Decode (JPEG, PNG, WebP) | `image` crate decoders |
//! | Decode (AVIF) | `avif-parse` (container) + `rav1d` (AV1 decode) + BT.601 YUV→RGB |
//! | Identify (AVIF) | `avif-parse` container metadata |
//! | Resize | `image::DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode → WebP | `image::codecs::webp::WebPEncoder` (lossless; quality has no effect) |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6) |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` with quality |
//! | Encode → PNG | `image::codecs::png::PngEncoder` |
//!
//! The `image` crate's `"avif"` feature only enables the encoder, so AVIF
//! sources take a separate decode path.
//!
//! A batch of variants from one source decodes that source once, and
//! variants sharing dimensions share one resize.

use super::backend::{BackendError, Dimensions, ImageBackend, SourceFormat};
use super::params::{OutputFormat, ResizeParams};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn map_format(format: ImageFormat) -> SourceFormat {
    match format {
        ImageFormat::Jpeg => SourceFormat::Jpeg,
        ImageFormat::Png => SourceFormat::Png,
        ImageFormat::WebP => SourceFormat::Webp,
        ImageFormat::Avif => SourceFormat::Avif,
        ImageFormat::Gif => SourceFormat::Gif,
        ImageFormat::Tiff => SourceFormat::Tiff,
        ImageFormat::Bmp => SourceFormat::Bmp,
        _ => SourceFormat::Other,
    }
}

/// Content sniff first, extension when the magic bytes are unknown.
fn is_avif(path: &Path) -> Result<bool, BackendError> {
    let sniffed = ImageReader::open(path)?.with_guessed_format()?.format();
    Ok(match sniffed {
        Some(format) => format == ImageFormat::Avif,
        None => SourceFormat::from_extension(path) == SourceFormat::Avif,
    })
}

/// Load and decode an image from disk, sniffing the format from content.
fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    if is_avif(path)? {
        return decode_avif(path);
    }
    ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
        })
}

fn parse_avif(path: &Path, data: &[u8]) -> Result<avif_parse::AvifData, BackendError> {
    avif_parse::read_avif(&mut std::io::Cursor::new(data)).map_err(|e| {
        BackendError::ProcessingFailed(format!("Failed to parse AVIF {}: {e:?}", path.display()))
    })
}

/// Dimensions from the AVIF container, without decoding any pixels.
fn identify_avif(path: &Path) -> Result<Dimensions, BackendError> {
    let data = std::fs::read(path)?;
    let meta = parse_avif(path, &data)?
        .primary_item_metadata()
        .map_err(|e| {
            BackendError::ProcessingFailed(format!(
                "Failed to read AVIF metadata {}: {e:?}",
                path.display()
            ))
        })?;
    Ok(Dimensions {
        width: meta.max_frame_width.get(),
        height: meta.max_frame_height.get(),
    })
}

fn rav1d_failed(step: &str, code: i32) -> BackendError {
    BackendError::ProcessingFailed(format!("rav1d {step} failed ({code})"))
}

/// Decode the primary item of an AVIF file to RGB8.
fn decode_avif(path: &Path) -> Result<DynamicImage, BackendError> {
    use rav1d::include::dav1d::data::Dav1dData;
    use rav1d::include::dav1d::dav1d::Dav1dSettings;
    use rav1d::include::dav1d::headers::{
        DAV1D_PIXEL_LAYOUT_I400, DAV1D_PIXEL_LAYOUT_I420, DAV1D_PIXEL_LAYOUT_I422,
        DAV1D_PIXEL_LAYOUT_I444,
    };
    use rav1d::include::dav1d::picture::Dav1dPicture;
    use rav1d::src::lib as dav1d;
    use std::ptr::NonNull;

    let file_data = std::fs::read(path)?;
    let avif = parse_avif(path, &file_data)?;
    let av1_bytes: &[u8] = &avif.primary_item;

    let mut settings = std::mem::MaybeUninit::<Dav1dSettings>::uninit();
    let settings_ptr = NonNull::new(settings.as_mut_ptr())
        .ok_or_else(|| BackendError::ProcessingFailed("rav1d settings unavailable".into()))?;
    unsafe { dav1d::dav1d_default_settings(settings_ptr) };
    let mut settings = unsafe { settings.assume_init() };
    settings.n_threads = 1;
    settings.max_frame_delay = 1;

    let mut ctx = None;
    let rc = unsafe { dav1d::dav1d_open(NonNull::new(&mut ctx), NonNull::new(&mut settings)) };
    if rc.0 != 0 {
        return Err(rav1d_failed("open", rc.0));
    }

    let mut data = Dav1dData::default();
    let buf_ptr = unsafe { dav1d::dav1d_data_create(NonNull::new(&mut data), av1_bytes.len()) };
    if buf_ptr.is_null() {
        unsafe { dav1d::dav1d_close(NonNull::new(&mut ctx)) };
        return Err(BackendError::ProcessingFailed(
            "rav1d data_create failed".into(),
        ));
    }
    unsafe { std::ptr::copy_nonoverlapping(av1_bytes.as_ptr(), buf_ptr, av1_bytes.len()) };

    let rc = unsafe { dav1d::dav1d_send_data(ctx, NonNull::new(&mut data)) };
    if rc.0 != 0 {
        unsafe {
            dav1d::dav1d_data_unref(NonNull::new(&mut data));
            dav1d::dav1d_close(NonNull::new(&mut ctx));
        }
        return Err(rav1d_failed("send_data", rc.0));
    }

    let mut pic: Dav1dPicture = unsafe { std::mem::zeroed() };
    let rc = unsafe { dav1d::dav1d_get_picture(ctx, NonNull::new(&mut pic)) };
    if rc.0 != 0 {
        unsafe { dav1d::dav1d_close(NonNull::new(&mut ctx)) };
        return Err(rav1d_failed("get_picture", rc.0));
    }

    let width = pic.p.w as u32;
    let height = pic.p.h as u32;
    let layout = pic.p.layout;
    let plane = |i: usize| pic.data[i].map(|p| p.as_ptr() as *const u8);

    let planes = match (layout, plane(0), plane(1), plane(2)) {
        (DAV1D_PIXEL_LAYOUT_I400, Some(y_ptr), _, _) => Ok(YuvPlanes {
            y_ptr,
            u_ptr: y_ptr,
            v_ptr: y_ptr,
            y_stride: pic.stride[0],
            uv_stride: 0,
            width,
            height,
            bpc: pic.p.bpc as u32,
            ss_x: false,
            ss_y: false,
            monochrome: true,
        }),
        (
            DAV1D_PIXEL_LAYOUT_I420 | DAV1D_PIXEL_LAYOUT_I422 | DAV1D_PIXEL_LAYOUT_I444,
            Some(y_ptr),
            Some(u_ptr),
            Some(v_ptr),
        ) => Ok(YuvPlanes {
            y_ptr,
            u_ptr,
            v_ptr,
            y_stride: pic.stride[0],
            uv_stride: pic.stride[1],
            width,
            height,
            bpc: pic.p.bpc as u32,
            ss_x: layout != DAV1D_PIXEL_LAYOUT_I444,
            ss_y: layout == DAV1D_PIXEL_LAYOUT_I420,
            monochrome: false,
        }),
        _ => Err(BackendError::ProcessingFailed(format!(
            "Unsupported AVIF pixel layout: {layout}"
        ))),
    };
    let rgb = planes.map(|planes| planes.to_rgb());

    unsafe {
        dav1d::dav1d_picture_unref(NonNull::new(&mut pic));
        dav1d::dav1d_close(NonNull::new(&mut ctx));
    }

    image::RgbImage::from_raw(width, height, rgb?)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| {
            BackendError::ProcessingFailed("Failed to create image from decoded AVIF data".into())
        })
}

/// Plane pointers of a decoded rav1d picture.
struct YuvPlanes {
    y_ptr: *const u8,
    u_ptr: *const u8,
    v_ptr: *const u8,
    y_stride: isize,
    uv_stride: isize,
    width: u32,
    height: u32,
    bpc: u32,
    /// Chroma subsampling (I420 = both)
    ss_x: bool,
    ss_y: bool,
    monochrome: bool,
}

impl YuvPlanes {
    /// Interleaved RGB8 via BT.601.
    fn to_rgb(&self) -> Vec<u8> {
        let max_val = ((1u32 << self.bpc) - 1) as f32;
        let center = (1u32 << (self.bpc - 1)) as f32;
        let scale = 255.0 / max_val;

        let mut rgb = vec![0u8; (self.width * self.height * 3) as usize];

        for row in 0..self.height {
            for col in 0..self.width {
                let y_val = read_pixel(self.y_ptr, self.y_stride, col, row, self.bpc);

                let (r, g, b) = if self.monochrome {
                    let v = (y_val * scale).clamp(0.0, 255.0);
                    (v, v, v)
                } else {
                    let u_col = if self.ss_x { col / 2 } else { col };
                    let u_row = if self.ss_y { row / 2 } else { row };
                    let cb = read_pixel(self.u_ptr, self.uv_stride, u_col, u_row, self.bpc) - center;
                    let cr = read_pixel(self.v_ptr, self.uv_stride, u_col, u_row, self.bpc) - center;
                    (
                        ((y_val + 1.402 * cr) * scale).clamp(0.0, 255.0),
                        ((y_val - 0.344136 * cb - 0.714136 * cr) * scale).clamp(0.0, 255.0),
                        ((y_val + 1.772 * cb) * scale).clamp(0.0, 255.0),
                    )
                };

                let idx = ((row * self.width + col) * 3) as usize;
                rgb[idx] = r as u8;
                rgb[idx + 1] = g as u8;
                rgb[idx + 2] = b as u8;
            }
        }

        rgb
    }
}

/// One sample from a plane. Depths above 8 bits are stored as u16.
#[inline]
fn read_pixel(ptr: *const u8, stride: isize, x: u32, y: u32, bpc: u32) -> f32 {
    if bpc <= 8 {
        (unsafe { *ptr.offset(y as isize * stride + x as isize) }) as f32
    } else {
        let byte_offset = y as isize * stride + x as isize * 2;
        (unsafe { *(ptr.offset(byte_offset) as *const u16) }) as f32
    }
}

fn encode_failed(format: OutputFormat, e: image::ImageError) -> BackendError {
    BackendError::ProcessingFailed(format!("{} encode failed: {}", format, e))
}

/// Encode `img` into `path` in the requested format.
fn save_image(
    img: &DynamicImage,
    path: &Path,
    format: OutputFormat,
    quality: u8,
) -> Result<(), BackendError> {
    let writer = BufWriter::new(File::create(path)?);
    let encoded = match format {
        OutputFormat::Webp => {
            let encoder = image::codecs::webp::WebPEncoder::new_lossless(writer);
            DynamicImage::from(img.to_rgba8()).write_with_encoder(encoder)
        }
        OutputFormat::Avif => {
            let encoder =
                image::codecs::avif::AvifEncoder::new_with_speed_quality(writer, 6, quality);
            img.write_with_encoder(encoder)
        }
        OutputFormat::Jpeg => {
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(writer, quality);
            DynamicImage::from(img.to_rgb8()).write_with_encoder(encoder)
        }
        OutputFormat::Png => {
            let encoder = image::codecs::png::PngEncoder::new(writer);
            img.write_with_encoder(encoder)
        }
    };
    encoded.map_err(|e| encode_failed(format, e))
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        if is_avif(path)? {
            return identify_avif(path);
        }
        let (width, height) = ImageReader::open(path)?
            .with_guessed_format()?
            .into_dimensions()
            .map_err(|e| {
                BackendError::ProcessingFailed(format!("Failed to read dimensions: {}", e))
            })?;
        Ok(Dimensions { width, height })
    }

    fn detect_format(&self, path: &Path) -> Result<SourceFormat, BackendError> {
        let reader = ImageReader::open(path)?.with_guessed_format()?;
        Ok(reader
            .format()
            .map(map_format)
            .unwrap_or_else(|| SourceFormat::from_extension(path)))
    }

    fn resize(&self, params: &ResizeParams) -> Result<(), BackendError> {
        self.resize_all(std::slice::from_ref(params))
    }

    fn resize_all(&self, targets: &[ResizeParams]) -> Result<(), BackendError> {
        for same_source in targets.chunk_by(|a, b| a.source == b.source) {
            let img = load_image(&same_source[0].source)?;
            for same_size in
                same_source.chunk_by(|a, b| (a.width, a.height) == (b.width, b.height))
            {
                let (width, height) = (same_size[0].width, same_size[0].height);
                let resized = img.resize_exact(width, height, FilterType::Lanczos3);
                for params in same_size {
                    save_image(
                        &resized,
                        &params.output,
                        params.format,
                        params.quality.value() as u8,
                    )?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::params::Quality;
    use crate::test_helpers::create_test_jpeg;
    use std::path::PathBuf;

    #[test]
    fn identify_synthetic_jpeg() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("test.jpg");
        create_test_jpeg(&path, 200, 150);

        let dims = RustBackend::new().identify(&path).unwrap();
        assert_eq!(dims.width, 200);
        assert_eq!(dims.height, 150);
    }

    #[test]
    fn identify_nonexistent_file_errors() {
        let result = RustBackend::new().identify(Path::new("/nonexistent/image.jpg"));
        assert!(matches!(result, Err(BackendError::Io(_))));
    }

    #[test]
    fn detect_format_sniffs_content_not_extension() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("actually-a-jpeg.png");
        create_test_jpeg(&path, 10, 10);

        let format = RustBackend::new().detect_format(&path).unwrap();
        assert_eq!(format, SourceFormat::Jpeg);
    }

    #[test]
    fn detect_format_falls_back_to_extension() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("notes.gif");
        std::fs::write(&path, b"plain text, no magic bytes").unwrap();

        let format = RustBackend::new().detect_format(&path).unwrap();
        assert_eq!(format, SourceFormat::Gif);
    }

    fn resize_to(format: OutputFormat, file: &str) -> Dimensions {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("source.jpg");
        create_test_jpeg(&source, 400, 300);

        let output = tmp.path().join(file);
        let backend = RustBackend::new();
        backend
            .resize(&ResizeParams {
                source,
                output: output.clone(),
                width: 200,
                height: 150,
                format,
                quality: Quality::new(85),
            })
            .unwrap();

        assert!(std::fs::metadata(&output).unwrap().len() > 0);
        backend.identify(&output).unwrap()
    }

    #[test]
    fn resize_synthetic_to_webp() {
        let dims = resize_to(OutputFormat::Webp, "out.webp");
        assert_eq!((dims.width, dims.height), (200, 150));
    }

    #[test]
    fn resize_synthetic_to_jpeg() {
        let dims = resize_to(OutputFormat::Jpeg, "out.jpg");
        assert_eq!((dims.width, dims.height), (200, 150));
    }

    #[test]
    fn resize_synthetic_to_png() {
        let dims = resize_to(OutputFormat::Png, "out.png");
        assert_eq!((dims.width, dims.height), (200, 150));
    }

    #[test]
    fn resize_synthetic_to_avif() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("source.jpg");
        create_test_jpeg(&source, 64, 48);

        let output = tmp.path().join("out.avif");
        RustBackend::new()
            .resize(&ResizeParams {
                source,
                output: output.clone(),
                width: 32,
                height: 24,
                format: OutputFormat::Avif,
                quality: Quality::new(60),
            })
            .unwrap();

        assert!(std::fs::metadata(&output).unwrap().len() > 0);
    }

    /// Small valid AVIF written through our own encoder.
    fn create_test_avif(path: &Path, width: u32, height: u32) {
        let img = image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        save_image(&DynamicImage::ImageRgb8(img), path, OutputFormat::Avif, 85).unwrap();
    }

    fn params(source: &Path, output: PathBuf, width: u32, format: OutputFormat) -> ResizeParams {
        ResizeParams {
            source: source.to_path_buf(),
            output,
            width,
            height: width * 3 / 4,
            format,
            quality: Quality::new(85),
        }
    }

    #[test]
    fn identify_avif_from_container() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("test.avif");
        create_test_avif(&path, 120, 80);

        let dims = RustBackend::new().identify(&path).unwrap();
        assert_eq!((dims.width, dims.height), (120, 80));
    }

    #[test]
    fn detect_format_recognizes_avif() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("test.avif");
        create_test_avif(&path, 16, 16);

        let format = RustBackend::new().detect_format(&path).unwrap();
        assert_eq!(format, SourceFormat::Avif);
        assert!(format.is_supported());
    }

    #[test]
    fn decode_avif_keeps_dimensions() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("test.avif");
        create_test_avif(&path, 64, 48);

        let decoded = load_image(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn transcode_avif_source_to_webp() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("source.avif");
        create_test_avif(&source, 200, 152);

        let output = tmp.path().join("out.webp");
        let backend = RustBackend::new();
        backend
            .resize(&params(&source, output.clone(), 100, OutputFormat::Webp))
            .unwrap();

        let dims = backend.identify(&output).unwrap();
        assert_eq!((dims.width, dims.height), (100, 75));
    }

    #[test]
    fn resize_all_writes_every_target_from_one_source() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("source.jpg");
        create_test_jpeg(&source, 400, 300);

        let targets = vec![
            params(&source, tmp.path().join("a-sm.png"), 100, OutputFormat::Png),
            params(&source, tmp.path().join("a-sm.jpg"), 100, OutputFormat::Jpeg),
            params(&source, tmp.path().join("a-md.png"), 200, OutputFormat::Png),
            params(&source, tmp.path().join("a-md.jpg"), 200, OutputFormat::Jpeg),
        ];
        let backend = RustBackend::new();
        backend.resize_all(&targets).unwrap();

        for target in &targets {
            let dims = backend.identify(&target.output).unwrap();
            assert_eq!((dims.width, dims.height), (target.width, target.height));
        }
    }

    #[test]
    fn resize_all_with_no_targets_is_a_no_op() {
        RustBackend::new().resize_all(&[]).unwrap();
    }

    #[test]
    fn resize_undecodable_source_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("broken.jpg");
        std::fs::write(&source, b"\xFF\xD8\xFF garbage").unwrap();

        let result = RustBackend::new().resize(&ResizeParams {
            source,
            output: tmp.path().join("out.webp"),
            width: 10,
            height: 10,
            format: OutputFormat::Webp,
            quality: Quality::default(),
        });
        assert!(matches!(result, Err(BackendError::ProcessingFailed(_))));
    }
}
