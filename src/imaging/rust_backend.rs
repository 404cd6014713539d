//! Pure Rust image processing backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `image::image_dimensions` (header only) + EXIF orientation |
//! | EXIF orientation | `kamadak-exif` (`exif::Reader::read_from_container`) |
//! | Decode (JPEG, PNG, GIF, TIFF, WebP) | `image::ImageReader` |
//! | Orient | `DynamicImage::rotate90` / `rotate180` / `rotate270` / `fliph` / `flipv` |
//! | Crop | `DynamicImage::crop_imm` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder::new_with_quality` |

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::calculations::Orientation;
use super::params::{CropParams, ReencodeParams};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageError, ImageReader};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::warn;

/// Extensions the catalog accepts as base images.
const PHOTO_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// Returns the set of image file extensions that count as catalog images.
pub fn supported_input_extensions() -> &'static [&'static str] {
    PHOTO_EXTENSIONS
}

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

/// The returned message is shown to players, so the path is only logged.
fn map_image_error(path: &Path, err: ImageError) -> BackendError {
    match err {
        ImageError::IoError(io) => BackendError::Io(io),
        other => {
            warn!(path = %path.display(), error = %other, "image decode failed");
            BackendError::Decode(other.to_string())
        }
    }
}

/// Read the EXIF orientation tag. Files without EXIF (PNG, GIF, stripped
/// JPEGs) are upright.
fn read_orientation(path: &Path) -> Orientation {
    let Ok(file) = File::open(path) else {
        return Orientation::Normal;
    };
    let mut reader = BufReader::new(file);
    let Ok(exif) = exif::Reader::new().read_from_container(&mut reader) else {
        return Orientation::Normal;
    };
    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .map(Orientation::from_exif)
        .unwrap_or_default()
}

/// Rotate/flip the decoded frame so it displays upright.
fn apply_orientation(img: DynamicImage, orientation: Orientation) -> DynamicImage {
    match orientation {
        Orientation::Normal => img,
        Orientation::FlipHorizontal => img.fliph(),
        Orientation::Rotate180 => img.rotate180(),
        Orientation::FlipVertical => img.flipv(),
        Orientation::Transpose => img.rotate90().fliph(),
        Orientation::Rotate90 => img.rotate90(),
        Orientation::Transverse => img.rotate270().fliph(),
        Orientation::Rotate270 => img.rotate270(),
    }
}

/// Load, decode, and orient an image from disk.
fn load_upright(path: &Path) -> Result<DynamicImage, BackendError> {
    let img = ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| map_image_error(path, e))?;
    Ok(apply_orientation(img, read_orientation(path)))
}

/// Encode as baseline JPEG. Alpha is dropped; JPEG has no alpha channel.
fn save_jpeg(img: &DynamicImage, path: &Path, quality: u32) -> Result<(), BackendError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100) as u8);
    DynamicImage::ImageRgb8(img.to_rgb8())
        .write_with_encoder(encoder)
        .map_err(|e| BackendError::Encode(format!("JPEG encode failed: {}", e)))
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let (width, height) = image::image_dimensions(path).map_err(|e| map_image_error(path, e))?;
        Ok(read_orientation(path).apply_to(Dimensions { width, height }))
    }

    fn crop(&self, params: &CropParams) -> Result<(), BackendError> {
        let img = load_upright(&params.source)?;
        let region = params.region;
        let cropped = img.crop_imm(region.x, region.y, region.size, region.size);
        save_jpeg(&cropped, &params.output, params.quality.value())
    }

    fn reencode(&self, params: &ReencodeParams) -> Result<(), BackendError> {
        let img = load_upright(&params.source)?;
        save_jpeg(&img, &params.output, params.quality.value())
    }
}
