//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They sit between
//! the [`Normalizer`](crate::normalizer::Normalizer) (which decides which
//! derivative to produce and where) and the [`backend`](super::backend)
//! (which does the pixel work).
//!
//! ## Types
//!
//! - [`Quality`]: JPEG encoding quality (1–100, default 95). Clamped on construction.
//! - [`CropBox`]: A square region in oriented pixel coordinates.
//! - [`CropParams`]: Source, output, region, quality for a crop.
//! - [`ReencodeParams`]: Source, output, quality for a whole-frame JPEG re-encode.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Quality setting for JPEG encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(95)
    }
}

/// Square region of an image, top-left corner plus edge length.
///
/// Coordinates are in the *oriented* frame, i.e. after EXIF rotation.
/// Also used as the centered crop suggestion handed to the crop tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropBox {
    pub x: u32,
    pub y: u32,
    pub size: u32,
}

/// Parameters for a crop-to-square operation.
#[derive(Debug, Clone, PartialEq)]
pub struct CropParams {
    pub source: PathBuf,
    pub output: PathBuf,
    pub region: CropBox,
    pub quality: Quality,
}

/// Parameters for re-encoding an already-square image as JPEG.
#[derive(Debug, Clone, PartialEq)]
pub struct ReencodeParams {
    pub source: PathBuf,
    pub output: PathBuf,
    pub quality: Quality,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_95() {
        assert_eq!(Quality::default().value(), 95);
    }

    #[test]
    fn crop_box_deserializes_from_json() {
        let b: CropBox = serde_json::from_str(r#"{"x": 3, "y": 4, "size": 10}"#).unwrap();
        assert_eq!(b, CropBox { x: 3, y: 4, size: 10 });
    }
}
