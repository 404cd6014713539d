//! Pure calculation functions for image geometry.
//!
//! All functions here are pure and testable without any I/O or images.

use super::backend::Dimensions;
use super::params::CropBox;

/// EXIF orientation (tag 0x0112), values 1 through 8.
///
/// Names describe the transform needed to display the stored frame upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Normal,
    FlipHorizontal,
    Rotate180,
    FlipVertical,
    Transpose,
    Rotate90,
    Transverse,
    Rotate270,
}

impl Orientation {
    /// Map a raw EXIF orientation value. Out-of-range values are `Normal`.
    pub fn from_exif(value: u32) -> Self {
        match value {
            2 => Self::FlipHorizontal,
            3 => Self::Rotate180,
            4 => Self::FlipVertical,
            5 => Self::Transpose,
            6 => Self::Rotate90,
            7 => Self::Transverse,
            8 => Self::Rotate270,
            _ => Self::Normal,
        }
    }

    /// Whether displaying upright exchanges width and height.
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Self::Transpose | Self::Rotate90 | Self::Transverse | Self::Rotate270
        )
    }

    /// Dimensions of the upright image given the stored frame's dimensions.
    pub fn apply_to(self, stored: Dimensions) -> Dimensions {
        if self.swaps_dimensions() {
            Dimensions {
                width: stored.height,
                height: stored.width,
            }
        } else {
            stored
        }
    }
}

/// Largest square that fits the image, centered along the longer edge.
///
/// Offsets use integer floor division, so an odd leftover puts the extra
/// pixel on the right/bottom.
///
/// # Examples
/// ```
/// # use memory_match::imaging::{largest_centered_square, CropBox, Dimensions};
/// let region = largest_centered_square(Dimensions { width: 300, height: 200 });
/// assert_eq!(region, CropBox { x: 50, y: 0, size: 200 });
/// ```
pub fn largest_centered_square(dims: Dimensions) -> CropBox {
    let size = dims.width.min(dims.height);
    CropBox {
        x: (dims.width - size) / 2,
        y: (dims.height - size) / 2,
        size,
    }
}

/// Whether a crop box is non-empty and lies entirely inside the image.
pub fn crop_fits(dims: Dimensions, region: CropBox) -> bool {
    if region.size == 0 {
        return false;
    }
    let right = region.x.checked_add(region.size);
    let bottom = region.y.checked_add(region.size);
    matches!((right, bottom), (Some(r), Some(b)) if r <= dims.width && b <= dims.height)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions { width, height }
    }

    // =========================================================================
    // largest_centered_square
    // =========================================================================

    #[test]
    fn square_landscape() {
        assert_eq!(
            largest_centered_square(dims(1920, 1080)),
            CropBox {
                x: 420,
                y: 0,
                size: 1080
            }
        );
    }

    #[test]
    fn square_portrait() {
        assert_eq!(
            largest_centered_square(dims(600, 800)),
            CropBox {
                x: 0,
                y: 100,
                size: 600
            }
        );
    }

    #[test]
    fn square_already_square() {
        assert_eq!(
            largest_centered_square(dims(500, 500)),
            CropBox {
                x: 0,
                y: 0,
                size: 500
            }
        );
    }

    #[test]
    fn square_odd_leftover_floors() {
        // 101 - 100 = 1 leftover pixel → offset 0
        assert_eq!(largest_centered_square(dims(101, 100)).x, 0);
        assert_eq!(largest_centered_square(dims(103, 100)).x, 1);
    }

    #[test]
    fn square_always_fits() {
        for (w, h) in [(1, 1), (1, 9), (9, 1), (640, 481), (4000, 3000), (7, 13)] {
            let d = dims(w, h);
            let region = largest_centered_square(d);
            assert!(region.size <= w.min(h));
            assert!(region.x + region.size <= w, "{w}x{h}");
            assert!(region.y + region.size <= h, "{w}x{h}");
            assert!(crop_fits(d, region));
        }
    }

    // =========================================================================
    // crop_fits
    // =========================================================================

    #[test]
    fn crop_fits_rejects_empty() {
        assert!(!crop_fits(dims(100, 100), CropBox { x: 0, y: 0, size: 0 }));
    }

    #[test]
    fn crop_fits_rejects_overflowing_edges() {
        assert!(!crop_fits(dims(100, 80), CropBox { x: 30, y: 0, size: 80 }));
        assert!(!crop_fits(dims(100, 80), CropBox { x: 0, y: 1, size: 80 }));
        assert!(crop_fits(dims(100, 80), CropBox { x: 20, y: 0, size: 80 }));
    }

    #[test]
    fn crop_fits_handles_u32_overflow() {
        assert!(!crop_fits(
            dims(100, 100),
            CropBox {
                x: u32::MAX,
                y: 0,
                size: 2
            }
        ));
    }

    // =========================================================================
    // Orientation
    // =========================================================================

    #[test]
    fn orientation_from_exif_values() {
        assert_eq!(Orientation::from_exif(1), Orientation::Normal);
        assert_eq!(Orientation::from_exif(6), Orientation::Rotate90);
        assert_eq!(Orientation::from_exif(8), Orientation::Rotate270);
        assert_eq!(Orientation::from_exif(0), Orientation::Normal);
        assert_eq!(Orientation::from_exif(42), Orientation::Normal);
    }

    #[test]
    fn orientation_swaps_only_for_quarter_turns() {
        for v in 1..=4 {
            assert!(!Orientation::from_exif(v).swaps_dimensions(), "value {v}");
        }
        for v in 5..=8 {
            assert!(Orientation::from_exif(v).swaps_dimensions(), "value {v}");
        }
    }

    #[test]
    fn orientation_apply_to_portrait_phone_photo() {
        // Stored landscape, tagged "rotate 90 CW" → upright portrait
        assert_eq!(
            Orientation::Rotate90.apply_to(dims(4032, 3024)),
            dims(3024, 4032)
        );
        assert_eq!(
            Orientation::Rotate180.apply_to(dims(4032, 3024)),
            dims(4032, 3024)
        );
    }
}
