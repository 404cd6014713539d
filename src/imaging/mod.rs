//! Image processing in pure Rust, no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::image_dimensions` + EXIF orientation |
//! | **Crop → JPEG** | `crop_imm` + `JpegEncoder` |
//! | **Re-encode → JPEG** | `JpegEncoder` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for square/crop geometry and orientation (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
mod calculations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::{Orientation, crop_fits, largest_centered_square};
pub use params::{CropBox, CropParams, Quality, ReencodeParams};
pub use rust_backend::{RustBackend, supported_input_extensions};
