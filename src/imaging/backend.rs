//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations the normalizer
//! needs: identify, crop, and reencode. All of them see the image *after*
//! EXIF orientation has been applied, so a portrait phone photo stored as a
//! rotated landscape frame reports portrait dimensions.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend).

use super::params::{CropParams, ReencodeParams};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Result of an identify operation, orientation already applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn is_square(self) -> bool {
        self.width == self.height
    }
}

/// Trait for image processing backends.
///
/// Every backend must implement all three operations so the normalizer is
/// backend-agnostic and can be exercised against a mock.
pub trait ImageBackend: Send + Sync {
    /// Get image dimensions after EXIF orientation.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Orient, crop a square region, and write it as JPEG.
    fn crop(&self, params: &CropParams) -> Result<(), BackendError>;

    /// Orient and write the whole frame as JPEG.
    fn reencode(&self, params: &ReencodeParams) -> Result<(), BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::{CropBox, Quality};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Mock backend that records operations and writes placeholder bytes to
    /// the requested output so the caller's file handling stays exercised.
    #[derive(Default)]
    pub struct MockBackend {
        pub dimensions: Mutex<HashMap<String, Dimensions>>,
        pub operations: Mutex<Vec<RecordedOp>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Identify(String),
        Crop {
            source: String,
            region: CropBox,
            quality: u32,
        },
        Reencode {
            source: String,
            quality: u32,
        },
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Register dimensions for a file name (matched on the final path component).
        pub fn with_dimensions(entries: &[(&str, u32, u32)]) -> Self {
            let dims = entries
                .iter()
                .map(|(name, width, height)| {
                    (
                        name.to_string(),
                        Dimensions {
                            width: *width,
                            height: *height,
                        },
                    )
                })
                .collect();
            Self {
                dimensions: Mutex::new(dims),
                operations: Mutex::new(Vec::new()),
            }
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }
    }

    fn file_name(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    impl ImageBackend for MockBackend {
        fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Identify(file_name(path)));

            self.dimensions
                .lock()
                .unwrap()
                .get(&file_name(path))
                .copied()
                .ok_or_else(|| BackendError::Decode("No mock dimensions".to_string()))
        }

        fn crop(&self, params: &CropParams) -> Result<(), BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Crop {
                source: file_name(&params.source),
                region: params.region,
                quality: params.quality.value(),
            });
            std::fs::write(&params.output, b"mock-crop")?;
            Ok(())
        }

        fn reencode(&self, params: &ReencodeParams) -> Result<(), BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Reencode {
                source: file_name(&params.source),
                quality: params.quality.value(),
            });
            std::fs::write(&params.output, b"mock-reencode")?;
            Ok(())
        }
    }

    #[test]
    fn mock_records_identify() {
        let backend = MockBackend::with_dimensions(&[("image.jpg", 800, 600)]);

        let result = backend.identify(Path::new("/test/image.jpg")).unwrap();
        assert_eq!(result.width, 800);
        assert_eq!(result.height, 600);

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], RecordedOp::Identify(p) if p == "image.jpg"));
    }

    #[test]
    fn mock_identify_unknown_file_errors() {
        let backend = MockBackend::new();
        assert!(matches!(
            backend.identify(Path::new("/test/missing.jpg")),
            Err(BackendError::Decode(_))
        ));
    }

    #[test]
    fn mock_records_crop_and_writes_output() {
        let tmp = tempfile::TempDir::new().unwrap();
        let output = tmp.path().join("out.jpg");
        let backend = MockBackend::new();

        backend
            .crop(&CropParams {
                source: "/source.jpg".into(),
                output: output.clone(),
                region: CropBox {
                    x: 10,
                    y: 0,
                    size: 50,
                },
                quality: Quality::new(95),
            })
            .unwrap();

        assert!(output.exists());
        assert!(matches!(
            &backend.get_operations()[0],
            RecordedOp::Crop {
                region: CropBox { x: 10, y: 0, size: 50 },
                quality: 95,
                ..
            }
        ));
    }

    #[test]
    fn square_dimensions() {
        assert!(Dimensions { width: 5, height: 5 }.is_square());
        assert!(!Dimensions { width: 5, height: 4 }.is_square());
    }
}
