//! Square image normalization and the derivative cache.
//!
//! Every card face must be square. The [`Normalizer`] answers "is this image
//! square?", suggests a centered crop for images that are not, and writes the
//! square JPEG *derivative* that the board actually displays.
//!
//! ## Derivative cache
//!
//! Derivatives live in `<image_root>/squared/` and are keyed by the base
//! image's stem: `beach.png` → `squared/beach_square.jpg`. Presence of the
//! file is authoritative: if it exists it is used, and
//! [`Normalizer::materialize_square`] never regenerates it. There is no
//! invalidation; replacing a base image requires deleting its derivative.
//! [`Normalizer::crop_and_cache`] always overwrites.
//!
//! Writes go to a uniquely named temporary file in the cache directory and
//! are renamed into place, so a reader never observes a half-written JPEG
//! and two writers of the same derivative simply race to the last rename.
//!
//! ## Path policy
//!
//! All filenames come from untrusted requests. A name is accepted only if
//! its canonical path's parent is exactly the canonical image root (or the
//! canonical cache directory for `squared/...` display paths). `..`,
//! absolute paths, and symlinks pointing outside the root all collapse to
//! [`NormalizeError::NotFound`], the same error as a missing file, so
//! callers learn nothing about the filesystem layout.

use crate::imaging::{
    BackendError, CropBox, CropParams, Dimensions, ImageBackend, Quality, ReencodeParams,
    RustBackend, crop_fits, largest_centered_square,
};
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Name of the derivative cache directory inside the image root.
pub const SQUARED_DIR: &str = "squared";

const SQUARE_SUFFIX: &str = "_square.jpg";

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Image not found")]
    NotFound,
    #[error("Cannot read image: {0}")]
    Unreadable(String),
    #[error("Image is not square; a crop box is required")]
    NotSquare,
    #[error("Crop box (x={}, y={}, size={}) does not fit inside the image", .0.x, .0.y, .0.size)]
    InvalidCrop(CropBox),
    #[error("Could not write derivative: {0}")]
    Storage(String),
}

/// Classify a failure while *reading* a source image.
fn read_error(err: BackendError) -> NormalizeError {
    match err {
        BackendError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => NormalizeError::NotFound,
        other => NormalizeError::Unreadable(other.to_string()),
    }
}

/// Classify a failure while *producing* a derivative.
fn write_error(err: BackendError) -> NormalizeError {
    match err {
        BackendError::Decode(msg) => NormalizeError::Unreadable(msg),
        other => NormalizeError::Storage(other.to_string()),
    }
}

/// True if `name` is a single plain path component (no separators, no `..`).
fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
}

/// Cache file name for a base image: `photo.png` → `photo_square.jpg`.
pub fn derivative_file_name(base_filename: &str) -> String {
    let stem = Path::new(base_filename)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| base_filename.to_string());
    format!("{stem}{SQUARE_SUFFIX}")
}

/// Where a base image stands with respect to the derivative cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageStatus {
    /// A square derivative is cached.
    Cached,
    /// Square already; a derivative is written on first use.
    Square(Dimensions),
    /// Needs the crop tool before it can be dealt.
    NeedsCrop(Dimensions),
    Unreadable(String),
}

/// Image normalizer over one image root and its derivative cache.
pub struct Normalizer<B: ImageBackend = RustBackend> {
    root: PathBuf,
    backend: B,
    quality: Quality,
}

impl Normalizer<RustBackend> {
    pub fn new(root: impl Into<PathBuf>, quality: Quality) -> Self {
        Self::with_backend(root, RustBackend::new(), quality)
    }
}

impl<B: ImageBackend> Normalizer<B> {
    pub fn with_backend(root: impl Into<PathBuf>, backend: B, quality: Quality) -> Self {
        Self {
            root: root.into(),
            backend,
            quality,
        }
    }

    fn cache_dir(&self) -> PathBuf {
        self.root.join(SQUARED_DIR)
    }

    /// Resolve `name` inside `dir`, enforcing the path policy.
    fn resolve_in(dir: &Path, name: &str) -> Result<PathBuf, NormalizeError> {
        if name.is_empty() {
            return Err(NormalizeError::NotFound);
        }
        let canonical_dir = dir.canonicalize().map_err(|_| NormalizeError::NotFound)?;
        let candidate = canonical_dir
            .join(name)
            .canonicalize()
            .map_err(|_| NormalizeError::NotFound)?;
        if candidate.parent() != Some(canonical_dir.as_path()) || !candidate.is_file() {
            return Err(NormalizeError::NotFound);
        }
        Ok(candidate)
    }

    /// Safe absolute path of a base image, or `NotFound`.
    pub fn resolve(&self, filename: &str) -> Result<PathBuf, NormalizeError> {
        Self::resolve_in(&self.root, filename)
    }

    /// Path the derivative of `base_filename` lives at (whether or not it exists).
    pub fn derivative_path(&self, base_filename: &str) -> PathBuf {
        self.cache_dir().join(derivative_file_name(base_filename))
    }

    pub fn has_derivative(&self, base_filename: &str) -> bool {
        self.derivative_path(base_filename).is_file()
    }

    /// Name the front end should request for a base image: the derivative's
    /// `squared/...` path if one is cached, otherwise the base filename.
    pub fn display_name(&self, base_filename: &str) -> String {
        if self.has_derivative(base_filename) {
            derivative_display_name(base_filename)
        } else {
            base_filename.to_string()
        }
    }

    /// Map a requested image path to the file to serve.
    ///
    /// Accepts a base filename (its derivative wins if cached) or a
    /// `squared/<name>` derivative path.
    pub fn resolve_for_display(&self, requested: &str) -> Result<PathBuf, NormalizeError> {
        if let Some(name) = requested.strip_prefix(&format!("{SQUARED_DIR}/")) {
            return Self::resolve_in(&self.cache_dir(), name);
        }
        if !is_plain_file_name(requested) {
            return Err(NormalizeError::NotFound);
        }
        if let Ok(derivative) =
            Self::resolve_in(&self.cache_dir(), &derivative_file_name(requested))
        {
            return Ok(derivative);
        }
        self.resolve(requested)
    }

    /// Pixel dimensions after EXIF orientation.
    pub fn dimensions(&self, filename: &str) -> Result<Dimensions, NormalizeError> {
        let path = self.resolve(filename)?;
        self.backend.identify(&path).map_err(read_error)
    }

    /// Square after orientation. Unreadable or missing images are not square.
    pub fn is_square(&self, filename: &str) -> bool {
        self.dimensions(filename)
            .map(Dimensions::is_square)
            .unwrap_or(false)
    }

    pub fn status(&self, filename: &str) -> ImageStatus {
        if self.has_derivative(filename) {
            return ImageStatus::Cached;
        }
        match self.dimensions(filename) {
            Ok(dims) if dims.is_square() => ImageStatus::Square(dims),
            Ok(dims) => ImageStatus::NeedsCrop(dims),
            Err(e) => ImageStatus::Unreadable(e.to_string()),
        }
    }

    /// Centered largest-square crop suggestion for the crop tool.
    pub fn largest_centered_square(&self, filename: &str) -> Result<CropBox, NormalizeError> {
        self.dimensions(filename).map(largest_centered_square)
    }

    /// Ensure a square derivative exists for an already-square image.
    ///
    /// Returns the derivative's display name. A cached derivative is returned
    /// as-is. JPEG sources are copied byte-for-byte; other formats are
    /// re-encoded. Non-square sources fail with [`NormalizeError::NotSquare`].
    pub fn materialize_square(&self, filename: &str) -> Result<String, NormalizeError> {
        let source = self.resolve(filename)?;
        if self.has_derivative(filename) {
            return Ok(derivative_display_name(filename));
        }
        let dims = self.backend.identify(&source).map_err(read_error)?;
        if !dims.is_square() {
            return Err(NormalizeError::NotSquare);
        }

        self.write_derivative(filename, |tmp| {
            if is_jpeg(&source) {
                fs::copy(&source, tmp).map(|_| ()).map_err(BackendError::Io)
            } else {
                self.backend.reencode(&ReencodeParams {
                    source: source.clone(),
                    output: tmp.to_path_buf(),
                    quality: self.quality,
                })
            }
        })
    }

    /// Crop `region` out of the upright image and cache it, replacing any
    /// existing derivative.
    pub fn crop_and_cache(&self, filename: &str, region: CropBox) -> Result<String, NormalizeError> {
        let source = self.resolve(filename)?;
        let dims = self.backend.identify(&source).map_err(read_error)?;
        if !crop_fits(dims, region) {
            return Err(NormalizeError::InvalidCrop(region));
        }

        self.write_derivative(filename, |tmp| {
            self.backend.crop(&CropParams {
                source: source.clone(),
                output: tmp.to_path_buf(),
                region,
                quality: self.quality,
            })
        })
    }

    /// Run `produce` against a temporary file, then rename it over the
    /// derivative. The temporary file is removed on failure.
    fn write_derivative<F>(&self, filename: &str, produce: F) -> Result<String, NormalizeError>
    where
        F: FnOnce(&Path) -> Result<(), BackendError>,
    {
        let cache_dir = self.cache_dir();
        fs::create_dir_all(&cache_dir).map_err(|e| NormalizeError::Storage(e.to_string()))?;

        let final_path = cache_dir.join(derivative_file_name(filename));
        let tmp_path = cache_dir.join(format!(
            ".{}.{}.tmp",
            derivative_file_name(filename),
            uuid::Uuid::new_v4().simple()
        ));

        let result = produce(&tmp_path)
            .map_err(write_error)
            .and_then(|()| {
                fs::rename(&tmp_path, &final_path).map_err(|e| NormalizeError::Storage(e.to_string()))
            });
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result?;

        info!(image = filename, derivative = %final_path.display(), "cached square derivative");
        debug!(quality = self.quality.value(), "derivative written");
        Ok(derivative_display_name(filename))
    }
}

/// Display path of a derivative, relative to the image root.
pub fn derivative_display_name(base_filename: &str) -> String {
    format!("{SQUARED_DIR}/{}", derivative_file_name(base_filename))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::imaging::rust_backend::tests::{create_test_jpeg, create_test_png};
    use tempfile::TempDir;

    /// Image root inside a temp dir, so "outside the root" is still disposable.
    fn setup() -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("img");
        fs::create_dir(&root).unwrap();
        (tmp, root)
    }

    fn mock_normalizer(root: &Path, dims: &[(&str, u32, u32)]) -> Normalizer<MockBackend> {
        for (name, _, _) in dims {
            fs::write(root.join(name), b"placeholder").unwrap();
        }
        Normalizer::with_backend(root, MockBackend::with_dimensions(dims), Quality::default())
    }

    // =========================================================================
    // Naming
    // =========================================================================

    #[test]
    fn derivative_names() {
        assert_eq!(derivative_file_name("beach.png"), "beach_square.jpg");
        assert_eq!(derivative_file_name("a.b.jpeg"), "a.b_square.jpg");
        assert_eq!(derivative_file_name("noext"), "noext_square.jpg");
        assert_eq!(derivative_display_name("beach.png"), "squared/beach_square.jpg");
    }

    #[test]
    fn plain_file_names() {
        assert!(is_plain_file_name("a.jpg"));
        assert!(!is_plain_file_name("../a.jpg"));
        assert!(!is_plain_file_name("sub/a.jpg"));
        assert!(!is_plain_file_name("/etc/passwd"));
        assert!(!is_plain_file_name(".."));
        assert!(!is_plain_file_name(""));
    }

    // =========================================================================
    // Path policy
    // =========================================================================

    #[test]
    fn traversal_is_not_found_for_every_operation() {
        let (tmp, root) = setup();
        fs::write(tmp.path().join("secret.jpg"), b"x").unwrap();
        let n = mock_normalizer(&root, &[("ok.jpg", 10, 10)]);

        for bad in ["../secret.jpg", "../../etc/passwd", "/etc/passwd", "", "."] {
            assert!(matches!(n.resolve(bad), Err(NormalizeError::NotFound)), "{bad}");
            assert!(matches!(n.dimensions(bad), Err(NormalizeError::NotFound)), "{bad}");
            assert!(!n.is_square(bad));
            assert!(matches!(
                n.largest_centered_square(bad),
                Err(NormalizeError::NotFound)
            ));
            assert!(matches!(
                n.materialize_square(bad),
                Err(NormalizeError::NotFound)
            ));
            assert!(matches!(
                n.crop_and_cache(bad, CropBox { x: 0, y: 0, size: 1 }),
                Err(NormalizeError::NotFound)
            ));
            assert!(matches!(
                n.resolve_for_display(bad),
                Err(NormalizeError::NotFound)
            ));
        }
        assert!(n.resolve("ok.jpg").is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escaping_root_is_not_found() {
        let (tmp, root) = setup();
        let outside = tmp.path().join("outside.jpg");
        fs::write(&outside, b"x").unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link.jpg")).unwrap();

        let n = Normalizer::new(&root, Quality::default());
        assert!(matches!(n.resolve("link.jpg"), Err(NormalizeError::NotFound)));
    }

    #[test]
    fn missing_file_is_not_found() {
        let (_tmp, root) = setup();
        let n = Normalizer::new(&root, Quality::default());
        assert!(matches!(n.dimensions("ghost.jpg"), Err(NormalizeError::NotFound)));
    }

    #[test]
    fn subdirectory_is_not_a_base_image() {
        let (_tmp, root) = setup();
        fs::create_dir(root.join(SQUARED_DIR)).unwrap();
        let n = Normalizer::new(&root, Quality::default());
        assert!(matches!(n.resolve(SQUARED_DIR), Err(NormalizeError::NotFound)));
    }

    // =========================================================================
    // Dimensions and squareness
    // =========================================================================

    #[test]
    fn corrupt_file_is_unreadable_not_missing() {
        let (_tmp, root) = setup();
        fs::write(root.join("broken.jpg"), b"garbage").unwrap();
        let n = Normalizer::new(&root, Quality::default());

        assert!(matches!(
            n.dimensions("broken.jpg"),
            Err(NormalizeError::Unreadable(_))
        ));
        assert!(!n.is_square("broken.jpg"));
    }

    #[test]
    fn suggestion_is_centered() {
        let (_tmp, root) = setup();
        let n = mock_normalizer(&root, &[("wide.jpg", 300, 200)]);
        assert_eq!(
            n.largest_centered_square("wide.jpg").unwrap(),
            CropBox {
                x: 50,
                y: 0,
                size: 200
            }
        );
    }

    #[test]
    fn status_reflects_cache_and_shape() {
        let (_tmp, root) = setup();
        let n = mock_normalizer(&root, &[("sq.png", 50, 50), ("wide.jpg", 120, 80)]);
        fs::write(root.join("broken.jpg"), b"x").unwrap();

        assert_eq!(
            n.status("sq.png"),
            ImageStatus::Square(Dimensions {
                width: 50,
                height: 50
            })
        );
        assert!(matches!(n.status("wide.jpg"), ImageStatus::NeedsCrop(_)));
        assert!(matches!(n.status("broken.jpg"), ImageStatus::Unreadable(_)));

        n.materialize_square("sq.png").unwrap();
        assert_eq!(n.status("sq.png"), ImageStatus::Cached);
    }

    // =========================================================================
    // materialize_square
    // =========================================================================

    #[test]
    fn materialize_copies_square_jpeg_byte_for_byte() {
        let (_tmp, root) = setup();
        create_test_jpeg(&root.join("sq.jpg"), 40, 40);
        let n = Normalizer::new(&root, Quality::default());

        assert!(n.is_square("sq.jpg"));
        let name = n.materialize_square("sq.jpg").unwrap();
        assert_eq!(name, "squared/sq_square.jpg");
        assert_eq!(
            fs::read(root.join("squared/sq_square.jpg")).unwrap(),
            fs::read(root.join("sq.jpg")).unwrap()
        );
        assert_eq!(n.display_name("sq.jpg"), "squared/sq_square.jpg");
    }

    #[test]
    fn materialize_reencodes_square_png() {
        let (_tmp, root) = setup();
        create_test_png(&root.join("sq.png"), 32, 32);
        let n = Normalizer::new(&root, Quality::default());

        n.materialize_square("sq.png").unwrap();
        let derivative = n.derivative_path("sq.png");
        assert_eq!(image::image_dimensions(&derivative).unwrap(), (32, 32));
    }

    #[test]
    fn materialize_non_square_fails() {
        let (_tmp, root) = setup();
        let n = mock_normalizer(&root, &[("wide.png", 300, 200)]);
        assert!(matches!(
            n.materialize_square("wide.png"),
            Err(NormalizeError::NotSquare)
        ));
        assert!(!n.has_derivative("wide.png"));
    }

    #[test]
    fn materialize_existing_derivative_is_noop() {
        let (_tmp, root) = setup();
        let n = mock_normalizer(&root, &[("sq.png", 50, 50)]);
        fs::create_dir(root.join(SQUARED_DIR)).unwrap();
        fs::write(n.derivative_path("sq.png"), b"already here").unwrap();

        let name = n.materialize_square("sq.png").unwrap();
        assert_eq!(name, "squared/sq_square.jpg");
        assert_eq!(fs::read(n.derivative_path("sq.png")).unwrap(), b"already here");
        // No identify, no encode
        assert!(n.backend.get_operations().is_empty());
    }

    #[test]
    fn materialize_png_goes_through_backend() {
        let (_tmp, root) = setup();
        let n = mock_normalizer(&root, &[("sq.png", 50, 50)]);
        n.materialize_square("sq.png").unwrap();

        let ops = n.backend.get_operations();
        assert_eq!(
            ops,
            vec![
                RecordedOp::Identify("sq.png".into()),
                RecordedOp::Reencode {
                    source: "sq.png".into(),
                    quality: 95
                },
            ]
        );
    }

    // =========================================================================
    // crop_and_cache
    // =========================================================================

    #[test]
    fn crop_writes_square_derivative() {
        let (_tmp, root) = setup();
        create_test_jpeg(&root.join("wide.jpg"), 120, 80);
        let n = Normalizer::new(&root, Quality::default());

        let region = n.largest_centered_square("wide.jpg").unwrap();
        let name = n.crop_and_cache("wide.jpg", region).unwrap();

        assert_eq!(name, "squared/wide_square.jpg");
        assert_eq!(
            image::image_dimensions(n.derivative_path("wide.jpg")).unwrap(),
            (80, 80)
        );
    }

    #[test]
    fn crop_overwrites_previous_derivative() {
        let (_tmp, root) = setup();
        let n = mock_normalizer(&root, &[("wide.jpg", 120, 80)]);
        fs::create_dir(root.join(SQUARED_DIR)).unwrap();
        fs::write(n.derivative_path("wide.jpg"), b"old").unwrap();

        n.crop_and_cache("wide.jpg", CropBox { x: 0, y: 0, size: 80 })
            .unwrap();
        assert_eq!(fs::read(n.derivative_path("wide.jpg")).unwrap(), b"mock-crop");
    }

    #[test]
    fn crop_out_of_bounds_is_rejected() {
        let (_tmp, root) = setup();
        let n = mock_normalizer(&root, &[("wide.jpg", 120, 80)]);

        let result = n.crop_and_cache("wide.jpg", CropBox { x: 50, y: 0, size: 80 });
        assert!(matches!(result, Err(NormalizeError::InvalidCrop(_))));
        assert!(!n.has_derivative("wide.jpg"));
    }

    #[test]
    fn crop_leaves_no_temporary_files() {
        let (_tmp, root) = setup();
        let n = mock_normalizer(&root, &[("wide.jpg", 120, 80)]);
        n.crop_and_cache("wide.jpg", CropBox { x: 0, y: 0, size: 80 })
            .unwrap();

        let leftovers: Vec<_> = fs::read_dir(root.join(SQUARED_DIR))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    // =========================================================================
    // Display resolution
    // =========================================================================

    #[test]
    fn display_prefers_derivative() {
        let (_tmp, root) = setup();
        let n = mock_normalizer(&root, &[("wide.jpg", 120, 80)]);

        assert_eq!(n.display_name("wide.jpg"), "wide.jpg");
        assert_eq!(
            n.resolve_for_display("wide.jpg").unwrap(),
            root.join("wide.jpg").canonicalize().unwrap()
        );

        n.crop_and_cache("wide.jpg", CropBox { x: 0, y: 0, size: 80 })
            .unwrap();
        let derivative = n.derivative_path("wide.jpg").canonicalize().unwrap();
        assert_eq!(n.resolve_for_display("wide.jpg").unwrap(), derivative);
        assert_eq!(
            n.resolve_for_display("squared/wide_square.jpg").unwrap(),
            derivative
        );
    }

    #[test]
    fn display_rejects_cache_traversal() {
        let (_tmp, root) = setup();
        let n = mock_normalizer(&root, &[("wide.jpg", 120, 80)]);
        fs::create_dir(root.join(SQUARED_DIR)).unwrap();

        assert!(matches!(
            n.resolve_for_display("squared/../wide.jpg"),
            Err(NormalizeError::NotFound)
        ));
        assert!(matches!(
            n.resolve_for_display("squared/missing_square.jpg"),
            Err(NormalizeError::NotFound)
        ));
    }
}
