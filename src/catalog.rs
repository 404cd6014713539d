//! Image catalog: the pre-seeded base images a round is dealt from.
//!
//! The catalog is the set of files directly inside the image root whose
//! extension is one of [`supported_input_extensions`]. The `squared/`
//! derivative cache is a subdirectory and is never listed. Hidden files are
//! skipped.
//!
//! ## Sampling
//!
//! A round needs `k` images out of a catalog that may hold many thousands.
//! [`Catalog::sample`] walks the directory listing once and keeps a
//! fixed-size reservoir of `k` names ([Algorithm R]), so memory is bounded by
//! `k` no matter how large the directory is. When the catalog holds fewer
//! than `k` images, every image is returned.
//!
//! [Algorithm R]: https://en.wikipedia.org/wiki/Reservoir_sampling#Simple:_Algorithm_R

use crate::imaging::supported_input_extensions;
use rand::Rng;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Base images living directly under one directory.
#[derive(Debug, Clone)]
pub struct Catalog {
    root: PathBuf,
}

impl Catalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Lazily iterate base image filenames in directory order.
    ///
    /// A missing root yields an empty catalog rather than an error.
    fn names(&self) -> io::Result<Box<dyn Iterator<Item = String>>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Box::new(std::iter::empty()));
            }
            Err(e) => return Err(e),
        };
        Ok(Box::new(
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
                .filter_map(|e| e.file_name().to_str().map(str::to_owned))
                .filter(|name| is_catalog_image(name)),
        ))
    }

    /// Draw up to `k` distinct image names uniformly at random in one pass.
    pub fn sample<R: Rng + ?Sized>(&self, k: usize, rng: &mut R) -> io::Result<Vec<String>> {
        Ok(reservoir_sample(self.names()?, k, rng))
    }

    /// Every image name, sorted. Materializes the whole listing, so only
    /// inventory-style callers use it.
    pub fn all_images(&self) -> io::Result<Vec<String>> {
        let mut names: Vec<String> = self.names()?.collect();
        names.sort();
        Ok(names)
    }
}

/// Whether a bare filename looks like a catalog image.
pub fn is_catalog_image(name: &str) -> bool {
    if name.starts_with('.') {
        return false;
    }
    let ext = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    supported_input_extensions().contains(&ext.as_str())
}

/// Uniform sample of `k` items from an iterator of unknown length.
///
/// The first `k` items fill the reservoir; item `i` (0-based, `i >= k`)
/// then replaces a random slot with probability `k / (i + 1)`.
pub fn reservoir_sample<T, I, R>(items: I, k: usize, rng: &mut R) -> Vec<T>
where
    I: IntoIterator<Item = T>,
    R: Rng + ?Sized,
{
    let mut reservoir = Vec::new();
    if k == 0 {
        return reservoir;
    }
    for (i, item) in items.into_iter().enumerate() {
        if i < k {
            reservoir.push(item);
        } else {
            let j = rng.random_range(0..=i);
            if j < k {
                reservoir[j] = item;
            }
        }
    }
    reservoir
}
