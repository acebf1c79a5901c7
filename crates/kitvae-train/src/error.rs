//! Error types for dataset loading and splitting.

use std::path::PathBuf;

use thiserror::Error;

/// Error type for dataset operations.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// The image directory does not exist.
    #[error("Image directory not found: {path}")]
    DirectoryNotFound {
        /// The expected image directory path.
        path: PathBuf,
    },

    /// Reading a directory entry failed.
    #[error("Failed to read directory: {path}")]
    DirectoryReadFailed {
        /// The directory path that failed to read.
        path: PathBuf,
        /// The underlying walk error.
        #[source]
        source: walkdir::Error,
    },

    /// No readable image was found.
    #[error("No images found in: {path}")]
    NoImages {
        /// The directory that was scanned.
        path: PathBuf,
    },

    /// A split fraction is outside `[0, 1)`.
    #[error("Invalid {split} fraction: {fraction} (expected a value in [0, 1))")]
    InvalidSplitFraction {
        /// Which split the fraction belongs to.
        split: &'static str,
        /// The rejected value.
        fraction: f64,
    },

    /// A split that must hold data ended up empty.
    #[error("The {split} split is empty ({total} images in total)")]
    EmptySplit {
        /// Which split is empty.
        split: &'static str,
        /// Number of images before splitting.
        total: usize,
    },

    /// Decoding or letterboxing an image failed.
    #[error("Failed to load image: {path}")]
    ImageLoadFailed {
        /// The image file path.
        path: PathBuf,
        /// The underlying image error.
        #[source]
        source: kitvae_util::ImageError,
    },
}

/// A specialized `Result` type for dataset operations.
pub type DatasetResult<T> = Result<T, DatasetError>;
