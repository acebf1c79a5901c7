//! # kitvae-train
//!
//! Data side of VAE training: loading an image folder, splitting it into
//! train/validation/test partitions and batching items into tensors.

pub mod dataset;
pub mod error;
pub mod split;

pub use dataset::{list_image_files, ImageBatcher, ImageFolderDataset, ImageItem};
pub use error::{DatasetError, DatasetResult};
pub use split::{
    split_tail, DatasetSplits, DEFAULT_TEST_FRACTION, DEFAULT_VALIDATION_FRACTION,
};
