//! Image folder dataset for VAE training.
//!
//! Items carry raw HWC pixel data in `[0, 1]`; the [`ImageBatcher`] turns them
//! into tensors on the target device, following Burn's dataset/batcher split.

use std::{
    marker::PhantomData,
    path::{Path, PathBuf},
};

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    tensor::{backend::Backend, Tensor, TensorData},
};
use kitvae_model::VaeBatch;
use kitvae_util::{image::open_image, letterbox, RAW_EXTENSIONS};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{DatasetError, DatasetResult};

/// A single preprocessed training image.
#[derive(Debug, Clone)]
pub struct ImageItem {
    /// RGB pixels as a flattened `[H, W, C]` array in `[0, 1]`.
    pub pixels: Vec<f32>,
    /// Image height in pixels.
    pub height: usize,
    /// Image width in pixels.
    pub width: usize,
    /// Source file.
    pub path: PathBuf,
}

impl ImageItem {
    /// Loads one image, letterboxing it to `image_size x image_size` when needed.
    pub fn load(path: &Path, image_size: u32) -> DatasetResult<Self> {
        let image = open_image(path).map_err(|source| DatasetError::ImageLoadFailed {
            path: path.to_path_buf(),
            source,
        })?;

        let mut rgb = image.to_rgb8();
        if rgb.dimensions() != (image_size, image_size) {
            warn!(
                path = %path.display(),
                width = rgb.width(),
                height = rgb.height(),
                image_size,
                "image is not {image_size}x{image_size}, letterboxing"
            );
            rgb = letterbox(&rgb, image_size, image_size).map_err(|source| {
                DatasetError::ImageLoadFailed {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
        }

        let pixels = rgb
            .into_raw()
            .into_iter()
            .map(|v| f32::from(v) / 255.0)
            .collect();

        Ok(Self {
            pixels,
            height: image_size as usize,
            width: image_size as usize,
            path: path.to_path_buf(),
        })
    }
}

/// Every `.png`/`.jpg`/`.jpeg` image of one directory, in file-name order.
#[derive(Debug, Clone)]
pub struct ImageFolderDataset {
    items: Vec<ImageItem>,
}

impl ImageFolderDataset {
    /// Loads the images directly inside `dir`.
    ///
    /// Unreadable files are logged and skipped.
    ///
    /// # Errors
    ///
    /// Fails if the directory is missing, cannot be listed, or holds no readable image.
    pub fn load<P: AsRef<Path>>(dir: P, image_size: u32) -> DatasetResult<Self> {
        let dir = dir.as_ref();
        let paths = list_image_files(dir)?;
        debug!(dir = %dir.display(), candidates = paths.len(), "scanning image folder");

        let mut items = Vec::with_capacity(paths.len());
        for path in paths {
            match ImageItem::load(&path, image_size) {
                Ok(item) => items.push(item),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable image"),
            }
        }

        if items.is_empty() {
            return Err(DatasetError::NoImages {
                path: dir.to_path_buf(),
            });
        }

        info!(dir = %dir.display(), images = items.len(), "loaded image folder");
        Ok(Self { items })
    }

    /// Wraps already loaded items.
    pub const fn from_items(items: Vec<ImageItem>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[ImageItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<ImageItem> {
        self.items
    }
}

impl Dataset<ImageItem> for ImageFolderDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Sorted image files directly inside `dir`.
pub fn list_image_files(dir: &Path) -> DatasetResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(DatasetError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| DatasetError::DirectoryReadFailed {
            path: dir.to_path_buf(),
            source,
        })?;

        if entry.file_type().is_file()
            && kitvae_util::image::has_supported_extension(entry.path(), RAW_EXTENSIONS)
        {
            paths.push(entry.into_path());
        }
    }

    Ok(paths)
}

/// Batcher stacking [`ImageItem`]s into `[B, 3, H, W]` tensors.
#[derive(Clone, Default)]
pub struct ImageBatcher<B: Backend> {
    _phantom: PhantomData<B>,
}

impl<B: Backend> ImageBatcher<B> {
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, ImageItem, VaeBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> VaeBatch<B> {
        let images = items
            .into_iter()
            .map(|item| {
                Tensor::<B, 3>::from_data(
                    TensorData::new(item.pixels, [item.height, item.width, 3]),
                    device,
                )
                .permute([2, 0, 1]) // HWC to CHW
            })
            .collect();

        VaeBatch::new(Tensor::stack(images, 0))
    }
}
