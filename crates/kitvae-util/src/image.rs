//! Image loading, saving and image <-> tensor conversion.

use std::path::Path;

use burn::tensor::{backend::Backend, DType, Tensor, TensorData};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use thiserror::Error;

/// Extensions accepted for scraped originals and background removal input.
pub const RAW_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Extensions accepted by the letterbox stage.
pub const LETTERBOX_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// ImageNet channel means used by pretrained segmentation networks.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet channel standard deviations.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// ImageError covers all possible errors in image processing operations
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to open image at '{path}': {source}")]
    ImageLoadError {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to save image to '{path}': {source}")]
    ImageSaveError {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("image has no pixels: {width}x{height}")]
    EmptyImage { width: u32, height: u32 },

    #[error("invalid target size: {width}x{height}")]
    InvalidTargetSize { width: u32, height: u32 },

    #[error("failed to convert tensor to data: {reason}")]
    TensorConversionError { reason: String },

    #[error("failed to create image buffer: {reason}")]
    BufferCreationError { reason: String },

    #[error("batch size mismatch: expected 1, got {actual}")]
    InvalidBatchSize { actual: usize },

    #[error("unsupported channel count: {channels} (expected {expected})")]
    UnsupportedChannelCount { channels: usize, expected: usize },

    #[error(
        "dimension mismatch between image and mask: image={}x{}, mask={}x{}",
        image_width,
        image_height,
        mask_width,
        mask_height
    )]
    DimensionMismatch {
        image_width: u32,
        image_height: u32,
        mask_width: u32,
        mask_height: u32,
    },

    #[error("background removal failed: {reason}")]
    BackgroundRemovalFailed { reason: String },
}

/// Result type alias for ImageError
pub type ImageResult<T> = Result<T, ImageError>;

/// Opens an image file.
pub fn open_image<P: AsRef<Path>>(path: P) -> ImageResult<DynamicImage> {
    image::open(&path).map_err(|source| ImageError::ImageLoadError {
        path: path.as_ref().display().to_string(),
        source,
    })
}

/// Saves an image, choosing the encoder from the file extension.
pub fn save_image<P: AsRef<Path>>(image: &DynamicImage, path: P) -> ImageResult<()> {
    image
        .save(&path)
        .map_err(|source| ImageError::ImageSaveError {
            path: path.as_ref().display().to_string(),
            source,
        })
}

/// Returns `true` when `ext` (with or without a leading dot, any case) is in `allowed`.
pub fn is_extension_supported(ext: &str, allowed: &[&str]) -> bool {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    allowed.iter().any(|candidate| *candidate == ext)
}

/// Returns `true` when the path's extension is in `allowed`.
pub fn has_supported_extension<P: AsRef<Path>>(path: P, allowed: &[&str]) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| is_extension_supported(ext, allowed))
}

/// Converts an RGB image into a `[1, 3, H, W]` tensor with values in `[0, 1]`.
pub fn rgb_image_to_tensor<B: Backend>(image: &RgbImage, device: &B::Device) -> Tensor<B, 4> {
    let (width, height) = image.dimensions();
    let buf = DynamicImage::ImageRgb8(image.clone()).into_rgb32f().into_raw();

    let data = TensorData::new(buf, [height as usize, width as usize, 3]);
    let tensor = Tensor::<B, 3>::from_data(data, device);

    // Permute to [channels, height, width] and add batch dimension
    tensor.permute([2, 0, 1]).unsqueeze::<4>()
}

/// Applies ImageNet mean/std normalization to a `[N, 3, H, W]` tensor in `[0, 1]`.
pub fn apply_imagenet_normalization<B: Backend>(images: Tensor<B, 4>) -> Tensor<B, 4> {
    let device = images.device();
    let mean = Tensor::<B, 1>::from_floats(IMAGENET_MEAN, &device).reshape([1, 3, 1, 1]);
    let std = Tensor::<B, 1>::from_floats(IMAGENET_STD, &device).reshape([1, 3, 1, 1]);

    (images - mean) / std
}

/// Converts a `[N, 3, H, W]` tensor with values in `[0, 1]` into `N` RGB images.
///
/// Values outside `[0, 1]` are clamped.
pub fn tensor_to_rgb_images<B: Backend>(tensor: Tensor<B, 4>) -> ImageResult<Vec<RgbImage>> {
    let [batch, channels, height, width] = tensor.dims();
    if channels != 3 {
        return Err(ImageError::UnsupportedChannelCount {
            channels,
            expected: 3,
        });
    }

    let data = to_u8_vec(tensor.permute([0, 2, 3, 1]))?;
    let per_image = height * width * 3;

    data.chunks_exact(per_image)
        .take(batch)
        .map(|chunk| {
            ImageBuffer::<Rgb<u8>, _>::from_raw(width as u32, height as u32, chunk.to_vec())
                .ok_or_else(|| ImageError::BufferCreationError {
                    reason: "Failed to create RGB image buffer".to_string(),
                })
        })
        .collect()
}

/// Converts a `[1, 1, H, W]` tensor with values in `[0, 1]` into a grayscale image.
pub fn tensor_to_gray_image<B: Backend>(tensor: Tensor<B, 4>) -> ImageResult<GrayImage> {
    let [batch, channels, height, width] = tensor.dims();
    if batch != 1 {
        return Err(ImageError::InvalidBatchSize { actual: batch });
    }
    if channels != 1 {
        return Err(ImageError::UnsupportedChannelCount {
            channels,
            expected: 1,
        });
    }

    let data = to_u8_vec(tensor)?;
    ImageBuffer::<Luma<u8>, _>::from_raw(width as u32, height as u32, data).ok_or_else(|| {
        ImageError::BufferCreationError {
            reason: "Failed to create grayscale image buffer".to_string(),
        }
    })
}

fn to_u8_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> ImageResult<Vec<u8>> {
    let values = tensor
        .into_data()
        .convert_dtype(DType::F32)
        .to_vec::<f32>()
        .map_err(|e| ImageError::TensorConversionError {
            reason: format!("{e:?}"),
        })?;

    Ok(values
        .into_iter()
        .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect())
}
