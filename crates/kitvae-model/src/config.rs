//! Configuration structures for the convolutional VAE.

use burn::prelude::*;

use crate::error::{VaeError, VaeResult};

/// Architecture configuration for the VAE.
///
/// The defaults give the standard kit network: 256x256 RGB input, two
/// stride-2 convolutions with 32 and 64 filters and a 128-dimensional latent
/// space.
#[derive(Config, Debug)]
pub struct VaeConfig {
    /// Side length of the square input image.
    #[config(default = 256)]
    pub image_size: usize,
    /// Number of image channels.
    #[config(default = 3)]
    pub channels: usize,
    /// Size of the latent space.
    #[config(default = 128)]
    pub latent_dim: usize,
    /// Filter counts of the encoder convolutions. The decoder mirrors them.
    #[config(default = "vec![32, 64]")]
    pub filters: Vec<usize>,
    /// Kernel size shared by every (transposed) convolution. Must be odd.
    #[config(default = 3)]
    pub kernel_size: usize,
}

impl VaeConfig {
    /// Validate the configuration and return appropriate errors for invalid settings.
    ///
    /// # Errors
    ///
    /// Returns `Err(VaeError::InvalidConfiguration)` if any rule is violated.
    pub fn validate(&self) -> VaeResult<()> {
        if self.filters.is_empty() {
            return Err(VaeError::InvalidConfiguration {
                reason: "at least one encoder filter is required".to_string(),
            });
        }
        if let Some(position) = self.filters.iter().position(|&f| f == 0) {
            return Err(VaeError::InvalidConfiguration {
                reason: format!("filter count at position {position} must be non-zero"),
            });
        }
        if self.latent_dim == 0 {
            return Err(VaeError::InvalidConfiguration {
                reason: "latent dimension must be non-zero".to_string(),
            });
        }
        if self.channels == 0 {
            return Err(VaeError::InvalidConfiguration {
                reason: "channel count must be non-zero".to_string(),
            });
        }
        if self.kernel_size % 2 == 0 {
            return Err(VaeError::InvalidConfiguration {
                reason: format!("kernel size must be odd, got {}", self.kernel_size),
            });
        }

        let stride_product = 1usize << self.filters.len();
        if self.image_size == 0 || self.image_size % stride_product != 0 {
            return Err(VaeError::InvalidConfiguration {
                reason: format!(
                    "image size {} must be a positive multiple of {} for {} downsampling stages",
                    self.image_size,
                    stride_product,
                    self.filters.len()
                ),
            });
        }

        Ok(())
    }

    /// Spatial size of the deepest feature map (`image_size / 2^stages`).
    pub fn feature_size(&self) -> usize {
        self.image_size >> self.filters.len()
    }

    /// Number of filters in the deepest encoder stage.
    pub fn last_filters(&self) -> usize {
        self.filters.last().copied().unwrap_or(0)
    }

    /// Length of the flattened encoder output feeding the latent heads.
    pub fn flattened_size(&self) -> usize {
        let side = self.feature_size();
        self.last_filters() * side * side
    }

    /// Padding that keeps stride-2 convolutions at exactly half resolution.
    pub(crate) fn padding(&self) -> usize {
        self.kernel_size / 2
    }

    /// Input shape of a single image, `[channels, image_size, image_size]`.
    pub fn input_shape(&self) -> [usize; 3] {
        [self.channels, self.image_size, self.image_size]
    }
}
