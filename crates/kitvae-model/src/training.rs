//! Batch structures shared by the dataset crate and the training loop.
//!
//! Defined next to the model so that `kitvae-train` can build batches without
//! depending on the training orchestration in the umbrella crate.

use burn::{prelude::*, tensor::backend::Backend};

/// A batch of images normalized to `[0, 1]`.
///
/// An autoencoder is its own target, so the batch carries only the inputs.
#[derive(Debug, Clone)]
pub struct VaeBatch<B: Backend> {
    /// Batched image tensor with shape [B, C, H, W].
    pub images: Tensor<B, 4>,
}

impl<B: Backend> VaeBatch<B> {
    /// Create a new batch.
    pub const fn new(images: Tensor<B, 4>) -> Self {
        Self { images }
    }

    /// Get the batch size.
    pub fn batch_size(&self) -> usize {
        self.images.dims()[0]
    }
}

#[cfg(test)]
mod tests {
    use burn::{backend::ndarray::NdArray, tensor::Distribution};

    use super::*;

    type TestBackend = NdArray<f32>;

    #[test]
    fn vae_batch_reports_batch_size() {
        let device = Default::default();
        let images =
            Tensor::<TestBackend, 4>::random([4, 3, 8, 8], Distribution::Default, &device);

        let batch = VaeBatch::new(images);

        assert_eq!(batch.images.shape().dims, [4, 3, 8, 8]);
        assert_eq!(batch.batch_size(), 4);
    }
}
