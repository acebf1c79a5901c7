//! Training objective for the VAE.
//!
//! By default only the reconstruction MSE is optimized. The KL-divergence term
//! that ties the latent posterior to a standard normal prior is always computed
//! and reported, and is added to the objective when
//! [`VaeLossConfig::kl_weight`] is non-zero.

use burn::{
    nn::loss::{MseLoss, Reduction},
    prelude::*,
};

use crate::models::VaeOutput;

/// Configuration for [`VaeLoss`].
#[derive(Config, Debug)]
pub struct VaeLossConfig {
    /// Weight of the KL-divergence term. `0.0` trains on reconstruction error alone.
    #[config(default = 0.0)]
    pub kl_weight: f64,
}

impl VaeLossConfig {
    /// Initializes the loss.
    pub fn init(&self) -> VaeLoss {
        VaeLoss {
            kl_weight: self.kl_weight,
        }
    }
}

/// Reconstruction MSE plus an optionally weighted KL divergence.
#[derive(Debug, Clone)]
pub struct VaeLoss {
    kl_weight: f64,
}

/// The individual terms of one loss evaluation. Each tensor has shape `[1]`.
#[derive(Debug, Clone)]
pub struct VaeLossOutput<B: Backend> {
    /// `reconstruction + kl_weight * kl`, the value that is backpropagated.
    pub total: Tensor<B, 1>,
    /// Mean squared error over every pixel and channel.
    pub reconstruction: Tensor<B, 1>,
    /// Batch-mean KL divergence from the standard normal prior.
    pub kl: Tensor<B, 1>,
}

impl VaeLoss {
    /// Computes the loss of a forward pass against the input images.
    pub fn forward<B: Backend>(
        &self,
        output: &VaeOutput<B>,
        targets: Tensor<B, 4>,
    ) -> VaeLossOutput<B> {
        let reconstruction = reconstruction_mse(output.reconstruction.clone(), targets);
        let kl = kl_divergence(output.z_mean.clone(), output.z_log_var.clone());

        let total = if self.kl_weight == 0.0 {
            reconstruction.clone()
        } else {
            reconstruction.clone() + kl.clone().mul_scalar(self.kl_weight)
        };

        VaeLossOutput {
            total,
            reconstruction,
            kl,
        }
    }

    /// Whether the KL term contributes to the gradient.
    pub fn is_regularized(&self) -> bool {
        self.kl_weight != 0.0
    }
}

/// Mean squared error over all elements.
pub fn reconstruction_mse<B: Backend>(
    reconstruction: Tensor<B, 4>,
    targets: Tensor<B, 4>,
) -> Tensor<B, 1> {
    MseLoss::new().forward(reconstruction, targets, Reduction::Mean)
}

/// `mean_batch(-0.5 * sum(1 + log_var - mean^2 - exp(log_var)))`.
pub fn kl_divergence<B: Backend>(z_mean: Tensor<B, 2>, z_log_var: Tensor<B, 2>) -> Tensor<B, 1> {
    let per_dim = z_log_var.clone().add_scalar(1.0) - z_mean.powf_scalar(2.0) - z_log_var.exp();
    per_dim.sum_dim(1).mean().mul_scalar(-0.5)
}
