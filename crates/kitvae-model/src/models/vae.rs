//! # Variational autoencoder
//!
//! Ties the [`Encoder`] and [`Decoder`] together through the reparameterization
//! trick: `z = mean + exp(0.5 * log_var) * eps` with `eps ~ N(0, 1)` drawn fresh
//! on every forward pass, so reconstructions are not deterministic.
//! [`Vae::reconstruct_mean`] decodes the mean directly for a deterministic path.

use burn::{prelude::*, tensor::Distribution};

use super::{Decoder, Encoder};
use crate::{
    config::VaeConfig,
    error::{VaeError, VaeResult},
};

/// Everything produced by one stochastic forward pass.
#[derive(Debug, Clone)]
pub struct VaeOutput<B: Backend> {
    /// Reconstructed images `[B, C, S, S]` in `[0, 1]`.
    pub reconstruction: Tensor<B, 4>,
    /// Latent means `[B, latent_dim]`.
    pub z_mean: Tensor<B, 2>,
    /// Latent log-variances `[B, latent_dim]`.
    pub z_log_var: Tensor<B, 2>,
    /// The sampled latent vectors `[B, latent_dim]`.
    pub z: Tensor<B, 2>,
}

/// The convolutional VAE.
#[derive(Module, Debug)]
pub struct Vae<B: Backend> {
    encoder: Encoder<B>,
    decoder: Decoder<B>,
    channels: usize,
    image_size: usize,
    latent_dim: usize,
}

impl VaeConfig {
    /// Initializes a VAE with freshly initialized weights.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not pass [`VaeConfig::validate`].
    pub fn init<B: Backend>(&self, device: &B::Device) -> VaeResult<Vae<B>> {
        self.validate()?;

        Ok(Vae {
            encoder: Encoder::new(self, device),
            decoder: Decoder::new(self, device),
            channels: self.channels,
            image_size: self.image_size,
            latent_dim: self.latent_dim,
        })
    }
}

impl<B: Backend> Vae<B> {
    /// Runs encoder, sampling and decoder.
    pub fn forward(&self, images: Tensor<B, 4>) -> VaeOutput<B> {
        let (z_mean, z_log_var) = self.encode(images);
        let z = Self::sample(z_mean.clone(), z_log_var.clone());
        let reconstruction = self.decode(z.clone());

        VaeOutput {
            reconstruction,
            z_mean,
            z_log_var,
            z,
        }
    }

    /// Reparameterized sample `mean + exp(0.5 * log_var) * eps`.
    pub fn sample(z_mean: Tensor<B, 2>, z_log_var: Tensor<B, 2>) -> Tensor<B, 2> {
        let eps = Tensor::random(
            z_mean.shape(),
            Distribution::Normal(0.0, 1.0),
            &z_mean.device(),
        );
        z_mean + z_log_var.mul_scalar(0.5).exp() * eps
    }

    /// Encodes images into `(z_mean, z_log_var)`.
    pub fn encode(&self, images: Tensor<B, 4>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        self.encoder.forward(images)
    }

    /// Decodes latent vectors into images.
    pub fn decode(&self, latent: Tensor<B, 2>) -> Tensor<B, 4> {
        self.decoder.forward(latent)
    }

    /// Deterministic reconstruction that decodes the latent mean (noise fixed to zero).
    pub fn reconstruct_mean(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let (z_mean, _) = self.encode(images);
        self.decode(z_mean)
    }

    /// Checks that `images` matches the `[B, C, S, S]` layout this model was built for.
    ///
    /// # Errors
    ///
    /// Returns `VaeError::InvalidTensorShape` when channels or spatial sizes differ.
    pub fn check_input(&self, images: &Tensor<B, 4>) -> VaeResult<()> {
        let [_, channels, height, width] = images.dims();
        if channels != self.channels || height != self.image_size || width != self.image_size {
            return Err(VaeError::InvalidTensorShape {
                expected: format!(
                    "[N, {}, {}, {}]",
                    self.channels, self.image_size, self.image_size
                ),
                actual: format!("{:?}", images.dims()),
            });
        }
        Ok(())
    }

    /// Per-image input shape `[C, S, S]`.
    pub const fn input_shape(&self) -> [usize; 3] {
        [self.channels, self.image_size, self.image_size]
    }

    /// Size of the latent space.
    pub const fn latent_dim(&self) -> usize {
        self.latent_dim
    }
}
