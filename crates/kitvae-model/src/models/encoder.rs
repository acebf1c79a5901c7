//! # Encoder
//!
//! Maps an image batch `[B, C, S, S]` to the parameters of a diagonal Gaussian
//! over the latent space. Each stage is a stride-2 convolution followed by ReLU,
//! so the deepest feature map is `S / 2^stages` wide. The flattened features
//! feed two independent dense heads for the mean and the log-variance.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
};

use crate::config::VaeConfig;

/// Convolutional encoder producing `(z_mean, z_log_var)`.
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    convs: Vec<Conv2d<B>>,
    relu: Relu,
    pub(crate) z_mean: Linear<B>,
    pub(crate) z_log_var: Linear<B>,
}

impl<B: Backend> Encoder<B> {
    /// Builds the encoder described by `config`.
    ///
    /// The configuration is expected to be validated already.
    pub fn new(config: &VaeConfig, device: &B::Device) -> Self {
        let padding = config.padding();
        let mut in_channels = config.channels;
        let mut convs = Vec::with_capacity(config.filters.len());

        for &filters in &config.filters {
            convs.push(
                Conv2dConfig::new(
                    [in_channels, filters],
                    [config.kernel_size, config.kernel_size],
                )
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(padding, padding))
                .init(device),
            );
            in_channels = filters;
        }

        let flattened = config.flattened_size();
        let z_mean = LinearConfig::new(flattened, config.latent_dim).init(device);
        let z_log_var = LinearConfig::new(flattened, config.latent_dim).init(device);

        Self {
            convs,
            relu: Relu::new(),
            z_mean,
            z_log_var,
        }
    }

    /// Returns the mean and log-variance, each of shape `[B, latent_dim]`.
    pub fn forward(&self, images: Tensor<B, 4>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let mut x = images;
        for conv in &self.convs {
            x = self.relu.forward(conv.forward(x));
        }

        let x = x.flatten::<2>(1, 3);
        let z_mean = self.z_mean.forward(x.clone());
        let z_log_var = self.z_log_var.forward(x);

        (z_mean, z_log_var)
    }
}
