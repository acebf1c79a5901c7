//! # Decoder
//!
//! Expands a latent vector back into an image. A dense layer produces the
//! deepest feature map, which is reshaped and upsampled by stride-2 transposed
//! convolutions mirroring the encoder. A final stride-1 transposed convolution
//! maps to the image channels and a sigmoid squashes every value into `[0, 1]`.

use burn::{
    nn::{
        conv::{ConvTranspose2d, ConvTranspose2dConfig},
        Linear, LinearConfig, Relu,
    },
    prelude::*,
    tensor::activation::sigmoid,
};

use crate::config::VaeConfig;

/// Transposed-convolutional decoder.
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    dense: Linear<B>,
    deconvs: Vec<ConvTranspose2d<B>>,
    output: ConvTranspose2d<B>,
    relu: Relu,
    feature_channels: usize,
    feature_size: usize,
}

impl<B: Backend> Decoder<B> {
    /// Builds the decoder described by `config`.
    pub fn new(config: &VaeConfig, device: &B::Device) -> Self {
        let padding = config.padding();
        let kernel = [config.kernel_size, config.kernel_size];
        let feature_channels = config.last_filters();

        let dense = LinearConfig::new(config.latent_dim, config.flattened_size()).init(device);

        let mut in_channels = feature_channels;
        let mut deconvs = Vec::with_capacity(config.filters.len());
        for &filters in config.filters.iter().rev() {
            deconvs.push(
                ConvTranspose2dConfig::new([in_channels, filters], kernel)
                    .with_stride([2, 2])
                    .with_padding([padding, padding])
                    .with_padding_out([1, 1])
                    .init(device),
            );
            in_channels = filters;
        }

        let output = ConvTranspose2dConfig::new([in_channels, config.channels], kernel)
            .with_padding([padding, padding])
            .init(device);

        Self {
            dense,
            deconvs,
            output,
            relu: Relu::new(),
            feature_channels,
            feature_size: config.feature_size(),
        }
    }

    /// Decodes `[B, latent_dim]` latents into `[B, C, S, S]` images in `[0, 1]`.
    pub fn forward(&self, latent: Tensor<B, 2>) -> Tensor<B, 4> {
        let [batch, _] = latent.dims();

        let x = self.relu.forward(self.dense.forward(latent));
        let mut x = x.reshape([
            batch,
            self.feature_channels,
            self.feature_size,
            self.feature_size,
        ]);

        for deconv in &self.deconvs {
            x = self.relu.forward(deconv.forward(x));
        }

        sigmoid(self.output.forward(x))
    }
}
