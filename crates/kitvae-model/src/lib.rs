//! # kitvae-model
//!
//! A convolutional variational autoencoder for fixed-size RGB product images,
//! built using the Burn deep learning framework.
//!
//! ## Modules
//!
//! - `config`: Architecture configuration ([`VaeConfig`]).
//! - `models`: The [`Encoder`], [`Decoder`] and the [`Vae`] that joins them
//!   through the reparameterization trick.
//! - `loss`: Reconstruction MSE with an optional KL-divergence term.
//! - `training`: Batch structures consumed by the training loop.

mod config;
mod error;
pub mod loss;
mod models;
pub mod training;

#[doc(inline)]
pub use config::VaeConfig;
#[doc(inline)]
pub use error::{VaeError, VaeResult};
#[doc(inline)]
pub use loss::{VaeLoss, VaeLossConfig, VaeLossOutput};
#[doc(inline)]
pub use models::{Decoder, Encoder, Vae, VaeOutput, VaeRecord};
#[doc(inline)]
pub use training::VaeBatch;
