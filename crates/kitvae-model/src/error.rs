use thiserror::Error;

/// The error type for `kitvae-model` operations.
///
/// Covers configuration problems detected before the network is built and
/// shape mismatches detected before a forward pass.
#[derive(Error, Debug)]
pub enum VaeError {
    /// Error for when an invalid model configuration is provided.
    /// This can happen if configuration parameters are logically inconsistent.
    #[error("Invalid model configuration: {reason}")]
    InvalidConfiguration {
        /// The reason why the configuration is invalid.
        reason: String,
    },

    /// Error for when an input tensor has an invalid shape.
    #[error("Invalid input tensor shape: expected {expected}, got {actual}")]
    InvalidTensorShape {
        /// The expected tensor shape.
        expected: String,
        /// The actual tensor shape.
        actual: String,
    },
}

/// A specialized `Result` type for VAE model operations.
pub type VaeResult<T> = Result<T, VaeError>;
