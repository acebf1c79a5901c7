pub mod decoder;
pub mod encoder;
pub mod vae;

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use vae::{Vae, VaeOutput, VaeRecord};
