//! `KitVAE`: a kit image pipeline ending in a convolutional variational autoencoder.
//!
//! Scraped product photos go through background removal, compositing on black
//! and letterboxing before a VAE is trained on them, with the run logged to an
//! experiment tracker.

pub mod backend;
pub mod plots;
pub mod preprocess;
pub mod review;
pub mod training;

#[doc(inline)]
pub use backend::burn_backend_types;
#[doc(inline)]
pub use kitvae_model as model;
#[doc(inline)]
pub use kitvae_scrape as scrape;
#[doc(inline)]
pub use kitvae_tracking as tracking;
#[doc(inline)]
pub use kitvae_train as train;
#[doc(inline)]
pub use kitvae_util as util;
