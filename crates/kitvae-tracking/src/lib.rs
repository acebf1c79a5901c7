//! # kitvae-tracking
//!
//! Experiment tracking for training runs. A [`TrackingBackend`] stores runs,
//! params, metrics, artifacts and registered model versions; the
//! [`ExperimentTracker`] drives a run's lifecycle on top of it.
//!
//! Two backends are provided: [`MlflowClient`] for an MLflow tracking server
//! and [`LocalFileStore`] for offline runs on disk.

pub mod error;
pub mod mlflow;
pub mod store;
pub mod tracker;
pub mod types;

pub use error::{TrackingError, TrackingResult};
pub use mlflow::MlflowClient;
pub use store::{LocalFileStore, RunMeta};
pub use tracker::{ActiveRun, ExperimentTracker, TrackingBackend};
pub use types::{Metric, ModelSignature, ModelVersion, Param, RunInfo, RunStatus};
