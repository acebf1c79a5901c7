//! Values exchanged with tracking backends.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{TrackingError, TrackingResult};

/// Current time as Unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A fresh 32-character hexadecimal run id.
pub fn new_run_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}

/// Checks that a key can be used as a param, metric, experiment, model or
/// artifact path name.
///
/// Allowed characters are ASCII alphanumerics, `_`, `-`, `.`, ` ` and `/`.
/// Empty keys, absolute paths and `..` components are rejected.
pub fn validate_key(key: &str) -> TrackingResult<()> {
    let invalid = |reason: &str| {
        Err(TrackingError::InvalidKey {
            key: key.to_string(),
            reason: reason.to_string(),
        })
    };

    if key.trim().is_empty() {
        return invalid("key is empty");
    }
    if key.starts_with('/') {
        return invalid("key must be relative");
    }
    if key.split('/').any(|part| part == ".." || part.is_empty()) {
        return invalid("key contains an empty or '..' path component");
    }
    if let Some(c) = key
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ' ' | '/')))
    {
        return invalid(&format!("character '{c}' is not allowed"));
    }
    Ok(())
}

/// A run parameter. Params are write-once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub key: String,
    pub value: String,
}

impl Param {
    pub fn new(key: impl Into<String>, value: impl ToString) -> Self {
        Self {
            key: key.into(),
            value: value.to_string(),
        }
    }
}

/// One metric observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub key: String,
    pub value: f64,
    pub timestamp: i64,
    pub step: i64,
}

impl Metric {
    /// A metric stamped with the current time.
    pub fn new(key: impl Into<String>, value: f64, step: i64) -> Self {
        Self {
            key: key.into(),
            value,
            timestamp: now_millis(),
            step,
        }
    }
}

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Scheduled,
    Finished,
    Failed,
    Killed,
}

impl RunStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Scheduled => "SCHEDULED",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::Killed => "KILLED",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies a run on its backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub experiment_id: String,
    pub run_name: String,
    pub artifact_uri: String,
    pub start_time: i64,
}

/// A registered model version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub name: String,
    pub version: u64,
    pub source: String,
    pub run_id: String,
}

/// The shape and dtype of one tensor input or output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorSpec {
    pub dtype: String,
    pub shape: Vec<i64>,
}

/// One entry of a model signature, in MLflow's schema format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEntry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "tensor-spec")]
    pub tensor_spec: TensorSpec,
}

/// Input/output description stored with a logged model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSignature {
    pub inputs: Vec<SignatureEntry>,
    pub outputs: Vec<SignatureEntry>,
}

impl ModelSignature {
    /// Tensor-based signature with a variable (`-1`) leading batch dimension.
    pub fn for_tensor(input_shape: &[usize], output_shape: &[usize], dtype: &str) -> Self {
        let entry = |shape: &[usize]| SignatureEntry {
            kind: "tensor".to_string(),
            tensor_spec: TensorSpec {
                dtype: dtype.to_string(),
                shape: std::iter::once(-1)
                    .chain(shape.iter().map(|&d| d as i64))
                    .collect(),
            },
        };

        Self {
            inputs: vec![entry(input_shape)],
            outputs: vec![entry(output_shape)],
        }
    }

    pub fn to_json(&self) -> TrackingResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_are_32_hex_chars() {
        let id = new_run_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_run_id());
    }

    #[test]
    fn keys_are_validated() {
        assert!(validate_key("train_loss").is_ok());
        assert!(validate_key("plots/loss chart.png").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("a/../b").is_err());
        assert!(validate_key("a//b").is_err());
        assert!(validate_key("loss:val").is_err());
    }

    #[test]
    fn run_status_serializes_in_upper_case() {
        assert_eq!(
            serde_json::to_string(&RunStatus::Finished).unwrap(),
            "\"FINISHED\""
        );
        assert_eq!(RunStatus::Failed.to_string(), "FAILED");
    }

    #[test]
    fn tensor_signature_has_variable_batch_dimension() {
        let signature = ModelSignature::for_tensor(&[256, 256, 3], &[256, 256, 3], "float32");
        let json: serde_json::Value = serde_json::from_str(&signature.to_json().unwrap()).unwrap();

        assert_eq!(json["inputs"][0]["type"], "tensor");
        assert_eq!(json["inputs"][0]["tensor-spec"]["dtype"], "float32");
        assert_eq!(
            json["outputs"][0]["tensor-spec"]["shape"],
            serde_json::json!([-1, 256, 256, 3])
        );
    }

    #[test]
    fn params_stringify_values() {
        let param = Param::new("batch_size", 8);
        assert_eq!(param.value, "8");
        assert_eq!(Param::new("learning_rate", 0.001).value, "0.001");
    }
}
