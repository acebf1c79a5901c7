//! File-based tracking backend.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/<experiment>/meta.json
//! <root>/<experiment>/<run_id>/meta.json
//! <root>/<experiment>/<run_id>/params/<key>
//! <root>/<experiment>/<run_id>/metrics/<key>      "<timestamp> <value> <step>" per line
//! <root>/<experiment>/<run_id>/artifacts/...
//! <root>/models/<name>/version-<n>/meta.json
//! ```

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{TrackingError, TrackingResult},
    tracker::TrackingBackend,
    types::{
        new_run_id, now_millis, validate_key, Metric, ModelVersion, Param, RunInfo, RunStatus,
    },
};

const MODELS_DIR: &str = "models";

/// Persisted state of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMeta {
    pub run_id: String,
    pub run_name: String,
    pub experiment: String,
    pub status: RunStatus,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub artifact_uri: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExperimentMeta {
    name: String,
    creation_time: i64,
}

/// Tracking backend writing everything below a root directory.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    /// Opens (and creates) a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> TrackingResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| TrackingError::io(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the run's params, metrics and artifacts.
    pub fn run_dir(&self, run: &RunInfo) -> PathBuf {
        self.root.join(&run.experiment_id).join(&run.run_id)
    }

    /// Directory holding the run's artifacts.
    pub fn artifact_dir(&self, run: &RunInfo) -> PathBuf {
        self.run_dir(run).join("artifacts")
    }

    /// Reads the persisted metadata of a run.
    pub fn load_run_meta(&self, run: &RunInfo) -> TrackingResult<RunMeta> {
        let path = self.run_dir(run).join("meta.json");
        if !path.is_file() {
            return Err(TrackingError::RunNotFound {
                run_id: run.run_id.clone(),
            });
        }
        read_json(&path)
    }

    /// Reads every recorded value of a metric as `(step, value)` pairs.
    pub fn read_metric(&self, run: &RunInfo, key: &str) -> TrackingResult<Vec<(i64, f64)>> {
        validate_key(key)?;
        let path = self.run_dir(run).join("metrics").join(key);
        let content = fs::read_to_string(&path).map_err(|e| TrackingError::io(&path, e))?;

        Ok(content
            .lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let _timestamp = parts.next()?;
                let value = parts.next()?.parse().ok()?;
                let step = parts.next()?.parse().ok()?;
                Some((step, value))
            })
            .collect())
    }

    fn ensure_experiment(&self, experiment: &str) -> TrackingResult<PathBuf> {
        validate_key(experiment)?;
        let dir = self.root.join(experiment);
        let meta_path = dir.join("meta.json");
        if !meta_path.is_file() {
            create_dir(&dir)?;
            write_json(
                &meta_path,
                &ExperimentMeta {
                    name: experiment.to_string(),
                    creation_time: now_millis(),
                },
            )?;
            debug!(experiment, path = %dir.display(), "created experiment");
        }
        Ok(dir)
    }

    fn next_model_version(&self, model_dir: &Path) -> TrackingResult<u64> {
        if !model_dir.is_dir() {
            return Ok(1);
        }

        let entries = fs::read_dir(model_dir).map_err(|e| TrackingError::io(model_dir, e))?;
        let mut latest = 0;
        for entry in entries {
            let entry = entry.map_err(|e| TrackingError::io(model_dir, e))?;
            let name = entry.file_name();
            if let Some(version) = name
                .to_str()
                .and_then(|n| n.strip_prefix("version-"))
                .and_then(|v| v.parse::<u64>().ok())
            {
                latest = latest.max(version);
            }
        }
        Ok(latest + 1)
    }
}

impl TrackingBackend for LocalFileStore {
    fn create_run(&self, experiment: &str, run_name: &str) -> TrackingResult<RunInfo> {
        let experiment_dir = self.ensure_experiment(experiment)?;
        let run_id = new_run_id();
        let run_dir = experiment_dir.join(&run_id);

        for sub in ["params", "metrics", "artifacts"] {
            create_dir(&run_dir.join(sub))?;
        }

        let start_time = now_millis();
        let artifact_uri = format!("file://{}", run_dir.join("artifacts").display());
        write_json(
            &run_dir.join("meta.json"),
            &RunMeta {
                run_id: run_id.clone(),
                run_name: run_name.to_string(),
                experiment: experiment.to_string(),
                status: RunStatus::Running,
                start_time,
                end_time: None,
                artifact_uri: artifact_uri.clone(),
            },
        )?;

        Ok(RunInfo {
            run_id,
            experiment_id: experiment.to_string(),
            run_name: run_name.to_string(),
            artifact_uri,
            start_time,
        })
    }

    fn log_params(&self, run: &RunInfo, params: &[Param]) -> TrackingResult<()> {
        let params_dir = self.run_dir(run).join("params");
        for param in params {
            validate_key(&param.key)?;
            let path = params_dir.join(&param.key);

            if path.is_file() {
                let existing = fs::read_to_string(&path).map_err(|e| TrackingError::io(&path, e))?;
                if existing != param.value {
                    return Err(TrackingError::ParamConflict {
                        key: param.key.clone(),
                        existing,
                        value: param.value.clone(),
                    });
                }
                continue;
            }

            if let Some(parent) = path.parent() {
                create_dir(parent)?;
            }
            fs::write(&path, &param.value).map_err(|e| TrackingError::io(&path, e))?;
        }
        Ok(())
    }

    fn log_metric(&self, run: &RunInfo, metric: &Metric) -> TrackingResult<()> {
        validate_key(&metric.key)?;
        let path = self.run_dir(run).join("metrics").join(&metric.key);
        if let Some(parent) = path.parent() {
            create_dir(parent)?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| TrackingError::io(&path, e))?;
        writeln!(file, "{} {} {}", metric.timestamp, metric.value, metric.step)
            .map_err(|e| TrackingError::io(&path, e))
    }

    fn log_artifact(
        &self,
        run: &RunInfo,
        local_path: &Path,
        artifact_path: Option<&str>,
    ) -> TrackingResult<()> {
        let mut target_dir = self.artifact_dir(run);
        if let Some(sub) = artifact_path {
            validate_key(sub)?;
            target_dir.push(sub);
        }
        create_dir(&target_dir)?;

        let file_name = local_path.file_name().ok_or_else(|| TrackingError::InvalidKey {
            key: local_path.display().to_string(),
            reason: "artifact path has no file name".to_string(),
        })?;
        let target = target_dir.join(file_name);
        fs::copy(local_path, &target).map_err(|e| TrackingError::io(local_path, e))?;

        debug!(from = %local_path.display(), to = %target.display(), "stored artifact");
        Ok(())
    }

    fn finish_run(&self, run: &RunInfo, status: RunStatus) -> TrackingResult<()> {
        let mut meta = self.load_run_meta(run)?;
        meta.status = status;
        meta.end_time = Some(now_millis());
        write_json(&self.run_dir(run).join("meta.json"), &meta)
    }

    fn register_model(
        &self,
        name: &str,
        run: &RunInfo,
        artifact_path: &str,
    ) -> TrackingResult<ModelVersion> {
        validate_key(name)?;
        validate_key(artifact_path)?;

        let model_dir = self.root.join(MODELS_DIR).join(name);
        let version = self.next_model_version(&model_dir)?;
        let version_dir = model_dir.join(format!("version-{version}"));
        create_dir(&version_dir)?;

        let model_version = ModelVersion {
            name: name.to_string(),
            version,
            source: format!("{}/{artifact_path}", run.artifact_uri),
            run_id: run.run_id.clone(),
        };
        write_json(&version_dir.join("meta.json"), &model_version)?;
        Ok(model_version)
    }
}

fn create_dir(path: &Path) -> TrackingResult<()> {
    fs::create_dir_all(path).map_err(|e| TrackingError::io(path, e))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> TrackingResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).map_err(|e| TrackingError::io(path, e))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> TrackingResult<T> {
    let json = fs::read_to_string(path).map_err(|e| TrackingError::io(path, e))?;
    Ok(serde_json::from_str(&json)?)
}
