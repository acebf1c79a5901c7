//! Backend-independent run lifecycle.

use std::path::Path;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::{
    error::{TrackingError, TrackingResult},
    types::{Metric, ModelVersion, Param, RunInfo, RunStatus},
};

/// Storage for runs, their params, metrics and artifacts, and a model registry.
pub trait TrackingBackend {
    /// Starts a run in `experiment`, creating the experiment if needed.
    fn create_run(&self, experiment: &str, run_name: &str) -> TrackingResult<RunInfo>;

    fn log_params(&self, run: &RunInfo, params: &[Param]) -> TrackingResult<()>;

    fn log_metric(&self, run: &RunInfo, metric: &Metric) -> TrackingResult<()>;

    /// Stores one local file under `artifact_path` (the artifact root when `None`).
    fn log_artifact(
        &self,
        run: &RunInfo,
        local_path: &Path,
        artifact_path: Option<&str>,
    ) -> TrackingResult<()>;

    fn finish_run(&self, run: &RunInfo, status: RunStatus) -> TrackingResult<()>;

    /// Registers the artifact directory `artifact_path` of `run` as a new
    /// version of model `name`.
    fn register_model(
        &self,
        name: &str,
        run: &RunInfo,
        artifact_path: &str,
    ) -> TrackingResult<ModelVersion>;
}

/// Runs experiments against one backend.
#[derive(Debug)]
pub struct ExperimentTracker<T: TrackingBackend> {
    backend: T,
    experiment: String,
}

impl<T: TrackingBackend> ExperimentTracker<T> {
    pub fn new(backend: T, experiment: impl Into<String>) -> Self {
        Self {
            backend,
            experiment: experiment.into(),
        }
    }

    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    pub const fn backend(&self) -> &T {
        &self.backend
    }

    /// Runs `f` inside a new run.
    ///
    /// The run is finished as `FINISHED` when `f` succeeds and as `FAILED`
    /// when it returns an error, which is then passed through.
    pub fn with_run<R, E, F>(&self, run_name: &str, f: F) -> Result<R, E>
    where
        F: FnOnce(&ActiveRun<'_, T>) -> Result<R, E>,
        E: From<TrackingError>,
    {
        let info = self.backend.create_run(&self.experiment, run_name)?;
        info!(
            experiment = %self.experiment,
            run_id = %info.run_id,
            run_name,
            "started run"
        );

        let run = ActiveRun {
            backend: &self.backend,
            info,
        };

        match f(&run) {
            Ok(value) => {
                self.backend.finish_run(&run.info, RunStatus::Finished)?;
                info!(run_id = %run.info.run_id, "run finished");
                Ok(value)
            }
            Err(e) => {
                if let Err(finish_error) = self.backend.finish_run(&run.info, RunStatus::Failed) {
                    warn!(
                        run_id = %run.info.run_id,
                        error = %finish_error,
                        "failed to mark run as failed"
                    );
                }
                warn!(run_id = %run.info.run_id, "run failed");
                Err(e)
            }
        }
    }
}

/// Logging handle for a run in progress.
pub struct ActiveRun<'a, T: TrackingBackend> {
    backend: &'a T,
    info: RunInfo,
}

impl<T: TrackingBackend> ActiveRun<'_, T> {
    pub const fn info(&self) -> &RunInfo {
        &self.info
    }

    pub fn run_id(&self) -> &str {
        &self.info.run_id
    }

    pub fn log_param(&self, key: &str, value: impl ToString) -> TrackingResult<()> {
        self.log_params(&[Param::new(key, value)])
    }

    pub fn log_params(&self, params: &[Param]) -> TrackingResult<()> {
        debug!(run_id = %self.info.run_id, count = params.len(), "logging params");
        self.backend.log_params(&self.info, params)
    }

    pub fn log_metric(&self, key: &str, value: f64, step: i64) -> TrackingResult<()> {
        debug!(run_id = %self.info.run_id, key, value, step, "logging metric");
        self.backend
            .log_metric(&self.info, &Metric::new(key, value, step))
    }

    pub fn log_artifact(
        &self,
        local_path: &Path,
        artifact_path: Option<&str>,
    ) -> TrackingResult<()> {
        debug!(run_id = %self.info.run_id, path = %local_path.display(), "logging artifact");
        self.backend
            .log_artifact(&self.info, local_path, artifact_path)
    }

    /// Logs every file below `local_dir`, keeping relative paths under `artifact_path`.
    pub fn log_artifacts(
        &self,
        local_dir: &Path,
        artifact_path: Option<&str>,
    ) -> TrackingResult<()> {
        for entry in WalkDir::new(local_dir).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e
                    .path()
                    .map_or_else(|| local_dir.to_path_buf(), Path::to_path_buf);
                TrackingError::io(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let parent = entry
                .path()
                .parent()
                .and_then(|p| p.strip_prefix(local_dir).ok())
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();

            let target = match (artifact_path, parent.is_empty()) {
                (Some(base), true) => Some(base.to_string()),
                (Some(base), false) => Some(format!("{base}/{parent}")),
                (None, true) => None,
                (None, false) => Some(parent),
            };
            self.log_artifact(entry.path(), target.as_deref())?;
        }
        Ok(())
    }

    pub fn register_model(&self, name: &str, artifact_path: &str) -> TrackingResult<ModelVersion> {
        let version = self
            .backend
            .register_model(name, &self.info, artifact_path)?;
        info!(
            model = %version.name,
            version = version.version,
            source = %version.source,
            "registered model version"
        );
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, path::PathBuf};

    use super::*;

    /// Records every call as a short string.
    #[derive(Default)]
    struct RecordingBackend {
        events: RefCell<Vec<String>>,
    }

    impl TrackingBackend for RecordingBackend {
        fn create_run(&self, experiment: &str, run_name: &str) -> TrackingResult<RunInfo> {
            self.events
                .borrow_mut()
                .push(format!("create {experiment} {run_name}"));
            Ok(RunInfo {
                run_id: "0".repeat(32),
                experiment_id: experiment.to_string(),
                run_name: run_name.to_string(),
                artifact_uri: "memory://artifacts".to_string(),
                start_time: 0,
            })
        }

        fn log_params(&self, _run: &RunInfo, params: &[Param]) -> TrackingResult<()> {
            for p in params {
                self.events
                    .borrow_mut()
                    .push(format!("param {}={}", p.key, p.value));
            }
            Ok(())
        }

        fn log_metric(&self, _run: &RunInfo, metric: &Metric) -> TrackingResult<()> {
            self.events
                .borrow_mut()
                .push(format!("metric {}={}@{}", metric.key, metric.value, metric.step));
            Ok(())
        }

        fn log_artifact(
            &self,
            _run: &RunInfo,
            local_path: &Path,
            artifact_path: Option<&str>,
        ) -> TrackingResult<()> {
            let name = local_path.file_name().unwrap().to_string_lossy();
            self.events
                .borrow_mut()
                .push(format!("artifact {}:{name}", artifact_path.unwrap_or("")));
            Ok(())
        }

        fn finish_run(&self, _run: &RunInfo, status: RunStatus) -> TrackingResult<()> {
            self.events.borrow_mut().push(format!("finish {status}"));
            Ok(())
        }

        fn register_model(
            &self,
            name: &str,
            run: &RunInfo,
            artifact_path: &str,
        ) -> TrackingResult<ModelVersion> {
            self.events
                .borrow_mut()
                .push(format!("register {name} {artifact_path}"));
            Ok(ModelVersion {
                name: name.to_string(),
                version: 1,
                source: format!("{}/{artifact_path}", run.artifact_uri),
                run_id: run.run_id.clone(),
            })
        }
    }

    #[test]
    fn successful_run_is_finished() {
        let tracker = ExperimentTracker::new(RecordingBackend::default(), "kits");

        let result: TrackingResult<u32> = tracker.with_run("train", |run| {
            run.log_param("epochs", 5)?;
            run.log_metric("train_loss", 0.5, 0)?;
            let version = run.register_model("image_generation_models", "vae_bundle")?;
            assert_eq!(version.source, "memory://artifacts/vae_bundle");
            Ok(7)
        });

        assert_eq!(result.unwrap(), 7);
        assert_eq!(
            *tracker.backend().events.borrow(),
            [
                "create kits train",
                "param epochs=5",
                "metric train_loss=0.5@0",
                "register image_generation_models vae_bundle",
                "finish FINISHED",
            ]
        );
    }

    #[test]
    fn failing_closure_marks_run_failed() {
        let tracker = ExperimentTracker::new(RecordingBackend::default(), "kits");

        let result: TrackingResult<()> = tracker.with_run("train", |_| {
            Err(TrackingError::RunNotFound {
                run_id: "x".to_string(),
            })
        });

        assert!(matches!(result, Err(TrackingError::RunNotFound { .. })));
        let events = tracker.backend().events.borrow();
        assert_eq!(events.last().map(String::as_str), Some("finish FAILED"));
    }

    #[test]
    fn log_artifacts_keeps_relative_layout() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("bundle");
        std::fs::create_dir_all(bundle.join("weights")).unwrap();
        std::fs::write(bundle.join("config.json"), "{}").unwrap();
        std::fs::write(bundle.join("weights").join("model.mpk"), [0u8; 4]).unwrap();

        let tracker = ExperimentTracker::new(RecordingBackend::default(), "kits");
        tracker
            .with_run("bundle", |run| {
                run.log_artifacts(&bundle, Some("vae_bundle"))
            })
            .unwrap();

        let events: Vec<PathBuf> = tracker
            .backend()
            .events
            .borrow()
            .iter()
            .filter_map(|e| e.strip_prefix("artifact ").map(PathBuf::from))
            .collect();
        assert_eq!(
            events,
            [
                PathBuf::from("vae_bundle:config.json"),
                PathBuf::from("vae_bundle/weights:model.mpk"),
            ]
        );
    }
}
