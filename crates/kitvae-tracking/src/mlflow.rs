//! MLflow tracking server client.
//!
//! Talks to the REST API (`/api/2.0/mlflow/...`) with a blocking `reqwest`
//! client. Artifacts are uploaded through the server's artifact proxy
//! (`/api/2.0/mlflow-artifacts/artifacts/...`), so the server must run with
//! artifact serving enabled.

use std::{fs, path::Path, time::Duration};

use reqwest::{
    blocking::{Client, RequestBuilder, Response},
    StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::{TrackingError, TrackingResult},
    tracker::TrackingBackend,
    types::{now_millis, validate_key, Metric, ModelVersion, Param, RunInfo, RunStatus},
};

/// MLflow accepts at most this many params in one `log-batch` call.
const MAX_PARAMS_PER_BATCH: usize = 100;

const ARTIFACT_SCHEME: &str = "mlflow-artifacts:/";

/// Client for an MLflow tracking server.
#[derive(Debug, Clone)]
pub struct MlflowClient {
    base_url: String,
    token: Option<String>,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ExperimentResponse {
    experiment: Experiment,
}

#[derive(Debug, Deserialize)]
struct Experiment {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

#[derive(Debug, Serialize)]
struct Tag<'a> {
    key: &'a str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateRunRequest<'a> {
    experiment_id: &'a str,
    run_name: &'a str,
    start_time: i64,
    tags: Vec<Tag<'a>>,
}

#[derive(Debug, Deserialize)]
struct CreateRunResponse {
    run: Run,
}

#[derive(Debug, Deserialize)]
struct Run {
    info: ServerRunInfo,
}

#[derive(Debug, Deserialize)]
struct ServerRunInfo {
    run_id: String,
    experiment_id: String,
    #[serde(default)]
    artifact_uri: String,
    #[serde(default)]
    start_time: Option<i64>,
}

#[derive(Debug, Serialize)]
struct LogBatchRequest<'a> {
    run_id: &'a str,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    params: &'a [Param],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    metrics: &'a [Metric],
}

#[derive(Debug, Serialize)]
struct UpdateRunRequest<'a> {
    run_id: &'a str,
    status: RunStatus,
    end_time: i64,
}

#[derive(Debug, Serialize)]
struct CreateModelVersionRequest<'a> {
    name: &'a str,
    source: &'a str,
    run_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateModelVersionResponse {
    model_version: ServerModelVersion,
}

#[derive(Debug, Deserialize)]
struct ServerModelVersion {
    name: String,
    version: String,
}

impl MlflowClient {
    /// Creates a client for the server at `base_url`, authenticating with a
    /// bearer `token` when given.
    pub fn new(base_url: &str, token: Option<String>) -> TrackingResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of a tracking API endpoint such as `runs/create`.
    pub fn api_url(&self, endpoint: &str) -> String {
        format!("{}/api/2.0/mlflow/{endpoint}", self.base_url)
    }

    /// Upload URL of one artifact file.
    pub fn artifact_url(
        &self,
        run: &RunInfo,
        artifact_path: Option<&str>,
        file_name: &str,
    ) -> String {
        let root = artifact_root(run);
        match artifact_path {
            Some(sub) => format!(
                "{}/api/2.0/mlflow-artifacts/artifacts/{root}/{sub}/{file_name}",
                self.base_url
            ),
            None => format!(
                "{}/api/2.0/mlflow-artifacts/artifacts/{root}/{file_name}",
                self.base_url
            ),
        }
    }

    /// Looks up an experiment by name, creating it when it does not exist.
    pub fn get_or_create_experiment(&self, name: &str) -> TrackingResult<String> {
        let endpoint = "experiments/get-by-name";
        let response = self
            .authorize(self.client.get(self.api_url(endpoint)))
            .query(&[("experiment_name", name)])
            .send()?;

        if response.status() != StatusCode::NOT_FOUND {
            let found: ExperimentResponse = parse(check(endpoint, response)?)?;
            return Ok(found.experiment.experiment_id);
        }

        let created: CreateExperimentResponse =
            self.post("experiments/create", &serde_json::json!({ "name": name }))?;
        info!(experiment = name, id = %created.experiment_id, "created MLflow experiment");
        Ok(created.experiment_id)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn post<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &T,
    ) -> TrackingResult<R> {
        debug!(endpoint, "MLflow request");
        let response = self
            .authorize(self.client.post(self.api_url(endpoint)))
            .json(body)
            .send()?;
        parse(check(endpoint, response)?)
    }
}

/// Artifact location of a run relative to the artifact proxy root.
fn artifact_root(run: &RunInfo) -> String {
    run.artifact_uri
        .strip_prefix(ARTIFACT_SCHEME)
        .map(|rest| rest.trim_matches('/').to_string())
        .unwrap_or_else(|| format!("{}/{}/artifacts", run.experiment_id, run.run_id))
}

fn check(endpoint: &str, response: Response) -> TrackingResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().unwrap_or_default();
    Err(api_error(endpoint, status.as_u16(), &text))
}

fn api_error(endpoint: &str, status: u16, body: &str) -> TrackingError {
    let parsed = serde_json::from_str::<ApiErrorBody>(body).unwrap_or(ApiErrorBody {
        error_code: String::new(),
        message: body.to_string(),
    });
    TrackingError::Api {
        status,
        endpoint: endpoint.to_string(),
        error_code: parsed.error_code,
        message: parsed.message,
    }
}

fn parse<R: DeserializeOwned>(response: Response) -> TrackingResult<R> {
    let text = response.text()?;
    // Some endpoints answer with an empty body.
    let text = if text.trim().is_empty() { "{}" } else { text.as_str() };
    Ok(serde_json::from_str(text)?)
}

impl TrackingBackend for MlflowClient {
    fn create_run(&self, experiment: &str, run_name: &str) -> TrackingResult<RunInfo> {
        let experiment_id = self.get_or_create_experiment(experiment)?;
        let start_time = now_millis();

        let response: CreateRunResponse = self.post(
            "runs/create",
            &CreateRunRequest {
                experiment_id: &experiment_id,
                run_name,
                start_time,
                tags: vec![Tag {
                    key: "mlflow.runName",
                    value: run_name,
                }],
            },
        )?;

        let info = response.run.info;
        Ok(RunInfo {
            run_id: info.run_id,
            experiment_id: info.experiment_id,
            run_name: run_name.to_string(),
            artifact_uri: info.artifact_uri,
            start_time: info.start_time.unwrap_or(start_time),
        })
    }

    fn log_params(&self, run: &RunInfo, params: &[Param]) -> TrackingResult<()> {
        for param in params {
            validate_key(&param.key)?;
        }
        for chunk in params.chunks(MAX_PARAMS_PER_BATCH) {
            let _: serde_json::Value = self.post(
                "runs/log-batch",
                &LogBatchRequest {
                    run_id: &run.run_id,
                    params: chunk,
                    metrics: &[],
                },
            )?;
        }
        Ok(())
    }

    fn log_metric(&self, run: &RunInfo, metric: &Metric) -> TrackingResult<()> {
        validate_key(&metric.key)?;
        let _: serde_json::Value = self.post(
            "runs/log-batch",
            &LogBatchRequest {
                run_id: &run.run_id,
                params: &[],
                metrics: std::slice::from_ref(metric),
            },
        )?;
        Ok(())
    }

    fn log_artifact(
        &self,
        run: &RunInfo,
        local_path: &Path,
        artifact_path: Option<&str>,
    ) -> TrackingResult<()> {
        if let Some(sub) = artifact_path {
            validate_key(sub)?;
        }
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TrackingError::InvalidKey {
                key: local_path.display().to_string(),
                reason: "artifact path has no UTF-8 file name".to_string(),
            })?;
        validate_key(file_name)?;

        let bytes = fs::read(local_path).map_err(|e| TrackingError::io(local_path, e))?;
        let url = self.artifact_url(run, artifact_path, file_name);
        debug!(url = %url, size = bytes.len(), "uploading artifact");

        let response = self.authorize(self.client.put(url)).body(bytes).send()?;
        check("mlflow-artifacts/artifacts", response)?;
        Ok(())
    }

    fn finish_run(&self, run: &RunInfo, status: RunStatus) -> TrackingResult<()> {
        let _: serde_json::Value = self.post(
            "runs/update",
            &UpdateRunRequest {
                run_id: &run.run_id,
                status,
                end_time: now_millis(),
            },
        )?;
        Ok(())
    }

    fn register_model(
        &self,
        name: &str,
        run: &RunInfo,
        artifact_path: &str,
    ) -> TrackingResult<ModelVersion> {
        let created: TrackingResult<serde_json::Value> =
            self.post("registered-models/create", &serde_json::json!({ "name": name }));
        match created {
            Ok(_) => info!(model = name, "created registered model"),
            Err(TrackingError::Api { ref error_code, .. })
                if error_code == "RESOURCE_ALREADY_EXISTS" => {}
            Err(e) => return Err(e),
        }

        let source = format!("{}/{artifact_path}", run.artifact_uri.trim_end_matches('/'));
        let response: CreateModelVersionResponse = self.post(
            "model-versions/create",
            &CreateModelVersionRequest {
                name,
                source: &source,
                run_id: &run.run_id,
            },
        )?;

        let version = response
            .model_version
            .version
            .parse()
            .map_err(|_| TrackingError::InvalidVersion {
                version: response.model_version.version.clone(),
            })?;

        Ok(ModelVersion {
            name: response.model_version.name,
            version,
            source,
            run_id: run.run_id.clone(),
        })
    }
}
