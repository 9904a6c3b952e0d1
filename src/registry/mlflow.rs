/// MLflow tracking server client
///
/// Speaks the MLflow REST API: experiment lookup/creation, run search by
/// status, run lifecycle updates, and artifact upload/download through the
/// mlflow-artifacts proxy. All failures surface as `RegistryUnavailable`
/// except artifact downloads, which surface as `ArtifactLoad` so the cache
/// can distinguish a missing registry from a corrupt run.
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::models::RunInfo;
use crate::registry::ModelRegistry;

#[derive(Clone)]
pub struct MlflowRegistry {
    http_client: HttpClient,
    base_url: String,
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

#[derive(Debug, Deserialize)]
struct SearchRunsResponse {
    #[serde(default)]
    runs: Vec<MlflowRun>,
}

#[derive(Debug, Deserialize)]
struct MlflowRun {
    info: MlflowRunInfo,
}

#[derive(Debug, Deserialize)]
struct MlflowRunInfo {
    run_id: String,
    #[serde(default)]
    start_time: i64,
}

#[derive(Debug, Deserialize)]
struct CreateRunResponse {
    run: MlflowRun,
}

impl MlflowRegistry {
    pub fn new(base_url: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/api/2.0/mlflow/{}", self.base_url, endpoint)
    }

    /// POSTs a JSON body and decodes the response, mapping transport and
    /// non-2xx failures to `RegistryUnavailable`
    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> AppResult<T> {
        let response = self
            .http_client
            .post(self.api_url(endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::RegistryUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::RegistryUnavailable(format!(
                "{} returned {}: {}",
                endpoint, status, text
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AppError::RegistryUnavailable(e.to_string()))
    }

    /// Same as `post_json` but discards the response body
    async fn post_unit(&self, endpoint: &str, body: serde_json::Value) -> AppResult<()> {
        let response = self
            .http_client
            .post(self.api_url(endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::RegistryUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::RegistryUnavailable(format!(
                "{} returned {}: {}",
                endpoint, status, text
            )));
        }

        Ok(())
    }

    async fn set_run_status(&self, run_id: &str, status: &str) -> AppResult<()> {
        self.post_unit(
            "runs/update",
            json!({
                "run_id": run_id,
                "status": status,
                "end_time": Utc::now().timestamp_millis(),
            }),
        )
        .await
    }
}

#[async_trait]
impl ModelRegistry for MlflowRegistry {
    async fn ensure_experiment(&self, name: &str) -> AppResult<String> {
        let response = self
            .http_client
            .get(self.api_url("experiments/get-by-name"))
            .query(&[("experiment_name", name)])
            .send()
            .await
            .map_err(|e| AppError::RegistryUnavailable(e.to_string()))?;

        if response.status().is_success() {
            let found: ExperimentResponse = response
                .json()
                .await
                .map_err(|e| AppError::RegistryUnavailable(e.to_string()))?;
            return Ok(found.experiment.experiment_id);
        }

        tracing::info!(experiment = %name, "Experiment not found, creating");

        let created: CreateExperimentResponse = self
            .post_json("experiments/create", json!({ "name": name }))
            .await?;

        Ok(created.experiment_id)
    }

    async fn latest_finished_run(&self, experiment: &str) -> AppResult<Option<RunInfo>> {
        let experiment_id = self.ensure_experiment(experiment).await?;

        let found: SearchRunsResponse = self
            .post_json(
                "runs/search",
                json!({
                    "experiment_ids": [experiment_id],
                    "filter": "attributes.status = 'FINISHED'",
                    "order_by": ["attributes.start_time DESC"],
                    "max_results": 1,
                }),
            )
            .await?;

        Ok(found.runs.into_iter().next().map(|run| RunInfo {
            run_id: run.info.run_id,
            created_at: Utc
                .timestamp_millis_opt(run.info.start_time)
                .single()
                .unwrap_or_else(Utc::now),
        }))
    }

    async fn download_artifact(&self, run_id: &str, path: &str) -> AppResult<Vec<u8>> {
        let response = self
            .http_client
            .get(format!("{}/get-artifact", self.base_url))
            .query(&[("run_uuid", run_id), ("path", path)])
            .send()
            .await
            .map_err(|e| AppError::RegistryUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::ArtifactLoad(format!(
                "artifact {} of run {} returned {}",
                path,
                run_id,
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::ArtifactLoad(e.to_string()))?;

        Ok(bytes.to_vec())
    }

    async fn create_run(&self, experiment_id: &str, run_name: &str) -> AppResult<String> {
        let created: CreateRunResponse = self
            .post_json(
                "runs/create",
                json!({
                    "experiment_id": experiment_id,
                    "run_name": run_name,
                    "start_time": Utc::now().timestamp_millis(),
                }),
            )
            .await?;

        Ok(created.run.info.run_id)
    }

    async fn log_param(&self, run_id: &str, key: &str, value: &str) -> AppResult<()> {
        self.post_unit(
            "runs/log-parameter",
            json!({ "run_id": run_id, "key": key, "value": value }),
        )
        .await
    }

    async fn log_metric(&self, run_id: &str, key: &str, value: f64) -> AppResult<()> {
        self.post_unit(
            "runs/log-metric",
            json!({
                "run_id": run_id,
                "key": key,
                "value": value,
                "timestamp": Utc::now().timestamp_millis(),
                "step": 0,
            }),
        )
        .await
    }

    async fn log_artifact(&self, run_id: &str, path: &str, bytes: Vec<u8>) -> AppResult<()> {
        let url = format!(
            "{}/api/2.0/mlflow-artifacts/artifacts/{}/{}",
            self.base_url, run_id, path
        );

        let response = self
            .http_client
            .put(url)
            .body(bytes)
            .send()
            .await
            .map_err(|e| AppError::RegistryUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::RegistryUnavailable(format!(
                "artifact upload {} returned {}",
                path,
                response.status()
            )));
        }

        Ok(())
    }

    async fn finish_run(&self, run_id: &str) -> AppResult<()> {
        self.set_run_status(run_id, "FINISHED").await
    }

    async fn fail_run(&self, run_id: &str) -> AppResult<()> {
        self.set_run_status(run_id, "FAILED").await
    }
}
