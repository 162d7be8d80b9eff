//! Queue service client
//!
//! Pulls pending jobs and reports their outcome. The queue service is the sole
//! owner of job state and retry policy; this client never retries.

use async_trait::async_trait;
use enrich_common::config::QueueConfig;
use enrich_common::Job;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

/// Queue client errors
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Queue API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    /// A job was handed over but its envelope is unusable; it still needs an ack
    #[error("Malformed job {job_id}: {reason}")]
    Malformed { job_id: i64, reason: String },
}

/// Queue service operations used by the engine
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Pull one job of the given kinds; `Ok(None)` when nothing is pending
    async fn pull(&self, job_kinds: &[String], instances: &[String])
        -> Result<Option<Job>, QueueError>;

    async fn acknowledge_success(&self, job_id: i64, log: Option<&str>) -> Result<(), QueueError>;

    async fn acknowledge_failure(
        &self,
        job_id: i64,
        error_log: &str,
        log: Option<&str>,
    ) -> Result<(), QueueError>;
}

/// HTTP/JSON queue client
pub struct HttpQueueClient {
    http_client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpQueueClient {
    pub fn new(config: &QueueConfig, timeout: Duration) -> Result<Self, QueueError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| QueueError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/jobs/{}", self.base_url, path)
    }

    async fn put_ack(&self, job_id: i64, outcome: &str, body: Value) -> Result<(), QueueError> {
        let url = self.url(&format!("{}/{}", job_id, outcome));
        let response = self
            .http_client
            .put(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| QueueError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let error_text = response.text().await.unwrap_or_default();
            return Err(QueueError::Api(status.as_u16(), error_text));
        }

        tracing::debug!(job_id, outcome, status = status.as_u16(), "Acknowledgement accepted");
        Ok(())
    }
}

/// Interpret a pull response body. Empty bodies and `{}` mean "no job".
///
/// A body that carries an integer `id` but does not otherwise decode as a job
/// is [`QueueError::Malformed`]: the queue has handed that job to this worker.
pub fn parse_pull_body(status: StatusCode, body: &str) -> Result<Option<Job>, QueueError> {
    if status == StatusCode::CREATED || body.trim().is_empty() {
        return Ok(None);
    }

    let value: Value =
        serde_json::from_str(body).map_err(|e| QueueError::Parse(e.to_string()))?;
    match &value {
        Value::Null => Ok(None),
        Value::Object(map) if map.is_empty() => Ok(None),
        _ => {
            let job_id = value.get("id").and_then(Value::as_i64);
            serde_json::from_value(value).map(Some).map_err(|e| match job_id {
                Some(job_id) => QueueError::Malformed {
                    job_id,
                    reason: format!("job envelope could not be decoded: {}", e),
                },
                None => QueueError::Parse(e.to_string()),
            })
        }
    }
}

#[async_trait]
impl QueueClient for HttpQueueClient {
    async fn pull(
        &self,
        job_kinds: &[String],
        instances: &[String],
    ) -> Result<Option<Job>, QueueError> {
        let response = self
            .http_client
            .post(self.url("pull"))
            .bearer_auth(&self.token)
            .json(&json!({ "job_types": job_kinds, "instances": instances }))
            .send()
            .await
            .map_err(|e| QueueError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let error_text = response.text().await.unwrap_or_default();
            return Err(QueueError::Api(status.as_u16(), error_text));
        }

        let body = response
            .text()
            .await
            .map_err(|e| QueueError::Network(e.to_string()))?;
        parse_pull_body(status, &body)
    }

    async fn acknowledge_success(&self, job_id: i64, log: Option<&str>) -> Result<(), QueueError> {
        self.put_ack(job_id, "done", json!({ "log": log })).await
    }

    async fn acknowledge_failure(
        &self,
        job_id: i64,
        error_log: &str,
        log: Option<&str>,
    ) -> Result<(), QueueError> {
        self.put_ack(job_id, "failed", json!({ "error_log": error_log, "log": log }))
            .await
    }
}
