//! Job engine
//!
//! Drives the pull → dispatch → execute → acknowledge cycle until cancelled.
//! Jobs are processed one at a time; every job that is pulled is acknowledged
//! exactly once, whatever the handler does. That includes a job whose envelope
//! cannot be decoded, as long as the queue told us its id.
//!
//! ```text
//! Idle → Pulling ─┬─ no job / pull error → BackoffSleep → Idle
//!                 └─ job → Dispatching → Executing → Acknowledging → Idle
//! ```
//!
//! Cancellation is checked only at the top of the loop, so an in-flight job
//! always finishes (and is acknowledged) before [`JobEngine::run`] returns.

use crate::error::EnrichmentError;
use crate::handlers::HandlerRegistry;
use crate::services::{QueueClient, QueueError};
use chrono::{SecondsFormat, Utc};
use enrich_common::config::{EngineConfig, QueueConfig};
use enrich_common::Job;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Engine settings derived from configuration
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Sleep after an empty or failed pull
    pub backoff: Duration,
    /// Kinds requested from the queue
    pub job_kinds: Vec<String>,
    /// Instances accepted; empty means any
    pub instances: Vec<String>,
}

impl EngineSettings {
    /// Build settings; kinds default to every registered handler
    pub fn from_config(engine: &EngineConfig, queue: &QueueConfig, handlers: &HandlerRegistry) -> Self {
        Self {
            backoff: Duration::from_secs(engine.backoff_seconds),
            job_kinds: queue.job_kinds.clone().unwrap_or_else(|| handlers.kinds()),
            instances: queue.instances.clone(),
        }
    }
}

/// Lifetime counters, readable while the engine runs
#[derive(Debug, Default)]
pub struct EngineStats {
    pub pulls: AtomicU64,
    pub empty_pulls: AtomicU64,
    pub pull_errors: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub ack_errors: AtomicU64,
    pub backoffs: AtomicU64,
}

impl EngineStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Outcome of one executed job, before acknowledgement
enum Outcome {
    Success { log: String },
    Failure { error_log: String, log: String },
}

pub struct JobEngine {
    queue: Arc<dyn QueueClient>,
    handlers: HandlerRegistry,
    settings: EngineSettings,
    stats: Arc<EngineStats>,
}

impl JobEngine {
    pub fn new(queue: Arc<dyn QueueClient>, handlers: HandlerRegistry, settings: EngineSettings) -> Self {
        Self {
            queue,
            handlers,
            settings,
            stats: Arc::new(EngineStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<EngineStats> {
        self.stats.clone()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run cycles until the token is cancelled.
    ///
    /// The backoff sleep is not interrupted by cancellation; the token is seen
    /// on the next loop check.
    pub async fn run(&self, cancel_token: CancellationToken) {
        tracing::info!(
            kinds = ?self.settings.job_kinds,
            instances = ?self.settings.instances,
            backoff_s = self.settings.backoff.as_secs(),
            "Job engine started"
        );

        while !cancel_token.is_cancelled() {
            if !self.run_cycle().await {
                EngineStats::bump(&self.stats.backoffs);
                tokio::time::sleep(self.settings.backoff).await;
            }
        }

        tracing::info!(
            succeeded = EngineStats::get(&self.stats.succeeded),
            failed = EngineStats::get(&self.stats.failed),
            "Job engine stopped"
        );
    }

    /// Pull and process at most one job.
    ///
    /// Returns `false` when nothing was processed (pull failed or queue empty)
    /// or when the acknowledgement could not be delivered; the caller backs off.
    pub async fn run_cycle(&self) -> bool {
        EngineStats::bump(&self.stats.pulls);
        let job = match self
            .queue
            .pull(&self.settings.job_kinds, &self.settings.instances)
            .await
        {
            Ok(Some(job)) => job,
            Ok(None) => {
                EngineStats::bump(&self.stats.empty_pulls);
                tracing::debug!("No job available");
                return false;
            }
            Err(QueueError::Malformed { job_id, reason }) => {
                let span = tracing::info_span!("job", id = job_id);
                return async {
                    tracing::warn!(error = %reason, "Pulled job is malformed");
                    let log = format!(
                        "{} rejected job {}",
                        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                        job_id
                    );
                    self.acknowledge(job_id, Outcome::Failure { error_log: reason, log })
                        .await
                }
                .instrument(span)
                .await;
            }
            Err(e) => {
                EngineStats::bump(&self.stats.pull_errors);
                tracing::warn!(error = %e, "Job pull failed");
                return false;
            }
        };

        let span = tracing::info_span!("job", id = job.id, kind = %job.kind, instance = %job.instance);
        async {
            let outcome = self.execute(&job).await;
            self.acknowledge(job.id, outcome).await
        }
        .instrument(span)
        .await
    }

    /// Dispatch the job to its handler. Never fails: every error becomes a
    /// failure outcome.
    async fn execute(&self, job: &Job) -> Outcome {
        let started_at = Utc::now();
        let started = Instant::now();
        let mut log = format!(
            "{} started {} job {}\n",
            started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            job.kind,
            job.id
        );

        let result = match self.handlers.get(&job.kind) {
            None => Err(EnrichmentError::UnsupportedJobKind(job.kind.clone())),
            Some(handler) => match job.decode_parameters() {
                Ok(parameters) => handler.execute(&parameters).await,
                Err(e) => Err(EnrichmentError::from(e)),
            },
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let finished_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        match result {
            Ok(message) => {
                if let Some(message) = message {
                    log.push_str(&message);
                    log.push('\n');
                }
                log.push_str(&format!("{} finished in {} ms", finished_at, elapsed_ms));
                tracing::info!(elapsed_ms, "Job completed");
                Outcome::Success { log }
            }
            Err(e) => {
                let error_log = e.to_string();
                log.push_str(&format!("{} failed after {} ms", finished_at, elapsed_ms));
                tracing::warn!(elapsed_ms, error = %error_log, "Job failed");
                Outcome::Failure { error_log, log }
            }
        }
    }

    /// Send the single acknowledgement for a pulled job
    async fn acknowledge(&self, job_id: i64, outcome: Outcome) -> bool {
        let (succeeded, result) = match &outcome {
            Outcome::Success { log } => (
                true,
                self.queue.acknowledge_success(job_id, Some(log)).await,
            ),
            Outcome::Failure { error_log, log } => (
                false,
                self.queue
                    .acknowledge_failure(job_id, error_log, Some(log))
                    .await,
            ),
        };

        match result {
            Ok(()) => {
                if succeeded {
                    EngineStats::bump(&self.stats.succeeded);
                } else {
                    EngineStats::bump(&self.stats.failed);
                }
                true
            }
            Err(e) => {
                // Not retried; the queue service owns redelivery
                EngineStats::bump(&self.stats.ack_errors);
                tracing::error!(error = %e, succeeded, "Job acknowledgement failed");
                false
            }
        }
    }
}
