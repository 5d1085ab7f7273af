//! Polling loop that drives a publish job to its terminal state.
//!
//! Server-side pull downloads get no progress webhooks, so a job stuck in
//! PROCESSING_DOWNLOAD past the download ceiling is surfaced as suspected
//! timed-out instead of being polled forever.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::limiter::CredentialLimiter;
use super::state::PublishState;
use crate::classify::{classify, ErrorClass};
use crate::remote::{RemoteClient, RemoteError, StatusData};
use crate::store::{PublishJob, PublishStore, StoreError};

/// Ceiling on a PULL_FROM_URL download before it is presumed dead
pub const DOWNLOAD_CEILING: Duration = Duration::from_secs(3600);

#[derive(Debug, Error)]
pub enum TrackError {
    #[error("unknown publish id: {0}")]
    UnknownPublishId(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
}

pub type Result<T> = std::result::Result<T, TrackError>;

/// Terminal outcome of tracking one publish job
#[derive(Debug, Clone)]
pub enum TrackOutcome {
    Complete {
        post_ids: Vec<i64>,
    },
    Failed {
        /// Remote fail_reason, recorded verbatim
        fail_reason: String,
        class: ErrorClass,
    },
    /// The download path exceeded its ceiling without reaching a terminal
    /// state. The job itself is left untouched; a late webhook can still
    /// resolve it.
    DownloadTimeoutSuspected,
}

/// Status-fetch seam, so tests can script remote answers
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn probe_status(&self, publish_id: &str) -> crate::remote::Result<StatusData>;
}

#[async_trait]
impl StatusProbe for RemoteClient {
    async fn probe_status(&self, publish_id: &str) -> crate::remote::Result<StatusData> {
        self.fetch_status(publish_id).await
    }
}

/// Poll pacing. `min_interval` also feeds the per-credential limiter, which
/// is what actually enforces spacing when many jobs poll at once.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub min_interval: Duration,
    pub max_interval: Duration,
    /// Grace added on top of [`DOWNLOAD_CEILING`] before suspecting a
    /// download timeout
    pub download_timeout_margin: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(30),
            download_timeout_margin: Duration::from_secs(300),
        }
    }
}

pub struct StatusTracker<P: StatusProbe> {
    probe: Arc<P>,
    store: PublishStore,
    limiter: Arc<CredentialLimiter>,
    credential: String,
    policy: PollPolicy,
}

impl<P: StatusProbe> StatusTracker<P> {
    pub fn new(
        probe: Arc<P>,
        store: PublishStore,
        limiter: Arc<CredentialLimiter>,
        credential: String,
        policy: PollPolicy,
    ) -> Self {
        Self {
            probe,
            store,
            limiter,
            credential,
            policy,
        }
    }

    /// Poll until the job reaches a terminal state or the download ceiling
    /// passes. Completion side effects fire at most once per job, even when
    /// a webhook finalized it first.
    pub async fn track(&self, publish_id: &str) -> Result<TrackOutcome> {
        let mut interval = self.policy.min_interval;

        loop {
            let job = self
                .store
                .get_job(publish_id)?
                .ok_or_else(|| TrackError::UnknownPublishId(publish_id.to_string()))?;

            if job.state.is_terminal() {
                return Ok(self.finalize(&job)?);
            }

            if self.download_ceiling_passed(&job) {
                warn!(
                    publish_id,
                    created_at = %job.created_at,
                    "download exceeded its ceiling, suspecting timeout"
                );
                return Ok(TrackOutcome::DownloadTimeoutSuspected);
            }

            self.limiter.acquire(&self.credential).await;

            match self.probe.probe_status(publish_id).await {
                Ok(status) => {
                    self.record(publish_id, &status)?;
                    // Loop back immediately so a terminal answer short-circuits
                    // the sleep
                    if PublishState::from_remote(&status.status)
                        .is_some_and(|s| s.is_terminal())
                    {
                        continue;
                    }
                }
                Err(RemoteError::Api {
                    code,
                    message,
                    log_id,
                }) => {
                    let class = classify(&code);
                    if !class.is_retryable() {
                        return Err(RemoteError::Api {
                            code,
                            message,
                            log_id,
                        }
                        .into());
                    }
                    warn!(publish_id, code, ?class, "status fetch rejected, will retry");
                }
                Err(err @ (RemoteError::RequestFailed(_) | RemoteError::Timeout)) => {
                    warn!(publish_id, error = %err, "status fetch failed, will retry");
                }
                Err(err) => return Err(err.into()),
            }

            tokio::time::sleep(jittered(interval)).await;
            interval = (interval * 3 / 2).min(self.policy.max_interval);
        }
    }

    fn record(&self, publish_id: &str, status: &StatusData) -> Result<()> {
        if let Some(bytes) = status.bytes_progress() {
            self.store.record_progress(publish_id, bytes)?;
        }

        match PublishState::from_remote(&status.status) {
            Some(next) => {
                self.store.apply_state(
                    publish_id,
                    next,
                    status.fail_reason.as_deref(),
                    &status.publicaly_available_post_id,
                )?;
            }
            None => {
                // Unknown status values are skipped, not fatal
                debug!(publish_id, status = %status.status, "unrecognized status value");
            }
        }
        Ok(())
    }

    fn finalize(&self, job: &PublishJob) -> std::result::Result<TrackOutcome, StoreError> {
        if self.store.mark_finalized(&job.publish_id)? {
            info!(
                publish_id = %job.publish_id,
                state = %job.state,
                "publish finalized"
            );
        }

        Ok(match job.state {
            PublishState::Failed => {
                let fail_reason = job
                    .fail_reason
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string());
                let class = classify(&fail_reason);
                TrackOutcome::Failed { fail_reason, class }
            }
            _ => TrackOutcome::Complete {
                post_ids: job.post_ids.clone(),
            },
        })
    }

    fn download_ceiling_passed(&self, job: &PublishJob) -> bool {
        if job.state != PublishState::ProcessingDownload {
            return false;
        }
        let deadline = DOWNLOAD_CEILING + self.policy.download_timeout_margin;
        let age = chrono::Utc::now().signed_duration_since(job.created_at);
        age.to_std().is_ok_and(|age| age > deadline)
    }
}

fn jittered(base: Duration) -> Duration {
    let factor = rand::rng().random_range(1.0..1.25);
    base.mul_f64(factor)
}
