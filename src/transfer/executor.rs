//! Sequential chunk upload execution.
//!
//! The remote protocol does not allow parallel or out-of-order chunk
//! delivery within one publish job, so the executor walks the plan in
//! ascending index order. Each chunk PUT carries an exact byte range; the
//! remote answers 206 while it expects more chunks and 201 once the final
//! chunk lands and async processing begins.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::plan::{Chunk, ChunkPlan};
use super::source::{ByteSource, SourceError};
use crate::classify::classify_http;

/// Upload URLs issued by the remote stay valid for one hour
pub const UPLOAD_URL_TTL_SECS: i64 = 3600;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request timed out")]
    Timeout,
}

/// Outcome of one chunk PUT at the wire level
#[derive(Debug, Clone)]
pub struct ChunkPutResponse {
    pub status: u16,
    /// Byte offset the remote reports having received, from its 416 response
    pub received_offset: Option<u64>,
}

/// Wire seam for chunk delivery. The production implementation lives on the
/// remote API client; tests script responses instead.
#[async_trait]
pub trait ChunkTransport: Send + Sync {
    async fn put_chunk(
        &self,
        upload_url: &str,
        chunk: &Chunk,
        total_size: u64,
        body: Bytes,
    ) -> std::result::Result<ChunkPutResponse, TransportError>;
}

#[async_trait]
impl<T: ChunkTransport + ?Sized> ChunkTransport for std::sync::Arc<T> {
    async fn put_chunk(
        &self,
        upload_url: &str,
        chunk: &Chunk,
        total_size: u64,
        body: Bytes,
    ) -> std::result::Result<ChunkPutResponse, TransportError> {
        (**self).put_chunk(upload_url, chunk, total_size, body).await
    }
}

/// Progress observer invoked after every accepted chunk
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, bytes_transferred: u64, bytes_total: u64);
}

impl<F> ProgressSink for F
where
    F: Fn(u64, u64) + Send + Sync,
{
    fn on_progress(&self, bytes_transferred: u64, bytes_total: u64) {
        self(bytes_transferred, bytes_total)
    }
}

/// Retry discipline for transient chunk failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Upload reference returned by job initialization, with its issue time so
/// the one-hour validity window can be enforced locally.
#[derive(Debug, Clone)]
pub struct UploadTicket {
    pub upload_url: String,
    pub issued_at: DateTime<Utc>,
}

impl UploadTicket {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.issued_at >= ChronoDuration::seconds(UPLOAD_URL_TTL_SECS)
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("chunk {chunk_index} rejected as malformed (400)")]
    MalformedChunk { chunk_index: u64 },

    #[error("upload url expired; session must be re-initialized")]
    UploadUrlExpired,

    #[error("remote lost the upload task (404)")]
    UploadTaskNotFound,

    #[error("range desync: expected offset {expected}, remote reports {remote:?}")]
    RangeDesync { expected: u64, remote: Option<u64> },

    #[error("chunk {chunk_index} failed after {attempts} attempts: {last_error}")]
    ExhaustedRetries {
        chunk_index: u64,
        attempts: u32,
        last_error: String,
    },

    #[error("unexpected status {status} for chunk {chunk_index}")]
    UnexpectedStatus { chunk_index: u64, status: u16 },

    #[error(transparent)]
    Source(#[from] SourceError),
}

pub type Result<T> = std::result::Result<T, TransferError>;

/// Drives a [`ChunkPlan`] through a [`ChunkTransport`] one chunk at a time
pub struct TransferExecutor<T: ChunkTransport> {
    transport: T,
    policy: RetryPolicy,
}

impl<T: ChunkTransport> TransferExecutor<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Upload every chunk of `plan` in order.
    ///
    /// On a 416 the cursor resynchronizes to the remote-reported offset once;
    /// a second disagreement aborts as [`TransferError::RangeDesync`].
    pub async fn upload(
        &self,
        publish_id: &str,
        ticket: &UploadTicket,
        plan: &ChunkPlan,
        source: &dyn ByteSource,
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        let total_chunks = plan.chunks.len();
        let mut index = 0usize;
        let mut resynced = false;

        while index < total_chunks {
            if ticket.is_expired(Utc::now()) {
                warn!(publish_id, chunk_index = index, "upload url expired mid-transfer");
                return Err(TransferError::UploadUrlExpired);
            }

            let chunk = &plan.chunks[index];
            let is_last = index == total_chunks - 1;
            let body = source.read_range(chunk.first_byte, chunk.last_byte).await?;

            let response = self.send_with_retry(publish_id, ticket, chunk, plan, body).await?;

            match response.status {
                206 if !is_last => {
                    debug!(
                        publish_id,
                        chunk_index = chunk.index,
                        bytes = chunk.size,
                        "chunk accepted, more expected"
                    );
                    progress.on_progress(chunk.last_byte + 1, plan.total_size);
                    index += 1;
                    resynced = false;
                }
                201 if is_last => {
                    info!(publish_id, chunks = total_chunks, "final chunk accepted, processing started");
                    progress.on_progress(plan.total_size, plan.total_size);
                    index += 1;
                    resynced = false;
                }
                400 => {
                    return Err(TransferError::MalformedChunk {
                        chunk_index: chunk.index,
                    });
                }
                403 => return Err(TransferError::UploadUrlExpired),
                404 => return Err(TransferError::UploadTaskNotFound),
                416 => {
                    let remote = response.received_offset;
                    match remote.and_then(|offset| plan.chunk_at_offset(offset)) {
                        Some(resume_index) if !resynced => {
                            warn!(
                                publish_id,
                                chunk_index = chunk.index,
                                resume_index,
                                remote_offset = remote,
                                "range mismatch, resyncing cursor to remote offset"
                            );
                            index = resume_index;
                            resynced = true;
                        }
                        _ => {
                            return Err(TransferError::RangeDesync {
                                expected: chunk.first_byte,
                                remote,
                            });
                        }
                    }
                }
                status => {
                    return Err(TransferError::UnexpectedStatus {
                        chunk_index: chunk.index,
                        status,
                    });
                }
            }
        }

        Ok(())
    }

    /// Send one chunk, retrying statuses that [`classify_http`] marks
    /// retryable (5xx, 429) and connection-level failures with exponential
    /// backoff. Everything else returns immediately for the caller to
    /// interpret.
    async fn send_with_retry(
        &self,
        publish_id: &str,
        ticket: &UploadTicket,
        chunk: &Chunk,
        plan: &ChunkPlan,
        body: Bytes,
    ) -> Result<ChunkPutResponse> {
        let mut attempt = 0u32;
        let mut last_error = String::new();

        loop {
            attempt += 1;

            match self
                .transport
                .put_chunk(&ticket.upload_url, chunk, plan.total_size, body.clone())
                .await
            {
                Ok(response) if classify_http(response.status).is_retryable() => {
                    last_error = format!("HTTP {}", response.status);
                }
                Ok(response) => return Ok(response),
                Err(err) => {
                    last_error = err.to_string();
                }
            }

            if attempt >= self.policy.max_attempts {
                warn!(
                    publish_id,
                    chunk_index = chunk.index,
                    attempt,
                    error = %last_error,
                    "chunk upload exhausted retries"
                );
                return Err(TransferError::ExhaustedRetries {
                    chunk_index: chunk.index,
                    attempts: attempt,
                    last_error,
                });
            }

            let backoff = self.policy.backoff(attempt);
            debug!(
                publish_id,
                chunk_index = chunk.index,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %last_error,
                "transient chunk failure, retrying"
            );
            tokio::time::sleep(backoff).await;
        }
    }
}
