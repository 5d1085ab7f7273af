//! Publish session orchestration: init, chunk upload, cancel.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use super::descriptor::{CreatorInfo, MediaDescriptor, MediaSource, ValidationError};
use crate::observability::Metrics;
use crate::remote::{InitData, InitRequest, RemoteClient, RemoteError};
use crate::status::PublishState;
use crate::store::{MediaKind, PublishJob, PublishStore, SourceMode, StoreError};
use crate::transfer::{
    plan, ByteSource, ChunkTransport, PlanError, RetryPolicy, TransferError, TransferExecutor,
};

/// Init/cancel seam over the remote API, mocked in tests
#[async_trait]
pub trait PublishApi: Send + Sync {
    async fn init_video(&self, request: &InitRequest) -> crate::remote::Result<InitData>;
    async fn init_content(&self, request: &InitRequest) -> crate::remote::Result<InitData>;
    /// Returns the remote's `error.code`; "ok" means cancelled
    async fn cancel(&self, publish_id: &str) -> crate::remote::Result<String>;
}

#[async_trait]
impl PublishApi for RemoteClient {
    async fn init_video(&self, request: &InitRequest) -> crate::remote::Result<InitData> {
        RemoteClient::init_video(self, request).await
    }

    async fn init_content(&self, request: &InitRequest) -> crate::remote::Result<InitData> {
        RemoteClient::init_content(self, request).await
    }

    async fn cancel(&self, publish_id: &str) -> crate::remote::Result<String> {
        RemoteClient::cancel(self, publish_id).await
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("unknown publish id: {0}")]
    UnknownPublishId(String),

    #[error("job {0} holds no usable upload url")]
    NoUploadTicket(String),

    #[error("source is {actual} bytes but the job was initialized for {expected}")]
    SizeMismatch { expected: u64, actual: u64 },
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// The remote refused: processing already finished or failed
    NotCancellable,
}

/// Drives one publish end to end against the remote API.
///
/// Holds the API client behind an `Arc` because the same client serves both
/// the enveloped JSON endpoints and raw chunk PUTs.
pub struct PublishSession<A: PublishApi + ChunkTransport> {
    api: Arc<A>,
    store: PublishStore,
    retry: RetryPolicy,
    metrics: Arc<Metrics>,
}

impl<A: PublishApi + ChunkTransport + 'static> PublishSession<A> {
    pub fn new(
        api: Arc<A>,
        store: PublishStore,
        retry: RetryPolicy,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            api,
            store,
            retry,
            metrics,
        }
    }

    /// Validate the descriptor, initialize the publish remotely, and record
    /// the job. For upload sources the returned job carries the upload
    /// ticket; call [`upload`](Self::upload) next.
    pub async fn initiate(
        &self,
        descriptor: &MediaDescriptor,
        creator: &CreatorInfo,
    ) -> Result<PublishJob> {
        descriptor.validate(creator)?;

        let chunk_plan = match &descriptor.source {
            MediaSource::FileUpload {
                video_size,
                chunk_size,
            } => Some(plan(*video_size, *chunk_size)?),
            MediaSource::PullFromUrl { .. } => None,
        };

        let request = InitRequest {
            post_info: descriptor.post_info(),
            source_info: descriptor.source_info(chunk_plan.as_ref()),
        };

        let init = match descriptor.media_kind {
            MediaKind::Video => self.api.init_video(&request).await?,
            MediaKind::Photo => self.api.init_content(&request).await?,
        };

        let (source_mode, initial_state, bytes_total) = match &descriptor.source {
            MediaSource::FileUpload { video_size, .. } => {
                (SourceMode::FileUpload, PublishState::ProcessingUpload, *video_size)
            }
            MediaSource::PullFromUrl { .. } => {
                (SourceMode::PullFromUrl, PublishState::ProcessingDownload, 0)
            }
        };

        let now = Utc::now();
        let mut job = PublishJob::new(
            init.publish_id.clone(),
            descriptor.media_kind,
            source_mode,
            initial_state,
            bytes_total,
            now,
        );
        job.chunk_size = chunk_plan.as_ref().map(|p| p.chunk_size);
        if let Some(url) = init.upload_url {
            job.upload_url = Some(url);
            job.upload_url_issued_at = Some(now);
        }

        self.store.insert_job(&job)?;
        self.metrics.publish_started();
        info!(
            publish_id = %job.publish_id,
            state = %job.state,
            bytes_total,
            "publish initiated"
        );
        Ok(job)
    }

    /// Upload the media bytes for a previously initiated FILE_UPLOAD job.
    ///
    /// The chunk layout is recomputed from the stored size and chunk size, so
    /// a process restart resumes with the exact ranges the remote expects.
    pub async fn upload(&self, publish_id: &str, source: &dyn ByteSource) -> Result<()> {
        let job = self
            .store
            .get_job(publish_id)?
            .ok_or_else(|| SessionError::UnknownPublishId(publish_id.to_string()))?;
        let ticket = job
            .upload_ticket()
            .ok_or_else(|| SessionError::NoUploadTicket(publish_id.to_string()))?;

        if source.total_size() != job.bytes_total {
            return Err(SessionError::SizeMismatch {
                expected: job.bytes_total,
                actual: source.total_size(),
            });
        }

        let chunk_plan = plan(job.bytes_total, job.chunk_size)?;
        let executor = TransferExecutor::new(self.api.clone(), self.retry.clone());

        let store = self.store.clone();
        let metrics = self.metrics.clone();
        let id = publish_id.to_string();
        let progress = move |bytes_transferred: u64, _total: u64| {
            metrics.chunk_uploaded();
            if let Err(err) = store.record_progress(&id, bytes_transferred) {
                warn!(publish_id = %id, error = %err, "failed to record progress");
            }
        };

        executor
            .upload(publish_id, &ticket, &chunk_plan, source, &progress)
            .await?;
        Ok(())
    }

    /// Ask the remote to cancel an in-flight publish
    pub async fn cancel(&self, publish_id: &str) -> Result<CancelOutcome> {
        let code = self.api.cancel(publish_id).await?;
        match code.as_str() {
            "ok" => {
                self.store
                    .apply_state(publish_id, PublishState::Failed, Some("cancelled"), &[])?;
                self.store.mark_finalized(publish_id)?;
                info!(publish_id, "publish cancelled");
                Ok(CancelOutcome::Cancelled)
            }
            "publish_not_cancellable" => {
                info!(publish_id, "publish no longer cancellable");
                Ok(CancelOutcome::NotCancellable)
            }
            code => Err(SessionError::Remote(RemoteError::Api {
                code: code.to_string(),
                message: String::new(),
                log_id: String::new(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::descriptor::PostSettings;
    use crate::transfer::{Chunk, ChunkPutResponse, MemorySource, TransportError};
    use bytes::Bytes;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct MockApi {
        init_response: InitData,
        cancel_code: String,
        chunk_statuses: Mutex<Vec<u16>>,
        init_requests: Mutex<Vec<InitRequest>>,
    }

    impl MockApi {
        fn for_upload(chunk_statuses: Vec<u16>) -> Self {
            let mut statuses = chunk_statuses;
            statuses.reverse();
            Self {
                init_response: InitData {
                    publish_id: "v_pub_mock".to_string(),
                    upload_url: Some("https://upload.example/u".to_string()),
                },
                cancel_code: "ok".to_string(),
                chunk_statuses: Mutex::new(statuses),
                init_requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PublishApi for MockApi {
        async fn init_video(&self, request: &InitRequest) -> crate::remote::Result<InitData> {
            self.init_requests
                .lock()
                .unwrap()
                .push(InitRequest {
                    post_info: request.post_info.clone(),
                    source_info: request.source_info.clone(),
                });
            Ok(self.init_response.clone())
        }

        async fn init_content(&self, request: &InitRequest) -> crate::remote::Result<InitData> {
            self.init_video(request).await
        }

        async fn cancel(&self, _publish_id: &str) -> crate::remote::Result<String> {
            Ok(self.cancel_code.clone())
        }
    }

    #[async_trait]
    impl ChunkTransport for MockApi {
        async fn put_chunk(
            &self,
            _upload_url: &str,
            _chunk: &Chunk,
            _total_size: u64,
            _body: Bytes,
        ) -> std::result::Result<ChunkPutResponse, TransportError> {
            let status = self
                .chunk_statuses
                .lock()
                .unwrap()
                .pop()
                .expect("unexpected chunk PUT");
            Ok(ChunkPutResponse {
                status,
                received_offset: None,
            })
        }
    }

    fn creator() -> CreatorInfo {
        CreatorInfo {
            privacy_level_options: vec!["SELF_ONLY".to_string()],
            comment_disabled: false,
            duet_disabled: false,
            stitch_disabled: false,
        }
    }

    fn upload_descriptor(video_size: u64) -> MediaDescriptor {
        MediaDescriptor {
            media_kind: MediaKind::Video,
            settings: PostSettings {
                title: None,
                privacy_level: "SELF_ONLY".to_string(),
                disable_duet: false,
                disable_comment: false,
                disable_stitch: false,
                video_cover_timestamp_ms: None,
            },
            source: MediaSource::FileUpload {
                video_size,
                chunk_size: None,
            },
        }
    }

    fn session(api: MockApi, temp: &TempDir) -> PublishSession<MockApi> {
        let store = PublishStore::open(temp.path().join("store")).unwrap();
        PublishSession::new(
            Arc::new(api),
            store,
            RetryPolicy {
                max_attempts: 2,
                base_backoff: std::time::Duration::from_millis(1),
            },
            Arc::new(Metrics::new()),
        )
    }

    #[tokio::test]
    async fn test_initiate_then_upload_single_chunk() {
        let temp = TempDir::new().unwrap();
        let total = 4 * 1024 * 1024u64;
        let session = session(MockApi::for_upload(vec![201]), &temp);

        let job = session
            .initiate(&upload_descriptor(total), &creator())
            .await
            .unwrap();
        assert_eq!(job.publish_id, "v_pub_mock");
        assert_eq!(job.state, PublishState::ProcessingUpload);
        assert!(job.upload_ticket().is_some());

        let source = MemorySource::new(vec![9u8; total as usize]);
        session.upload("v_pub_mock", &source).await.unwrap();

        let job = session.store.get_job("v_pub_mock").unwrap().unwrap();
        assert_eq!(job.bytes_transferred, total);
    }

    #[tokio::test]
    async fn test_init_request_carries_chunk_layout() {
        let temp = TempDir::new().unwrap();
        let session = session(MockApi::for_upload(vec![]), &temp);

        // 50,000,123 bytes at the 10,000,000 default splits into 5 chunks
        let descriptor = MediaDescriptor {
            source: MediaSource::FileUpload {
                video_size: 50_000_123,
                chunk_size: Some(10_000_000),
            },
            ..upload_descriptor(0)
        };
        session.initiate(&descriptor, &creator()).await.unwrap();

        let requests = session.api.init_requests.lock().unwrap();
        match &requests[0].source_info {
            crate::remote::SourceInfo::FileUpload {
                video_size,
                chunk_size,
                total_chunk_count,
            } => {
                assert_eq!(*video_size, 50_000_123);
                assert_eq!(*chunk_size, 10_000_000);
                assert_eq!(*total_chunk_count, 5);
            }
            other => panic!("expected FileUpload source info, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_pull_source_starts_in_download_state() {
        let temp = TempDir::new().unwrap();
        let session = session(MockApi::for_upload(vec![]), &temp);

        let descriptor = MediaDescriptor {
            source: MediaSource::PullFromUrl {
                video_url: Some("https://cdn.example.com/v.mp4".to_string()),
                photo_images: vec![],
            },
            ..upload_descriptor(0)
        };
        let job = session.initiate(&descriptor, &creator()).await.unwrap();
        assert_eq!(job.state, PublishState::ProcessingDownload);
        assert_eq!(job.source_mode, SourceMode::PullFromUrl);
        // Not an upload job, so no usable ticket regardless of init payload
        assert!(job.upload_ticket().is_none());
    }

    #[tokio::test]
    async fn test_upload_rejects_size_mismatch() {
        let temp = TempDir::new().unwrap();
        let total = 4 * 1024 * 1024u64;
        let session = session(MockApi::for_upload(vec![201]), &temp);
        session
            .initiate(&upload_descriptor(total), &creator())
            .await
            .unwrap();

        let source = MemorySource::new(vec![0u8; 1024]);
        let err = session.upload("v_pub_mock", &source).await.unwrap_err();
        assert!(matches!(err, SessionError::SizeMismatch { .. }));
    }

    #[tokio::test]
    async fn test_cancel_applies_terminal_state() {
        let temp = TempDir::new().unwrap();
        let total = 4 * 1024 * 1024u64;
        let session = session(MockApi::for_upload(vec![]), &temp);
        session
            .initiate(&upload_descriptor(total), &creator())
            .await
            .unwrap();

        let outcome = session.cancel("v_pub_mock").await.unwrap();
        assert_eq!(outcome, CancelOutcome::Cancelled);

        let job = session.store.get_job("v_pub_mock").unwrap().unwrap();
        assert_eq!(job.state, PublishState::Failed);
        assert_eq!(job.fail_reason.as_deref(), Some("cancelled"));
        assert!(job.finalized);
    }

    #[tokio::test]
    async fn test_cancel_not_cancellable() {
        let temp = TempDir::new().unwrap();
        let mut api = MockApi::for_upload(vec![]);
        api.cancel_code = "publish_not_cancellable".to_string();
        let session = session(api, &temp);
        session
            .initiate(&upload_descriptor(4 * 1024 * 1024), &creator())
            .await
            .unwrap();

        let outcome = session.cancel("v_pub_mock").await.unwrap();
        assert_eq!(outcome, CancelOutcome::NotCancellable);

        // Job state is untouched; the poller will learn the real outcome
        let job = session.store.get_job("v_pub_mock").unwrap().unwrap();
        assert_eq!(job.state, PublishState::ProcessingUpload);
    }

    #[tokio::test]
    async fn test_initiate_rejects_invalid_descriptor_locally() {
        let temp = TempDir::new().unwrap();
        let session = session(MockApi::for_upload(vec![]), &temp);

        let mut descriptor = upload_descriptor(4 * 1024 * 1024);
        descriptor.settings.privacy_level = "PUBLIC_TO_EVERYONE".to_string();
        let err = session.initiate(&descriptor, &creator()).await.unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
        // No remote call was made
        assert!(session.api.init_requests.lock().unwrap().is_empty());
    }
}
