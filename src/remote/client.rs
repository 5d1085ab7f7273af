//! HTTP client for the remote publish API

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::models::{ApiEnvelope, InitData, InitRequest, PublishIdRequest, StatusData};
use crate::transfer::{Chunk, ChunkPutResponse, ChunkTransport, TransportError};

pub const VIDEO_INIT_PATH: &str = "/v2/post/publish/video/init/";
pub const CONTENT_INIT_PATH: &str = "/v2/post/publish/content/init/";
pub const STATUS_FETCH_PATH: &str = "/v2/post/publish/status/fetch/";
pub const CANCEL_PATH: &str = "/v2/post/publish/cancel/";

/// Header carrying the remote's received-byte offset on a 416 response
pub const RECEIVED_OFFSET_HEADER: &str = "Upload-Offset";

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("connection timeout")]
    Timeout,

    #[error("remote rejected request: {code} ({message}) [log_id={log_id}]")]
    Api {
        code: String,
        message: String,
        log_id: String,
    },

    #[error("malformed response: {0}")]
    InvalidResponse(String),
}

pub type Result<T> = std::result::Result<T, RemoteError>;

/// Remote client configuration
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://open.tiktokapis.com".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Authenticated client for init/status/cancel calls and chunk PUTs
pub struct RemoteClient {
    client: Client,
    config: RemoteConfig,
    access_token: String,
}

impl RemoteClient {
    pub fn new(config: RemoteConfig, access_token: String) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RemoteError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            config,
            access_token,
        })
    }

    /// Initiate a video publish; returns `publish_id` and, for FILE_UPLOAD
    /// sources, a one-hour `upload_url`.
    pub async fn init_video(&self, request: &InitRequest) -> Result<InitData> {
        self.post_enveloped(VIDEO_INIT_PATH, request).await
    }

    /// Initiate a photo/content publish
    pub async fn init_content(&self, request: &InitRequest) -> Result<InitData> {
        self.post_enveloped(CONTENT_INIT_PATH, request).await
    }

    pub async fn fetch_status(&self, publish_id: &str) -> Result<StatusData> {
        let request = PublishIdRequest {
            publish_id: publish_id.to_string(),
        };
        self.post_enveloped(STATUS_FETCH_PATH, &request).await
    }

    /// Request cancellation. Returns the remote's error code so the caller
    /// can distinguish success from `publish_not_cancellable`.
    pub async fn cancel(&self, publish_id: &str) -> Result<String> {
        let request = PublishIdRequest {
            publish_id: publish_id.to_string(),
        };

        let response = self
            .client
            .post(format!("{}{}", self.config.base_url, CANCEL_PATH))
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let envelope: ApiEnvelope<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;

        Ok(envelope.error.code)
    }

    async fn post_enveloped<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}{}", self.config.base_url, path);
        debug!(url, "remote api call");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;

        if !envelope.error.is_ok() {
            warn!(
                code = %envelope.error.code,
                log_id = %envelope.error.log_id,
                "remote api returned error"
            );
            return Err(RemoteError::Api {
                code: envelope.error.code,
                message: envelope.error.message,
                log_id: envelope.error.log_id,
            });
        }

        envelope
            .data
            .ok_or_else(|| RemoteError::InvalidResponse("ok response without data".to_string()))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::RequestFailed(err.to_string())
    }
}

#[async_trait]
impl ChunkTransport for RemoteClient {
    async fn put_chunk(
        &self,
        upload_url: &str,
        chunk: &Chunk,
        total_size: u64,
        body: Bytes,
    ) -> std::result::Result<ChunkPutResponse, TransportError> {
        let response = self
            .client
            .put(upload_url)
            .header(reqwest::header::CONTENT_TYPE, "video/mp4")
            .header(reqwest::header::CONTENT_LENGTH, chunk.size)
            .header(
                reqwest::header::CONTENT_RANGE,
                chunk.content_range(total_size),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Connection(e.to_string())
                }
            })?;

        let received_offset = response
            .headers()
            .get(RECEIVED_OFFSET_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        Ok(ChunkPutResponse {
            status: response.status().as_u16(),
            received_offset,
        })
    }
}
