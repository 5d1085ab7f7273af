//! Wire models for the remote publish API.
//!
//! Every endpoint wraps its payload in a `{data, error}` envelope where
//! `error.code == "ok"` signals success. Field names (including the
//! documented `publicaly_available_post_id` spelling) follow the remote
//! contract verbatim.

use serde::{Deserialize, Serialize};

/// Response envelope shared by all publish endpoints
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub data: Option<T>,
    pub error: ApiStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiStatus {
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub log_id: String,
}

impl ApiStatus {
    pub fn is_ok(&self) -> bool {
        self.code == "ok"
    }
}

/// Post metadata sent with both init endpoints
#[derive(Debug, Clone, Serialize)]
pub struct PostInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub privacy_level: String,
    pub disable_duet: bool,
    pub disable_comment: bool,
    pub disable_stitch: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_cover_timestamp_ms: Option<u64>,
}

/// Source descriptor: either chunked client upload or server-side pull
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "source")]
pub enum SourceInfo {
    #[serde(rename = "FILE_UPLOAD")]
    FileUpload {
        video_size: u64,
        chunk_size: u64,
        total_chunk_count: u64,
    },
    #[serde(rename = "PULL_FROM_URL")]
    PullFromUrl {
        #[serde(skip_serializing_if = "Option::is_none")]
        video_url: Option<String>,
        #[serde(skip_serializing_if = "Vec::is_empty", default)]
        photo_images: Vec<String>,
    },
}

#[derive(Debug, Serialize)]
pub struct InitRequest {
    pub post_info: PostInfo,
    pub source_info: SourceInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitData {
    pub publish_id: String,
    #[serde(default)]
    pub upload_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PublishIdRequest {
    pub publish_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    pub status: String,
    #[serde(default)]
    pub fail_reason: Option<String>,
    #[serde(default)]
    pub publicaly_available_post_id: Vec<i64>,
    #[serde(default)]
    pub uploaded_bytes: Option<u64>,
    #[serde(default)]
    pub downloaded_bytes: Option<u64>,
}

impl StatusData {
    pub fn bytes_progress(&self) -> Option<u64> {
        self.uploaded_bytes.or(self.downloaded_bytes)
    }
}
