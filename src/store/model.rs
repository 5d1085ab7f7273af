//! Persistent publish job snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::PublishState;
use crate::transfer::UploadTicket;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaKind {
    Video,
    Photo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceMode {
    FileUpload,
    PullFromUrl,
}

/// One publish attempt as tracked locally.
///
/// Mutated by three producers with disjoint concerns: the transfer executor
/// (progress), and the poller/webhook dispatcher (state, fail_reason,
/// post_ids) through the store's guarded transition path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishJob {
    pub publish_id: String,
    pub media_kind: MediaKind,
    pub source_mode: SourceMode,
    pub state: PublishState,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub updated_at: DateTime<Utc>,
    pub upload_url: Option<String>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub upload_url_issued_at: Option<DateTime<Utc>>,
    /// Requested chunk size, kept so the plan is reproducible after restart
    pub chunk_size: Option<u64>,
    pub bytes_transferred: u64,
    pub bytes_total: u64,
    /// Empty until public availability is confirmed
    pub post_ids: Vec<i64>,
    pub publicly_available: bool,
    /// Present only when the job terminally failed
    pub fail_reason: Option<String>,
    /// Completion side effects already fired for this job
    pub finalized: bool,
}

impl PublishJob {
    pub fn new(
        publish_id: String,
        media_kind: MediaKind,
        source_mode: SourceMode,
        initial_state: PublishState,
        bytes_total: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            publish_id,
            media_kind,
            source_mode,
            state: initial_state,
            created_at: now,
            updated_at: now,
            upload_url: None,
            upload_url_issued_at: None,
            chunk_size: None,
            bytes_transferred: 0,
            bytes_total,
            post_ids: Vec::new(),
            publicly_available: false,
            fail_reason: None,
            finalized: false,
        }
    }

    /// Upload ticket, available only while the job still holds a usable
    /// upload reference.
    pub fn upload_ticket(&self) -> Option<UploadTicket> {
        if self.state != PublishState::ProcessingUpload {
            return None;
        }
        match (&self.upload_url, self.upload_url_issued_at) {
            (Some(url), Some(issued_at)) => Some(UploadTicket {
                upload_url: url.clone(),
                issued_at,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_ticket_only_while_processing_upload() {
        let now = Utc::now();
        let mut job = PublishJob::new(
            "v_pub_1".to_string(),
            MediaKind::Video,
            SourceMode::FileUpload,
            PublishState::ProcessingUpload,
            100,
            now,
        );
        job.upload_url = Some("https://upload.example/u".to_string());
        job.upload_url_issued_at = Some(now);

        assert!(job.upload_ticket().is_some());

        job.state = PublishState::PublishComplete;
        assert!(job.upload_ticket().is_none());
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let job = PublishJob::new(
            "v_pub_2".to_string(),
            MediaKind::Photo,
            SourceMode::PullFromUrl,
            PublishState::ProcessingDownload,
            0,
            Utc::now(),
        );
        let json = serde_json::to_string(&job).unwrap();
        let back: PublishJob = serde_json::from_str(&json).unwrap();
        assert_eq!(back.publish_id, "v_pub_2");
        assert_eq!(back.state, PublishState::ProcessingDownload);
        assert!(!back.finalized);
    }
}
