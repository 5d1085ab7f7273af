//! Publish request description and pre-flight validation.
//!
//! Everything checked here fails locally, before any remote call spends
//! quota. The privacy check matters most: the remote rejects a privacy level
//! the creator has not enabled only after init, burning a publish slot.

use serde::Deserialize;
use thiserror::Error;

use crate::remote::{PostInfo, SourceInfo};
use crate::store::MediaKind;
use crate::transfer::ChunkPlan;

/// Creator capabilities as reported by the remote's creator-info endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct CreatorInfo {
    pub privacy_level_options: Vec<String>,
    #[serde(default)]
    pub comment_disabled: bool,
    #[serde(default)]
    pub duet_disabled: bool,
    #[serde(default)]
    pub stitch_disabled: bool,
}

/// Post metadata chosen by the caller
#[derive(Debug, Clone, Deserialize)]
pub struct PostSettings {
    #[serde(default)]
    pub title: Option<String>,
    pub privacy_level: String,
    #[serde(default)]
    pub disable_duet: bool,
    #[serde(default)]
    pub disable_comment: bool,
    #[serde(default)]
    pub disable_stitch: bool,
    #[serde(default)]
    pub video_cover_timestamp_ms: Option<u64>,
}

/// Where the media bytes come from
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaSource {
    /// Chunked upload from the client; the byte count must be exact
    FileUpload {
        video_size: u64,
        #[serde(default)]
        chunk_size: Option<u64>,
    },
    /// Server-side pull from a URL the caller controls
    PullFromUrl {
        #[serde(default)]
        video_url: Option<String>,
        #[serde(default)]
        photo_images: Vec<String>,
    },
}

/// A complete publish request, validated before init
#[derive(Debug, Clone, Deserialize)]
pub struct MediaDescriptor {
    pub media_kind: MediaKind,
    pub settings: PostSettings,
    pub source: MediaSource,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("privacy level {requested:?} is not enabled for this creator")]
    PrivacyLevelMismatch { requested: String },

    #[error("pull source needs a video url or photo images")]
    EmptyPullSource,

    #[error("photo posts are published by url pull, not chunked upload")]
    PhotoUploadUnsupported,

    #[error("video pull source cannot carry photo images")]
    PhotosOnVideoSource,

    #[error("video cover timestamp only applies to video posts")]
    CoverTimestampOnPhoto,
}

impl MediaDescriptor {
    /// Check the descriptor against the creator's capabilities
    pub fn validate(&self, creator: &CreatorInfo) -> Result<(), ValidationError> {
        if !creator
            .privacy_level_options
            .iter()
            .any(|level| level == &self.settings.privacy_level)
        {
            return Err(ValidationError::PrivacyLevelMismatch {
                requested: self.settings.privacy_level.clone(),
            });
        }

        match (&self.media_kind, &self.source) {
            (MediaKind::Photo, MediaSource::FileUpload { .. }) => {
                return Err(ValidationError::PhotoUploadUnsupported);
            }
            (
                MediaKind::Video,
                MediaSource::PullFromUrl {
                    video_url,
                    photo_images,
                },
            ) => {
                if !photo_images.is_empty() {
                    return Err(ValidationError::PhotosOnVideoSource);
                }
                if video_url.is_none() {
                    return Err(ValidationError::EmptyPullSource);
                }
            }
            (
                MediaKind::Photo,
                MediaSource::PullFromUrl {
                    video_url: _,
                    photo_images,
                },
            ) => {
                if photo_images.is_empty() {
                    return Err(ValidationError::EmptyPullSource);
                }
                if self.settings.video_cover_timestamp_ms.is_some() {
                    return Err(ValidationError::CoverTimestampOnPhoto);
                }
            }
            (MediaKind::Video, MediaSource::FileUpload { .. }) => {}
        }

        Ok(())
    }

    pub fn post_info(&self) -> PostInfo {
        PostInfo {
            title: self.settings.title.clone(),
            privacy_level: self.settings.privacy_level.clone(),
            disable_duet: self.settings.disable_duet,
            disable_comment: self.settings.disable_comment,
            disable_stitch: self.settings.disable_stitch,
            video_cover_timestamp_ms: self.settings.video_cover_timestamp_ms,
        }
    }

    /// Wire source descriptor; upload sources take their exact chunk layout
    /// from the computed plan.
    pub fn source_info(&self, plan: Option<&ChunkPlan>) -> SourceInfo {
        match &self.source {
            MediaSource::FileUpload { video_size, .. } => {
                let (chunk_size, total_chunk_count) = plan
                    .map(|p| (p.chunk_size, p.chunks.len() as u64))
                    .unwrap_or((*video_size, 1));
                SourceInfo::FileUpload {
                    video_size: *video_size,
                    chunk_size,
                    total_chunk_count,
                }
            }
            MediaSource::PullFromUrl {
                video_url,
                photo_images,
            } => SourceInfo::PullFromUrl {
                video_url: video_url.clone(),
                photo_images: photo_images.clone(),
            },
        }
    }
}
