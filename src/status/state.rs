//! Publish lifecycle state machine.
//!
//! Two producers feed the same state store: the poller and the webhook
//! dispatcher. Their notifications race and may arrive duplicated or out of
//! order, so transitions are guarded here: a job never moves backwards, never
//! flips between the upload and download paths, and never leaves a terminal
//! state.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublishState {
    ProcessingUpload,
    ProcessingDownload,
    SendToUserInbox,
    PublishComplete,
    Failed,
}

impl PublishState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PublishState::PublishComplete | PublishState::Failed)
    }

    /// Lifecycle stage ordering used by the monotonic guard. The upload and
    /// download paths share the first stage; they are alternatives, not steps.
    fn stage(&self) -> u8 {
        match self {
            PublishState::ProcessingUpload | PublishState::ProcessingDownload => 0,
            PublishState::SendToUserInbox => 1,
            PublishState::PublishComplete | PublishState::Failed => 2,
        }
    }

    /// Whether a transition from `self` to `next` is applied or dropped.
    ///
    /// Re-observing the current state is accepted (idempotent updates);
    /// regressions and upload/download cross-path flips are not.
    pub fn accepts(&self, next: PublishState) -> bool {
        if self.is_terminal() {
            return false;
        }
        if *self == next {
            return true;
        }
        if next.stage() == self.stage() {
            // Only same-stage change would be an upload/download flip
            return false;
        }
        next.stage() > self.stage()
    }

    /// Parse a remote status string; unknown values yield `None` so callers
    /// can log and skip rather than fail.
    pub fn from_remote(raw: &str) -> Option<Self> {
        match raw {
            "PROCESSING_UPLOAD" => Some(PublishState::ProcessingUpload),
            "PROCESSING_DOWNLOAD" => Some(PublishState::ProcessingDownload),
            "SEND_TO_USER_INBOX" => Some(PublishState::SendToUserInbox),
            "PUBLISH_COMPLETE" => Some(PublishState::PublishComplete),
            "FAILED" => Some(PublishState::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for PublishState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PublishState::ProcessingUpload => "PROCESSING_UPLOAD",
            PublishState::ProcessingDownload => "PROCESSING_DOWNLOAD",
            PublishState::SendToUserInbox => "SEND_TO_USER_INBOX",
            PublishState::PublishComplete => "PUBLISH_COMPLETE",
            PublishState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}
