//! Webhook payload models and event parsing.
//!
//! The outer envelope is plain JSON, but `content` is a JSON document encoded
//! as a string, so every event needs a second parse. Unknown event names are
//! surfaced as such rather than treated as errors; the sender adds event
//! types over time.

use serde::Deserialize;
use thiserror::Error;

pub const EVENT_PUBLISH_FAILED: &str = "post.publish.failed";
pub const EVENT_PUBLISH_COMPLETE: &str = "post.publish.complete";
pub const EVENT_INBOX_DELIVERED: &str = "post.publish.inbox_delivered";
pub const EVENT_PUBLICLY_AVAILABLE: &str = "post.publish.publicly_available";
pub const EVENT_NO_LONGER_PUBLIC: &str = "post.publish.no_longer_publicly_available";
pub const EVENT_AUTHORIZATION_REMOVED: &str = "authorization.removed";

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unknown event type: {0}")]
    UnknownEvent(String),

    #[error("malformed content payload: {0}")]
    MalformedContent(#[from] serde_json::Error),

    #[error("content missing required field: {0}")]
    MissingField(&'static str),
}

/// Outer webhook envelope, shared by all event types
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    pub client_key: String,
    pub event: String,
    pub create_time: i64,
    /// Absent on some deliveries; dedup falls back to `client_key`
    #[serde(default)]
    pub user_openid: Option<String>,
    /// JSON document encoded as a string; shape depends on `event`
    pub content: String,
}

/// Inner `content` fields for the post.publish.* family
#[derive(Debug, Deserialize)]
struct PublishContent {
    publish_id: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    post_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct AuthorizationContent {
    #[serde(default)]
    reason: Option<serde_json::Value>,
}

/// An envelope decoded into something the dispatcher can act on
#[derive(Debug, Clone)]
pub enum DomainEvent {
    PublishFailed {
        publish_id: String,
        reason: String,
    },
    PublishComplete {
        publish_id: String,
    },
    InboxDelivered {
        publish_id: String,
    },
    PostBecamePublic {
        publish_id: String,
        post_id: Option<i64>,
    },
    PostNoLongerPublic {
        publish_id: String,
        post_id: Option<i64>,
    },
    AuthorizationRemoved {
        user_openid: Option<String>,
        reason: Option<String>,
    },
}

impl DomainEvent {
    pub fn publish_id(&self) -> Option<&str> {
        match self {
            DomainEvent::PublishFailed { publish_id, .. }
            | DomainEvent::PublishComplete { publish_id }
            | DomainEvent::InboxDelivered { publish_id }
            | DomainEvent::PostBecamePublic { publish_id, .. }
            | DomainEvent::PostNoLongerPublic { publish_id, .. } => Some(publish_id),
            DomainEvent::AuthorizationRemoved { .. } => None,
        }
    }
}

pub fn parse_event(envelope: &WebhookEnvelope) -> Result<DomainEvent, ParseError> {
    match envelope.event.as_str() {
        EVENT_AUTHORIZATION_REMOVED => {
            let content: AuthorizationContent = serde_json::from_str(&envelope.content)?;
            Ok(DomainEvent::AuthorizationRemoved {
                user_openid: envelope.user_openid.clone(),
                reason: content.reason.map(|v| v.to_string()),
            })
        }

        EVENT_PUBLISH_FAILED => {
            let content = publish_content(envelope)?;
            Ok(DomainEvent::PublishFailed {
                reason: content
                    .reason
                    .ok_or(ParseError::MissingField("reason"))?,
                publish_id: require_publish_id(content.publish_id)?,
            })
        }

        EVENT_PUBLISH_COMPLETE => {
            let content = publish_content(envelope)?;
            Ok(DomainEvent::PublishComplete {
                publish_id: require_publish_id(content.publish_id)?,
            })
        }

        EVENT_INBOX_DELIVERED => {
            let content = publish_content(envelope)?;
            Ok(DomainEvent::InboxDelivered {
                publish_id: require_publish_id(content.publish_id)?,
            })
        }

        EVENT_PUBLICLY_AVAILABLE => {
            let content = publish_content(envelope)?;
            Ok(DomainEvent::PostBecamePublic {
                post_id: content.post_id,
                publish_id: require_publish_id(content.publish_id)?,
            })
        }

        EVENT_NO_LONGER_PUBLIC => {
            let content = publish_content(envelope)?;
            Ok(DomainEvent::PostNoLongerPublic {
                post_id: content.post_id,
                publish_id: require_publish_id(content.publish_id)?,
            })
        }

        other => Err(ParseError::UnknownEvent(other.to_string())),
    }
}

/// Dedup fingerprint: event name, subject identifier, and creation time.
///
/// `create_time` distinguishes legitimate re-occurrences (a post flipping
/// public, hidden, public again) from redelivery of one occurrence.
pub fn fingerprint(envelope: &WebhookEnvelope, event: &DomainEvent) -> String {
    let subject = event
        .publish_id()
        .or(envelope.user_openid.as_deref())
        .unwrap_or(&envelope.client_key);
    format!("{}:{}:{}", envelope.event, subject, envelope.create_time)
}

fn publish_content(envelope: &WebhookEnvelope) -> Result<PublishContent, ParseError> {
    Ok(serde_json::from_str(&envelope.content)?)
}

fn require_publish_id(publish_id: Option<String>) -> Result<String, ParseError> {
    publish_id.ok_or(ParseError::MissingField("publish_id"))
}
