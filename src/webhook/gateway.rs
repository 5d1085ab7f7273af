//! Inbound webhook endpoint.
//!
//! The endpoint always answers 200 with a JSON disposition body. The sender
//! interprets non-2xx as delivery failure and keeps retrying for up to 72
//! hours, so rejecting a forged or stale notification with an error status
//! would only invite redelivery of the same bad payload. What happened to
//! the notification is visible in the disposition, logs, and counters
//! instead.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use http_body_util::BodyExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

use super::events::{self, DomainEvent, ParseError, WebhookEnvelope};
use super::signature::{self, SignatureError};
use crate::observability::Metrics;
use crate::store::PublishStore;

pub const SIGNATURE_HEADER: &str = "TikTok-Signature";
pub const WEBHOOK_PATH: &str = "/webhooks/tiktok";

const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// What the gateway did with a delivery; always paired with HTTP 200
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Dispatched,
    Duplicate,
    RejectedInvalidSignature,
    RejectedStaleSignature,
    IgnoredUnknownEvent,
    MalformedPayload,
    DroppedQueueFull,
}

#[derive(Debug, Serialize)]
struct DispositionBody {
    disposition: Disposition,
}

#[derive(Clone)]
pub struct GatewayState {
    pub client_secret: Arc<String>,
    pub signature_tolerance_secs: i64,
    pub store: PublishStore,
    pub events_tx: mpsc::Sender<DomainEvent>,
    pub metrics: Arc<Metrics>,
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(receive_webhook))
        .with_state(state)
}

pub async fn receive_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> impl IntoResponse {
    state.metrics.webhook_received();
    let disposition = handle_delivery(&state, &headers, body).await;
    (axum::http::StatusCode::OK, Json(DispositionBody { disposition }))
}

async fn handle_delivery(
    state: &GatewayState,
    headers: &HeaderMap,
    body: axum::body::Body,
) -> Disposition {
    if !content_type_is_json(headers) {
        warn!("webhook delivery with non-JSON content type");
        state.metrics.webhook_rejected();
        return Disposition::MalformedPayload;
    }

    // Verification runs over the raw bytes as received
    let body_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            warn!(error = %err, "failed to read webhook body");
            state.metrics.webhook_rejected();
            return Disposition::MalformedPayload;
        }
    };
    if body_bytes.len() > MAX_PAYLOAD_SIZE {
        warn!(size = body_bytes.len(), "webhook body exceeds size limit");
        state.metrics.webhook_rejected();
        return Disposition::MalformedPayload;
    }

    match verify_signature(state, headers, &body_bytes) {
        Ok(()) => {}
        Err(SignatureError::StaleTimestamp) => {
            warn!("webhook signature valid but timestamp outside tolerance");
            state.metrics.webhook_rejected();
            return Disposition::RejectedStaleSignature;
        }
        Err(err) => {
            warn!(error = %err, "webhook signature rejected");
            state.metrics.webhook_rejected();
            return Disposition::RejectedInvalidSignature;
        }
    }

    let envelope: WebhookEnvelope = match serde_json::from_slice(&body_bytes) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(error = %err, "webhook envelope failed to parse");
            state.metrics.webhook_rejected();
            return Disposition::MalformedPayload;
        }
    };

    let event = match events::parse_event(&envelope) {
        Ok(event) => event,
        Err(ParseError::UnknownEvent(name)) => {
            info!(event = %name, "ignoring unrecognized webhook event");
            return Disposition::IgnoredUnknownEvent;
        }
        Err(err) => {
            warn!(event = %envelope.event, error = %err, "webhook content failed to parse");
            state.metrics.webhook_rejected();
            return Disposition::MalformedPayload;
        }
    };

    let fingerprint = events::fingerprint(&envelope, &event);
    match state.store.observe_event(&fingerprint, Utc::now()) {
        Ok(true) => {}
        Ok(false) => {
            debug!(%fingerprint, "duplicate webhook delivery suppressed");
            state.metrics.webhook_duplicate();
            return Disposition::Duplicate;
        }
        Err(err) => {
            error!(error = %err, "dedup store unavailable");
            state.metrics.webhook_rejected();
            return Disposition::MalformedPayload;
        }
    }

    match state.events_tx.try_send(event) {
        Ok(()) => {
            debug!(%fingerprint, event = %envelope.event, "webhook dispatched");
            state.metrics.webhook_dispatched();
            Disposition::Dispatched
        }
        Err(TrySendError::Full(_) | TrySendError::Closed(_)) => {
            // Forget the fingerprint so the sender's redelivery gets through
            if let Err(err) = state.store.forget_event(&fingerprint) {
                error!(error = %err, %fingerprint, "failed to release dedup record");
            }
            error!(event = %envelope.event, "dispatch queue full, delivery dropped");
            Disposition::DroppedQueueFull
        }
    }
}

fn verify_signature(
    state: &GatewayState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), SignatureError> {
    let raw = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(SignatureError::MalformedHeader)?;
    let header = signature::parse_header(raw)?;
    signature::verify(
        &state.client_secret,
        &header,
        body,
        Utc::now().timestamp(),
        state.signature_tolerance_secs,
    )
}

fn content_type_is_json(headers: &HeaderMap) -> bool {
    let Some(content_type) = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    else {
        return false;
    };
    content_type
        .parse::<mime::Mime>()
        .map(|media_type| {
            media_type.type_() == mime::APPLICATION && media_type.subtype() == mime::JSON
        })
        .unwrap_or(false)
}
