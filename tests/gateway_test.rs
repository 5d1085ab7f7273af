use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::Utc;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt; // for `oneshot`

use postbox::observability::Metrics;
use postbox::status::PublishState;
use postbox::store::{MediaKind, PublishJob, PublishStore, SourceMode};
use postbox::webhook::{signature, DomainEvent, GatewayState, SIGNATURE_HEADER, WEBHOOK_PATH};

const SECRET: &str = "test_client_secret";

struct TestGateway {
    app: Router,
    store: PublishStore,
    events_rx: mpsc::Receiver<DomainEvent>,
    metrics: Arc<Metrics>,
    _temp: TempDir,
}

fn build_gateway() -> TestGateway {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let store = PublishStore::open(temp.path().join("store")).expect("Failed to open store");
    let metrics = Arc::new(Metrics::new());
    let (events_tx, events_rx) = mpsc::channel(16);

    let state = GatewayState {
        client_secret: Arc::new(SECRET.to_string()),
        signature_tolerance_secs: 300,
        store: store.clone(),
        events_tx,
        metrics: metrics.clone(),
    };

    TestGateway {
        app: postbox::webhook::router(state),
        store,
        events_rx,
        metrics,
        _temp: temp,
    }
}

fn event_body(event: &str, content: &str, create_time: i64) -> String {
    serde_json::json!({
        "client_key": "awkey123",
        "event": event,
        "create_time": create_time,
        "user_openid": "openid_1",
        "content": content,
    })
    .to_string()
}

fn signed_request(body: &str, header_value: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(WEBHOOK_PATH)
        .header(header::CONTENT_TYPE, "application/json")
        .header(SIGNATURE_HEADER, header_value)
        .body(Body::from(body.to_string()))
        .expect("Failed to build request")
}

async fn disposition_of(response: axum::response::Response) -> String {
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("Failed to read body");
    let value: serde_json::Value = serde_json::from_slice(&bytes).expect("non-JSON body");
    value["disposition"].as_str().expect("no disposition").to_string()
}

#[tokio::test]
async fn test_valid_event_dispatched_once() {
    let mut gateway = build_gateway();

    let now = Utc::now().timestamp();
    let body = event_body(
        "post.publish.complete",
        r#"{"publish_id":"v_pub_1"}"#,
        now,
    );
    let header = signature::header_value(SECRET, now, body.as_bytes());

    let response = gateway
        .app
        .clone()
        .oneshot(signed_request(&body, &header))
        .await
        .unwrap();
    assert_eq!(disposition_of(response).await, "dispatched");

    let event = gateway.events_rx.try_recv().expect("event not dispatched");
    assert!(matches!(
        event,
        DomainEvent::PublishComplete { ref publish_id } if publish_id == "v_pub_1"
    ));
    assert_eq!(gateway.metrics.snapshot().webhooks_dispatched, 1);
}

#[tokio::test]
async fn test_tampered_body_acked_but_not_dispatched() {
    let mut gateway = build_gateway();

    let now = Utc::now().timestamp();
    let body = event_body(
        "post.publish.complete",
        r#"{"publish_id":"v_pub_1"}"#,
        now,
    );
    let header = signature::header_value(SECRET, now, body.as_bytes());

    // Flip the payload after signing
    let tampered = body.replace("v_pub_1", "v_pub_9");
    let response = gateway
        .app
        .clone()
        .oneshot(signed_request(&tampered, &header))
        .await
        .unwrap();

    // Still HTTP 200: a non-2xx would only trigger sender retries of the
    // same bad payload
    assert_eq!(disposition_of(response).await, "rejected_invalid_signature");
    assert!(gateway.events_rx.try_recv().is_err());
    assert_eq!(gateway.metrics.snapshot().webhooks_rejected, 1);
}

#[tokio::test]
async fn test_duplicate_delivery_dispatches_once() {
    let mut gateway = build_gateway();

    let now = Utc::now().timestamp();
    let body = event_body(
        "post.publish.publicly_available",
        r#"{"publish_id":"v_pub_1","post_id":42}"#,
        now,
    );
    let header = signature::header_value(SECRET, now, body.as_bytes());

    let first = gateway
        .app
        .clone()
        .oneshot(signed_request(&body, &header))
        .await
        .unwrap();
    assert_eq!(disposition_of(first).await, "dispatched");

    let second = gateway
        .app
        .clone()
        .oneshot(signed_request(&body, &header))
        .await
        .unwrap();
    assert_eq!(disposition_of(second).await, "duplicate");

    assert!(gateway.events_rx.try_recv().is_ok());
    assert!(gateway.events_rx.try_recv().is_err());
    assert_eq!(gateway.metrics.snapshot().webhooks_duplicate, 1);
}

#[tokio::test]
async fn test_same_event_different_create_time_is_new_occurrence() {
    let mut gateway = build_gateway();
    let now = Utc::now().timestamp();

    for offset in [0, 60] {
        let body = event_body(
            "post.publish.publicly_available",
            r#"{"publish_id":"v_pub_1","post_id":42}"#,
            now + offset,
        );
        let header = signature::header_value(SECRET, now, body.as_bytes());
        let response = gateway
            .app
            .clone()
            .oneshot(signed_request(&body, &header))
            .await
            .unwrap();
        assert_eq!(disposition_of(response).await, "dispatched");
    }

    assert!(gateway.events_rx.try_recv().is_ok());
    assert!(gateway.events_rx.try_recv().is_ok());
}

#[tokio::test]
async fn test_stale_signature_rejected_distinctly() {
    let gateway = build_gateway();

    let stale = Utc::now().timestamp() - 400;
    let body = event_body(
        "post.publish.complete",
        r#"{"publish_id":"v_pub_1"}"#,
        stale,
    );
    // Genuine signature, just old
    let header = signature::header_value(SECRET, stale, body.as_bytes());

    let response = gateway
        .app
        .clone()
        .oneshot(signed_request(&body, &header))
        .await
        .unwrap();
    assert_eq!(disposition_of(response).await, "rejected_stale_signature");
}

#[tokio::test]
async fn test_delivery_without_user_openid_dispatched() {
    let mut gateway = build_gateway();

    // Some deliveries omit user_openid entirely
    let now = Utc::now().timestamp();
    let body = serde_json::json!({
        "client_key": "awkey123",
        "event": "post.publish.complete",
        "create_time": now,
        "content": r#"{"publish_id":"v_pub_1"}"#,
    })
    .to_string();
    let header = signature::header_value(SECRET, now, body.as_bytes());

    let response = gateway
        .app
        .clone()
        .oneshot(signed_request(&body, &header))
        .await
        .unwrap();
    assert_eq!(disposition_of(response).await, "dispatched");

    let event = gateway.events_rx.try_recv().expect("event not dispatched");
    assert!(matches!(
        event,
        DomainEvent::PublishComplete { ref publish_id } if publish_id == "v_pub_1"
    ));
}

#[tokio::test]
async fn test_unknown_event_ignored() {
    let mut gateway = build_gateway();

    let now = Utc::now().timestamp();
    let body = event_body("post.publish.brand_new_event", "{}", now);
    let header = signature::header_value(SECRET, now, body.as_bytes());

    let response = gateway
        .app
        .clone()
        .oneshot(signed_request(&body, &header))
        .await
        .unwrap();
    assert_eq!(disposition_of(response).await, "ignored_unknown_event");
    assert!(gateway.events_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_missing_signature_header_rejected() {
    let gateway = build_gateway();

    let body = event_body(
        "post.publish.complete",
        r#"{"publish_id":"v_pub_1"}"#,
        Utc::now().timestamp(),
    );
    let request = Request::builder()
        .method("POST")
        .uri(WEBHOOK_PATH)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap();

    let response = gateway.app.clone().oneshot(request).await.unwrap();
    assert_eq!(disposition_of(response).await, "rejected_invalid_signature");
}

#[tokio::test]
async fn test_non_json_content_type_rejected() {
    let gateway = build_gateway();

    let now = Utc::now().timestamp();
    let body = event_body(
        "post.publish.complete",
        r#"{"publish_id":"v_pub_1"}"#,
        now,
    );
    let header = signature::header_value(SECRET, now, body.as_bytes());

    let request = Request::builder()
        .method("POST")
        .uri(WEBHOOK_PATH)
        .header(header::CONTENT_TYPE, "text/plain")
        .header(SIGNATURE_HEADER, header)
        .body(Body::from(body))
        .unwrap();

    let response = gateway.app.clone().oneshot(request).await.unwrap();
    assert_eq!(disposition_of(response).await, "malformed_payload");
}

#[tokio::test]
async fn test_end_to_end_webhook_advances_job() {
    let mut gateway = build_gateway();

    let job = PublishJob::new(
        "v_pub_1".to_string(),
        MediaKind::Video,
        SourceMode::FileUpload,
        PublishState::ProcessingUpload,
        1000,
        Utc::now(),
    );
    gateway.store.insert_job(&job).unwrap();

    let now = Utc::now().timestamp();
    let body = event_body(
        "post.publish.failed",
        r#"{"publish_id":"v_pub_1","reason":"file_format_check_failed"}"#,
        now,
    );
    let header = signature::header_value(SECRET, now, body.as_bytes());
    let response = gateway
        .app
        .clone()
        .oneshot(signed_request(&body, &header))
        .await
        .unwrap();
    assert_eq!(disposition_of(response).await, "dispatched");

    // Feed the dispatched event through the dispatcher path
    let event = gateway.events_rx.try_recv().unwrap();
    let (tx, rx) = mpsc::channel(1);
    tx.send(event).await.unwrap();
    drop(tx);
    postbox::webhook::run_dispatcher(rx, gateway.store.clone(), gateway.metrics.clone()).await;

    let job = gateway.store.get_job("v_pub_1").unwrap().unwrap();
    assert_eq!(job.state, PublishState::Failed);
    assert_eq!(job.fail_reason.as_deref(), Some("file_format_check_failed"));
    assert!(job.finalized);
}
