//! Server assembly: webhook gateway, event dispatcher, store pruning.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use postbox::config::Config;
use postbox::observability::Metrics;
use postbox::store::PublishStore;
use postbox::webhook::{self, GatewayState};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

const PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

pub async fn run(address_override: Option<SocketAddr>) -> Result<(), AnyError> {
    info!("Loading configuration");
    let config = Config::load().map_err(|e| format!("Failed to load config: {}", e))?;
    let address = address_override.unwrap_or(config.server.bind_addr);

    let client_secret = config
        .credentials
        .client_secret
        .clone()
        .ok_or("POSTBOX_CLIENT_SECRET must be set to verify webhook signatures")?;

    info!(path = %config.server.store_path.display(), "Opening publish store");
    let store = PublishStore::open(&config.server.store_path)
        .map_err(|e| format!("Failed to open publish store: {}", e))?;

    let metrics = Arc::new(Metrics::new());

    let (events_tx, events_rx) = mpsc::channel(config.webhook.queue_depth);
    tokio::spawn(webhook::run_dispatcher(
        events_rx,
        store.clone(),
        metrics.clone(),
    ));

    spawn_pruner(store.clone(), &config);

    let gateway = GatewayState {
        client_secret: Arc::new(client_secret),
        signature_tolerance_secs: config.webhook.signature_tolerance_secs,
        store: store.clone(),
        events_tx,
        metrics,
    };

    let app = webhook::router(gateway)
        .merge(
            Router::new()
                .route("/jobs/{publish_id}", get(get_job))
                .route("/health", get(health))
                .with_state(store),
        )
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(address).await?;
    info!(%address, "Postbox server listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn spawn_pruner(store: PublishStore, config: &Config) {
    let retention = config.retention.policy();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(err) = store.prune_expired(&retention) {
                error!(error = %err, "store pruning failed");
            }
        }
    });
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn get_job(
    State(store): State<PublishStore>,
    Path(publish_id): Path<String>,
) -> impl IntoResponse {
    match store.get_job(&publish_id) {
        Ok(Some(job)) => (StatusCode::OK, Json(job)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!(publish_id, error = %err, "job lookup failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
