//! Observability stubs (metrics, tracing)

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics handle for recording counters/gauges
#[derive(Debug, Default)]
pub struct Metrics {
    publishes_started: AtomicU64,
    publishes_completed: AtomicU64,
    publishes_failed: AtomicU64,
    chunks_uploaded: AtomicU64,
    webhooks_received: AtomicU64,
    webhooks_dispatched: AtomicU64,
    webhooks_duplicate: AtomicU64,
    webhooks_rejected: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish_started(&self) {
        self.publishes_started.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "publishes_started", "Metric incremented");
    }

    pub fn publish_completed(&self) {
        self.publishes_completed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "publishes_completed", "Metric incremented");
    }

    pub fn publish_failed(&self) {
        self.publishes_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "publishes_failed", "Metric incremented");
    }

    pub fn chunk_uploaded(&self) {
        self.chunks_uploaded.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "chunks_uploaded", "Metric incremented");
    }

    pub fn webhook_received(&self) {
        self.webhooks_received.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "webhooks_received", "Metric incremented");
    }

    pub fn webhook_dispatched(&self) {
        self.webhooks_dispatched.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "webhooks_dispatched", "Metric incremented");
    }

    pub fn webhook_duplicate(&self) {
        self.webhooks_duplicate.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "webhooks_duplicate", "Metric incremented");
    }

    pub fn webhook_rejected(&self) {
        self.webhooks_rejected.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "webhooks_rejected", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            publishes_started: self.publishes_started.load(Ordering::Relaxed),
            publishes_completed: self.publishes_completed.load(Ordering::Relaxed),
            publishes_failed: self.publishes_failed.load(Ordering::Relaxed),
            chunks_uploaded: self.chunks_uploaded.load(Ordering::Relaxed),
            webhooks_received: self.webhooks_received.load(Ordering::Relaxed),
            webhooks_dispatched: self.webhooks_dispatched.load(Ordering::Relaxed),
            webhooks_duplicate: self.webhooks_duplicate.load(Ordering::Relaxed),
            webhooks_rejected: self.webhooks_rejected.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub publishes_started: u64,
    pub publishes_completed: u64,
    pub publishes_failed: u64,
    pub chunks_uploaded: u64,
    pub webhooks_received: u64,
    pub webhooks_dispatched: u64,
    pub webhooks_duplicate: u64,
    pub webhooks_rejected: u64,
}
