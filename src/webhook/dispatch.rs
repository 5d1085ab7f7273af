//! Applies verified, deduplicated webhook events to the job store.
//!
//! The dispatcher is the webhook side of the two-producer arrangement: the
//! poller and this loop both feed the store's guarded transition path, so a
//! late or out-of-order webhook can never move a job backwards.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::events::DomainEvent;
use crate::observability::Metrics;
use crate::status::PublishState;
use crate::store::{PublishStore, StoreError, Transition};

pub async fn run_dispatcher(
    mut events_rx: mpsc::Receiver<DomainEvent>,
    store: PublishStore,
    metrics: Arc<Metrics>,
) {
    info!("webhook dispatcher started");
    while let Some(event) = events_rx.recv().await {
        if let Err(err) = apply_event(&store, &metrics, &event) {
            warn!(?event, error = %err, "failed to apply webhook event");
        }
    }
    info!("webhook dispatcher stopped");
}

fn apply_event(
    store: &PublishStore,
    metrics: &Metrics,
    event: &DomainEvent,
) -> Result<(), StoreError> {
    match event {
        DomainEvent::PublishFailed { publish_id, reason } => {
            let transition =
                store.apply_state(publish_id, PublishState::Failed, Some(reason), &[])?;
            if applied(publish_id, PublishState::Failed, &transition) {
                metrics.publish_failed();
                finalize(store, publish_id)?;
            }
        }

        DomainEvent::PublishComplete { publish_id } => {
            let transition =
                store.apply_state(publish_id, PublishState::PublishComplete, None, &[])?;
            if applied(publish_id, PublishState::PublishComplete, &transition) {
                metrics.publish_completed();
                finalize(store, publish_id)?;
            }
        }

        DomainEvent::InboxDelivered { publish_id } => {
            let transition =
                store.apply_state(publish_id, PublishState::SendToUserInbox, None, &[])?;
            applied(publish_id, PublishState::SendToUserInbox, &transition);
        }

        DomainEvent::PostBecamePublic { publish_id, post_id } => {
            store.set_visibility(publish_id, *post_id, true)?;
            debug!(publish_id, ?post_id, "post publicly available");
        }

        DomainEvent::PostNoLongerPublic { publish_id, post_id } => {
            store.set_visibility(publish_id, *post_id, false)?;
            debug!(publish_id, ?post_id, "post no longer publicly available");
        }

        DomainEvent::AuthorizationRemoved { user_openid, reason } => {
            // No job to update; the operator has to re-authorize before any
            // further publish succeeds
            warn!(?user_openid, ?reason, "user revoked authorization");
        }
    }
    Ok(())
}

/// Log the guard's verdict; returns whether the transition took effect
fn applied(publish_id: &str, attempted: PublishState, transition: &Transition) -> bool {
    match transition {
        Transition::Applied(_) => {
            info!(publish_id, state = %attempted, "webhook advanced publish state");
            true
        }
        Transition::Dropped { current, .. } => {
            debug!(
                publish_id,
                current = %current,
                attempted = %attempted,
                "webhook transition dropped by monotonic guard"
            );
            false
        }
    }
}

fn finalize(store: &PublishStore, publish_id: &str) -> Result<(), StoreError> {
    if store.mark_finalized(publish_id)? {
        info!(publish_id, "publish finalized by webhook");
    }
    Ok(())
}
