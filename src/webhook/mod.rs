//! Inbound webhook pipeline: signature verification, event parsing,
//! deduplication, and dispatch into the job store.

mod dispatch;
mod events;
mod gateway;
pub mod signature;

pub use dispatch::run_dispatcher;
pub use events::{
    parse_event, DomainEvent, ParseError, WebhookEnvelope, EVENT_AUTHORIZATION_REMOVED,
    EVENT_INBOX_DELIVERED, EVENT_NO_LONGER_PUBLIC, EVENT_PUBLICLY_AVAILABLE,
    EVENT_PUBLISH_COMPLETE, EVENT_PUBLISH_FAILED,
};
pub use gateway::{router, Disposition, GatewayState, SIGNATURE_HEADER, WEBHOOK_PATH};
