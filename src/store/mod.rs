//! Persistent job-state and webhook-dedup store

mod error;
mod keys;
mod model;
mod pruning;
#[allow(clippy::module_inception)]
mod store;

pub use error::{Result, StoreError};
pub use model::{MediaKind, PublishJob, SourceMode};
pub use pruning::{PruneStats, RetentionPolicy};
pub use store::{PublishStore, Transition};
