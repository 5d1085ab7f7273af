//! Publish lifecycle state and the polling status tracker

mod limiter;
mod state;
mod tracker;

pub use limiter::CredentialLimiter;
pub use state::PublishState;
pub use tracker::{
    PollPolicy, StatusProbe, StatusTracker, TrackError, TrackOutcome, DOWNLOAD_CEILING,
};
