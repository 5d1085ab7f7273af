//! Publish session lifecycle: descriptor validation, init, upload, cancel

mod descriptor;
#[allow(clippy::module_inception)]
mod session;

pub use descriptor::{
    CreatorInfo, MediaDescriptor, MediaSource, PostSettings, ValidationError,
};
pub use session::{CancelOutcome, PublishApi, PublishSession, SessionError};
