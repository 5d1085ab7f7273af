//! Remote publish API: wire models and authenticated HTTP client

mod client;
mod models;

pub use client::{
    RemoteClient, RemoteConfig, RemoteError, Result, CANCEL_PATH, CONTENT_INIT_PATH,
    RECEIVED_OFFSET_HEADER, STATUS_FETCH_PATH, VIDEO_INIT_PATH,
};
pub use models::{
    ApiEnvelope, ApiStatus, InitData, InitRequest, PostInfo, PublishIdRequest, SourceInfo,
    StatusData,
};
