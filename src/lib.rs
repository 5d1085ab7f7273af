pub mod classify;
pub mod config;
pub mod humanize;
pub mod observability;
pub mod remote;
pub mod session;
pub mod status;
pub mod store;
pub mod transfer;
pub mod webhook;
