use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::remote::RemoteConfig;
use crate::status::PollPolicy;
use crate::store::RetentionPolicy;
use crate::transfer::{RetryPolicy, DEFAULT_CHUNK_SIZE};

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub remote: RemoteSettings,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            store_path: default_store_path(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().unwrap()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/postbox")
}

/// Remote API endpoint and timeouts
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl RemoteSettings {
    pub fn remote_config(&self) -> RemoteConfig {
        RemoteConfig {
            base_url: self.base_url.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://open.tiktokapis.com".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    60
}

/// API credentials. The key is public; the secret and token are loaded from
/// environment variables only, never from config files.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Credentials {
    #[serde(default)]
    pub client_key: String,
    /// Webhook signing secret (environment only)
    #[serde(skip)]
    pub client_secret: Option<String>,
    /// OAuth access token (environment only)
    #[serde(skip)]
    pub access_token: Option<String>,
}

/// Chunk upload tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransferConfig {
    #[serde(default = "default_chunk_size")]
    pub default_chunk_size: ByteSize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
}

impl TransferConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_backoff: Duration::from_millis(self.base_backoff_ms),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            default_chunk_size: default_chunk_size(),
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
        }
    }
}

fn default_chunk_size() -> ByteSize {
    ByteSize(DEFAULT_CHUNK_SIZE)
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_backoff_ms() -> u64 {
    1000
}

/// Status poll pacing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollingConfig {
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: u64,
    #[serde(default = "default_max_interval_secs")]
    pub max_interval_secs: u64,
    #[serde(default = "default_download_timeout_margin_secs")]
    pub download_timeout_margin_secs: u64,
}

impl PollingConfig {
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            min_interval: Duration::from_secs(self.min_interval_secs),
            max_interval: Duration::from_secs(self.max_interval_secs),
            download_timeout_margin: Duration::from_secs(self.download_timeout_margin_secs),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: default_min_interval_secs(),
            max_interval_secs: default_max_interval_secs(),
            download_timeout_margin_secs: default_download_timeout_margin_secs(),
        }
    }
}

fn default_min_interval_secs() -> u64 {
    2
}

fn default_max_interval_secs() -> u64 {
    30
}

fn default_download_timeout_margin_secs() -> u64 {
    300
}

/// Inbound webhook handling
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookConfig {
    #[serde(default = "default_signature_tolerance_secs")]
    pub signature_tolerance_secs: i64,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            signature_tolerance_secs: default_signature_tolerance_secs(),
            queue_depth: default_queue_depth(),
        }
    }
}

fn default_signature_tolerance_secs() -> i64 {
    300
}

fn default_queue_depth() -> usize {
    256
}

/// Retention horizons for dedup records and finished jobs
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    #[serde(default = "default_dedup_hours")]
    pub dedup_hours: i64,
    #[serde(default = "default_jobs_ttl_days")]
    pub jobs_ttl_days: i64,
}

impl RetentionConfig {
    pub fn policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            dedup_horizon: chrono::Duration::hours(self.dedup_hours),
            jobs_ttl: chrono::Duration::days(self.jobs_ttl_days),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            dedup_hours: default_dedup_hours(),
            jobs_ttl_days: default_jobs_ttl_days(),
        }
    }
}

fn default_dedup_hours() -> i64 {
    72
}

fn default_jobs_ttl_days() -> i64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            remote: RemoteSettings::default(),
            credentials: Credentials::default(),
            transfer: TransferConfig::default(),
            polling: PollingConfig::default(),
            webhook: WebhookConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}
