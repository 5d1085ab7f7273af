//! Classification of remote error codes and terminal fail reasons.
//!
//! The remote reports failures in two shapes: HTTP status codes on direct
//! API calls, and string `fail_reason` / `error.code` values on async job
//! status and webhook payloads. Both funnel through [`classify`] so the
//! transfer executor, status tracker, and webhook dispatcher agree on what
//! is worth retrying.

use serde::Serialize;

/// How a caller should react to a remote failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Transient; retry with backoff
    Retryable,
    /// Rate or quota pressure; retry only after a cooldown
    RetryableAfterCooldown,
    /// Permanent; retrying the same request cannot succeed
    Fatal,
    /// The user or operator must change something before retrying
    UserActionRequired,
}

impl ErrorClass {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorClass::Retryable | ErrorClass::RetryableAfterCooldown
        )
    }
}

/// Classify a remote `fail_reason` or `error.code` string.
///
/// Unknown codes classify as `Fatal`: surprising failures must not loop.
pub fn classify(code: &str) -> ErrorClass {
    match code {
        "internal" | "internal_error" | "connection_error" | "network_error" => {
            ErrorClass::Retryable
        }

        "rate_limit_exceeded" | "spam_risk_too_many_posts" | "reached_active_user_cap" => {
            ErrorClass::RetryableAfterCooldown
        }

        "url_ownership_unverified" | "scope_not_authorized" | "privacy_level_option_mismatch" => {
            ErrorClass::UserActionRequired
        }

        "spam_risk_user_banned_from_posting"
        | "auth_removed"
        | "spam_risk_text"
        | "spam_risk"
        | "invalid_params"
        | "invalid_file_upload"
        | "video_pull_failed"
        | "photo_pull_failed"
        | "frame_rate_check_failed"
        | "duration_check_failed"
        | "picture_size_check_failed"
        | "file_format_check_failed" => ErrorClass::Fatal,

        _ => ErrorClass::Fatal,
    }
}

/// Classify an HTTP status code from a direct API call.
pub fn classify_http(status: u16) -> ErrorClass {
    match status {
        429 => ErrorClass::RetryableAfterCooldown,
        500..=599 => ErrorClass::Retryable,
        401 | 403 => ErrorClass::UserActionRequired,
        _ => ErrorClass::Fatal,
    }
}
