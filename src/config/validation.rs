//! Configuration validation, run once at load time

use thiserror::Error;

use super::models::Config;
use crate::transfer::{MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error(
        "transfer.default_chunk_size {0} outside allowed range \
         [{MIN_CHUNK_SIZE}, {MAX_CHUNK_SIZE}]"
    )]
    InvalidChunkSize(u64),

    #[error("transfer.max_attempts must be at least 1")]
    NoAttempts,

    #[error("polling.min_interval_secs must be at least 2 (remote rate limit)")]
    PollIntervalTooShort,

    #[error("polling.min_interval_secs exceeds polling.max_interval_secs")]
    PollIntervalInverted,

    #[error("webhook.signature_tolerance_secs must be positive")]
    NonPositiveTolerance,

    #[error("webhook.queue_depth must be at least 1")]
    EmptyQueue,

    #[error("retention.dedup_hours {0} shorter than the sender's 72-hour retry window")]
    DedupHorizonTooShort(i64),

    #[error("retention.jobs_ttl_days must be positive")]
    NonPositiveJobsTtl,
}

pub fn validate(config: &Config) -> Result<(), ValidationError> {
    let chunk_size = config.transfer.default_chunk_size.as_u64();
    if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&chunk_size) {
        return Err(ValidationError::InvalidChunkSize(chunk_size));
    }
    if config.transfer.max_attempts == 0 {
        return Err(ValidationError::NoAttempts);
    }

    if config.polling.min_interval_secs < 2 {
        return Err(ValidationError::PollIntervalTooShort);
    }
    if config.polling.min_interval_secs > config.polling.max_interval_secs {
        return Err(ValidationError::PollIntervalInverted);
    }

    if config.webhook.signature_tolerance_secs <= 0 {
        return Err(ValidationError::NonPositiveTolerance);
    }
    if config.webhook.queue_depth == 0 {
        return Err(ValidationError::EmptyQueue);
    }

    if config.retention.dedup_hours < 72 {
        return Err(ValidationError::DedupHorizonTooShort(
            config.retention.dedup_hours,
        ));
    }
    if config.retention.jobs_ttl_days <= 0 {
        return Err(ValidationError::NonPositiveJobsTtl);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::ByteSize;

    #[test]
    fn test_defaults_validate() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_chunk_size_bounds() {
        let mut config = Config::default();
        config.transfer.default_chunk_size = ByteSize(1024);
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidChunkSize(1024))
        ));

        config.transfer.default_chunk_size = ByteSize(128 * 1024 * 1024);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_poll_interval_floor() {
        let mut config = Config::default();
        config.polling.min_interval_secs = 1;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::PollIntervalTooShort)
        ));
    }

    #[test]
    fn test_dedup_horizon_floor() {
        let mut config = Config::default();
        config.retention.dedup_hours = 24;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::DedupHorizonTooShort(24))
        ));
    }
}
