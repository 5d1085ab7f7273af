/// Retention pruning for dedup records and finished jobs
use chrono::{DateTime, Duration, Utc};
use fjall::{Keyspace, PartitionHandle};
use tracing::debug;

use super::error::Result;
use super::keys::encode_meta_key;
use super::model::PublishJob;

const META_LAST_PRUNE: &str = "last_prune";

/// Retention horizons. The dedup horizon must cover the webhook sender's
/// 72-hour retry window or duplicates could slip through after pruning.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub dedup_horizon: Duration,
    pub jobs_ttl: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            dedup_horizon: Duration::hours(72),
            jobs_ttl: Duration::days(30),
        }
    }
}

#[derive(Debug, Default)]
pub struct PruneStats {
    pub dedup_pruned: usize,
    pub jobs_pruned: usize,
}

/// Remove dedup fingerprints past the retention horizon and terminal,
/// finalized jobs past the job TTL.
pub fn prune_expired(
    keyspace: &Keyspace,
    jobs: &PartitionHandle,
    dedup: &PartitionHandle,
    metadata: &PartitionHandle,
    retention: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Result<PruneStats> {
    let mut stats = PruneStats::default();

    stats.dedup_pruned = prune_dedup(dedup, retention.dedup_horizon, now)?;
    stats.jobs_pruned = prune_jobs(jobs, retention.jobs_ttl, now)?;

    metadata.insert(
        encode_meta_key(META_LAST_PRUNE),
        now.timestamp().to_string().as_bytes(),
    )?;
    keyspace.persist(fjall::PersistMode::SyncAll)?;

    Ok(stats)
}

/// Dedup values hold the first-seen unix timestamp as a decimal string
fn prune_dedup(dedup: &PartitionHandle, horizon: Duration, now: DateTime<Utc>) -> Result<usize> {
    let cutoff = (now - horizon).timestamp();
    let mut expired = Vec::new();

    for item in dedup.iter() {
        let (key, value) = item?;
        let first_seen = std::str::from_utf8(&value)
            .ok()
            .and_then(|s| s.parse::<i64>().ok());
        match first_seen {
            Some(ts) if ts >= cutoff => {}
            // Unparseable entries are treated as expired
            _ => expired.push(key.to_vec()),
        }
    }

    for key in &expired {
        dedup.remove(key.as_slice())?;
    }

    debug!(pruned = expired.len(), "dedup records pruned");
    Ok(expired.len())
}

/// A job is collectible once terminal, finalized (listeners notified), and
/// untouched for the TTL.
fn prune_jobs(jobs: &PartitionHandle, ttl: Duration, now: DateTime<Utc>) -> Result<usize> {
    let cutoff = now - ttl;
    let mut expired = Vec::new();

    for item in jobs.iter() {
        let (key, value) = item?;
        let Ok(job) = serde_json::from_slice::<PublishJob>(&value) else {
            expired.push(key.to_vec());
            continue;
        };
        if job.state.is_terminal() && job.finalized && job.updated_at < cutoff {
            expired.push(key.to_vec());
        }
    }

    for key in &expired {
        jobs.remove(key.as_slice())?;
    }

    debug!(pruned = expired.len(), "finished jobs pruned");
    Ok(expired.len())
}
