use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info};

use super::error::{Result, StoreError};
use super::keys::{encode_dedup_key, encode_job_key};
use super::model::PublishJob;
use super::pruning::{prune_expired, PruneStats, RetentionPolicy};
use crate::status::PublishState;

/// Outcome of a guarded state transition
#[derive(Debug, Clone)]
pub enum Transition {
    Applied(PublishJob),
    /// Dropped by the monotonic guard: terminal, regressive, or cross-path
    Dropped {
        current: PublishState,
        attempted: PublishState,
    },
}

/// Fjall-backed store for publish jobs and webhook dedup records.
///
/// Jobs and dedup entries are mutated concurrently by the poller, the
/// webhook dispatcher, and the transfer executor; read-modify-write paths
/// serialize on an internal lock.
#[derive(Clone)]
pub struct PublishStore {
    keyspace: Keyspace,
    jobs: PartitionHandle,
    dedup: PartitionHandle,
    metadata: PartitionHandle,
    write_lock: Arc<Mutex<()>>,
}

impl PublishStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening publish store");

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let jobs = keyspace.open_partition("jobs", PartitionCreateOptions::default())?;
        let dedup = keyspace.open_partition("dedup", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        Ok(Self {
            keyspace,
            jobs,
            dedup,
            metadata,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn insert_job(&self, job: &PublishJob) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();
        self.put_job(job)
    }

    pub fn get_job(&self, publish_id: &str) -> Result<Option<PublishJob>> {
        match self.jobs.get(encode_job_key(publish_id))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Read-modify-write a job under the store lock
    pub fn update_job<F>(&self, publish_id: &str, mutate: F) -> Result<PublishJob>
    where
        F: FnOnce(&mut PublishJob),
    {
        let _guard = self.write_lock.lock().unwrap();
        let mut job = self
            .get_job(publish_id)?
            .ok_or_else(|| StoreError::JobNotFound(publish_id.to_string()))?;
        mutate(&mut job);
        job.updated_at = Utc::now();
        self.put_job(&job)?;
        Ok(job)
    }

    /// Apply a lifecycle transition, enforcing the monotonic guard.
    ///
    /// `fail_reason` and `post_ids` are recorded only when the transition is
    /// applied; a dropped notification never overwrites newer facts.
    pub fn apply_state(
        &self,
        publish_id: &str,
        next: PublishState,
        fail_reason: Option<&str>,
        post_ids: &[i64],
    ) -> Result<Transition> {
        let _guard = self.write_lock.lock().unwrap();
        let mut job = self
            .get_job(publish_id)?
            .ok_or_else(|| StoreError::JobNotFound(publish_id.to_string()))?;

        if !job.state.accepts(next) {
            debug!(
                publish_id,
                current = %job.state,
                attempted = %next,
                "transition dropped by monotonic guard"
            );
            return Ok(Transition::Dropped {
                current: job.state,
                attempted: next,
            });
        }

        job.state = next;
        if next != PublishState::ProcessingUpload {
            // Leaving the upload stage invalidates the upload reference
            job.upload_url = None;
            job.upload_url_issued_at = None;
        }
        if let Some(reason) = fail_reason {
            job.fail_reason = Some(reason.to_string());
        }
        if !post_ids.is_empty() {
            job.post_ids = post_ids.to_vec();
        }
        job.updated_at = Utc::now();
        self.put_job(&job)?;
        Ok(Transition::Applied(job))
    }

    /// Record transfer progress for a job
    pub fn record_progress(&self, publish_id: &str, bytes_transferred: u64) -> Result<()> {
        self.update_job(publish_id, |job| {
            job.bytes_transferred = bytes_transferred;
        })?;
        Ok(())
    }

    /// Mark post visibility, orthogonal to the lifecycle state
    pub fn set_visibility(&self, publish_id: &str, post_id: Option<i64>, visible: bool) -> Result<()> {
        self.update_job(publish_id, |job| {
            job.publicly_available = visible;
            if let Some(id) = post_id {
                if !job.post_ids.contains(&id) {
                    job.post_ids.push(id);
                }
            }
        })?;
        Ok(())
    }

    /// Flip the finalize guard. Returns true exactly once per job, so
    /// completion side effects cannot re-fire on repeated terminal
    /// observations.
    pub fn mark_finalized(&self, publish_id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap();
        let mut job = self
            .get_job(publish_id)?
            .ok_or_else(|| StoreError::JobNotFound(publish_id.to_string()))?;
        if job.finalized {
            return Ok(false);
        }
        job.finalized = true;
        job.updated_at = Utc::now();
        self.put_job(&job)?;
        Ok(true)
    }

    pub fn remove_job(&self, publish_id: &str) -> Result<()> {
        self.jobs.remove(encode_job_key(publish_id))?;
        Ok(())
    }

    /// Record a webhook fingerprint. Returns true when first seen; false
    /// means the event is a duplicate inside the retention window.
    pub fn observe_event(&self, fingerprint: &str, now: DateTime<Utc>) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap();
        let key = encode_dedup_key(fingerprint);
        if self.dedup.get(&key)?.is_some() {
            return Ok(false);
        }
        self.dedup
            .insert(&key, now.timestamp().to_string().as_bytes())?;
        Ok(true)
    }

    /// Drop a fingerprint recorded by [`observe_event`](Self::observe_event).
    ///
    /// Used when handoff fails after the fingerprint was recorded, so the
    /// sender's redelivery is not mistaken for a duplicate.
    pub fn forget_event(&self, fingerprint: &str) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();
        self.dedup.remove(encode_dedup_key(fingerprint))?;
        Ok(())
    }

    /// Prune expired dedup records and garbage-collect finalized jobs
    pub fn prune_expired(&self, retention: &RetentionPolicy) -> Result<PruneStats> {
        let _guard = self.write_lock.lock().unwrap();
        let stats = prune_expired(
            &self.keyspace,
            &self.jobs,
            &self.dedup,
            &self.metadata,
            retention,
            Utc::now(),
        )?;
        info!(?stats, "store pruning complete");
        Ok(stats)
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    #[cfg(test)]
    pub(super) fn insert_raw_dedup(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.dedup.insert(key, value)?;
        Ok(())
    }

    fn put_job(&self, job: &PublishJob) -> Result<()> {
        let value = serde_json::to_vec(job)?;
        self.jobs.insert(encode_job_key(&job.publish_id), value)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::model::{MediaKind, SourceMode};
    use tempfile::TempDir;

    fn create_test_store() -> (PublishStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = PublishStore::open(temp_dir.path().join("test_store")).unwrap();
        (store, temp_dir)
    }

    fn test_job(publish_id: &str) -> PublishJob {
        PublishJob::new(
            publish_id.to_string(),
            MediaKind::Video,
            SourceMode::FileUpload,
            PublishState::ProcessingUpload,
            1000,
            Utc::now(),
        )
    }

    #[test]
    fn test_insert_and_get_job() {
        let (store, _temp) = create_test_store();
        store.insert_job(&test_job("v_pub_1")).unwrap();

        let job = store.get_job("v_pub_1").unwrap().unwrap();
        assert_eq!(job.publish_id, "v_pub_1");
        assert_eq!(job.state, PublishState::ProcessingUpload);
        assert!(store.get_job("missing").unwrap().is_none());
    }

    #[test]
    fn test_apply_state_forward_and_guard() {
        let (store, _temp) = create_test_store();
        store.insert_job(&test_job("v_pub_1")).unwrap();

        let applied = store
            .apply_state("v_pub_1", PublishState::PublishComplete, None, &[42])
            .unwrap();
        assert!(matches!(applied, Transition::Applied(_)));

        // Late notification implying regression is dropped
        let dropped = store
            .apply_state("v_pub_1", PublishState::SendToUserInbox, None, &[])
            .unwrap();
        assert!(matches!(dropped, Transition::Dropped { .. }));

        let job = store.get_job("v_pub_1").unwrap().unwrap();
        assert_eq!(job.state, PublishState::PublishComplete);
        assert_eq!(job.post_ids, vec![42]);
    }

    #[test]
    fn test_leaving_upload_stage_clears_upload_url() {
        let (store, _temp) = create_test_store();
        let mut job = test_job("v_pub_1");
        job.upload_url = Some("https://upload.example/u".to_string());
        job.upload_url_issued_at = Some(Utc::now());
        store.insert_job(&job).unwrap();

        store
            .apply_state("v_pub_1", PublishState::SendToUserInbox, None, &[])
            .unwrap();

        let job = store.get_job("v_pub_1").unwrap().unwrap();
        assert!(job.upload_url.is_none());
        assert!(job.upload_ticket().is_none());
    }

    #[test]
    fn test_fail_reason_recorded() {
        let (store, _temp) = create_test_store();
        store.insert_job(&test_job("v_pub_1")).unwrap();

        store
            .apply_state(
                "v_pub_1",
                PublishState::Failed,
                Some("spam_risk_too_many_posts"),
                &[],
            )
            .unwrap();

        let job = store.get_job("v_pub_1").unwrap().unwrap();
        assert_eq!(job.fail_reason.as_deref(), Some("spam_risk_too_many_posts"));
    }

    #[test]
    fn test_finalize_guard_fires_once() {
        let (store, _temp) = create_test_store();
        store.insert_job(&test_job("v_pub_1")).unwrap();

        assert!(store.mark_finalized("v_pub_1").unwrap());
        assert!(!store.mark_finalized("v_pub_1").unwrap());
        assert!(!store.mark_finalized("v_pub_1").unwrap());
    }

    #[test]
    fn test_observe_event_dedup() {
        let (store, _temp) = create_test_store();
        let fp = "post.publish.complete:v_pub_1:1700000000";

        assert!(store.observe_event(fp, Utc::now()).unwrap());
        assert!(!store.observe_event(fp, Utc::now()).unwrap());
        assert!(store
            .observe_event("post.publish.complete:v_pub_1:1700000001", Utc::now())
            .unwrap());
    }

    #[test]
    fn test_record_progress() {
        let (store, _temp) = create_test_store();
        store.insert_job(&test_job("v_pub_1")).unwrap();

        store.record_progress("v_pub_1", 512).unwrap();
        let job = store.get_job("v_pub_1").unwrap().unwrap();
        assert_eq!(job.bytes_transferred, 512);
    }

    #[test]
    fn test_set_visibility() {
        let (store, _temp) = create_test_store();
        store.insert_job(&test_job("v_pub_1")).unwrap();

        store.set_visibility("v_pub_1", Some(99), true).unwrap();
        let job = store.get_job("v_pub_1").unwrap().unwrap();
        assert!(job.publicly_available);
        assert_eq!(job.post_ids, vec![99]);

        store.set_visibility("v_pub_1", Some(99), false).unwrap();
        let job = store.get_job("v_pub_1").unwrap().unwrap();
        assert!(!job.publicly_available);
        assert_eq!(job.post_ids, vec![99]);
    }
}
