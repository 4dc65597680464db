//! In-process job store for single-binary deployments and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use vconv_models::{Job, JobId, JobStatus};

use crate::error::{QueueError, QueueResult};
use crate::store::{check_new_job, JobStore, MAX_RUNNING_PROGRESS};

/// Job store held in memory. Claims are serialized by a mutex, which gives
/// the same at-most-one guarantee as a skip-locked row claim.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    // Insertion order breaks created_at ties
    jobs: Mutex<Vec<Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }

    /// Apply a terminal transition to a processing job.
    async fn finish(
        &self,
        id: &JobId,
        to: JobStatus,
        apply: impl FnOnce(&mut Job),
    ) -> QueueResult<()> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == *id)
            .ok_or(QueueError::JobNotFound(*id))?;

        if !job.status.can_transition_to(to) {
            return Err(QueueError::invalid_transition(*id, job.status, to));
        }

        job.status = to;
        apply(job);
        job.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &Job) -> QueueResult<()> {
        check_new_job(job)?;

        let mut jobs = self.jobs.lock().await;
        if jobs.iter().any(|j| j.id == job.id) {
            return Err(QueueError::Duplicate(job.id));
        }
        jobs.push(job.clone());
        Ok(())
    }

    async fn claim_next(&self) -> QueueResult<Option<Job>> {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs
            .iter_mut()
            .filter(|j| j.status == JobStatus::Queued)
            .min_by_key(|j| j.created_at)
        else {
            return Ok(None);
        };

        job.status = JobStatus::Processing;
        job.progress = 0;
        job.error.clear();
        job.updated_at = Utc::now();
        Ok(Some(job.clone()))
    }

    async fn update_progress(&self, id: &JobId, progress: u8) -> QueueResult<()> {
        let progress = progress.min(MAX_RUNNING_PROGRESS);
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.iter_mut().find(|j| j.id == *id) {
            if job.status == JobStatus::Processing && progress > job.progress {
                job.progress = progress;
                job.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn complete(&self, id: &JobId, output_key: &str) -> QueueResult<()> {
        self.finish(id, JobStatus::Done, |job| {
            job.progress = 100;
            job.output_key = output_key.to_string();
            job.error.clear();
        })
        .await
    }

    async fn fail(&self, id: &JobId, error: &str) -> QueueResult<()> {
        self.finish(id, JobStatus::Failed, |job| {
            job.error = error.to_string();
        })
        .await
    }

    async fn get(&self, id: &JobId) -> QueueResult<Option<Job>> {
        let jobs = self.jobs.lock().await;
        Ok(jobs.iter().find(|j| j.id == *id).cloned())
    }

    async fn list_created_before(&self, cutoff: DateTime<Utc>) -> QueueResult<Vec<Job>> {
        let jobs = self.jobs.lock().await;
        let mut old: Vec<Job> = jobs
            .iter()
            .filter(|j| j.created_at < cutoff)
            .cloned()
            .collect();
        old.sort_by_key(|j| j.created_at);
        Ok(old)
    }

    async fn delete(&self, id: &JobId) -> QueueResult<bool> {
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|j| j.id != *id || j.status == JobStatus::Processing);
        Ok(jobs.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use vconv_models::Preset;

    fn queued(n: usize) -> Vec<Job> {
        let base = Utc::now() - chrono::Duration::minutes(10);
        (0..n)
            .map(|i| {
                let mut job = Job::new(Preset::P720, format!("inputs/{i}.mp4"), 0);
                job.created_at = base + chrono::Duration::seconds(i as i64);
                job.updated_at = job.created_at;
                job
            })
            .collect()
    }

    #[tokio::test]
    async fn test_claims_oldest_first() {
        let store = MemoryJobStore::new();
        let jobs = queued(3);
        // Insert newest first
        for job in jobs.iter().rev() {
            store.insert(job).await.unwrap();
        }

        let first = store.claim_next().await.unwrap().unwrap();
        assert_eq!(first.id, jobs[0].id);
        assert_eq!(first.status, JobStatus::Processing);
        assert_eq!(first.progress, 0);

        let second = store.claim_next().await.unwrap().unwrap();
        assert_eq!(second.id, jobs[1].id);
    }

    #[tokio::test]
    async fn test_empty_queue() {
        let store = MemoryJobStore::new();
        assert!(store.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lifecycle_to_done() {
        let store = MemoryJobStore::new();
        let job = queued(1).remove(0);
        store.insert(&job).await.unwrap();

        // Progress is ignored until claimed
        store.update_progress(&job.id, 10).await.unwrap();
        assert_eq!(store.get(&job.id).await.unwrap().unwrap().progress, 0);

        store.claim_next().await.unwrap().unwrap();
        store.update_progress(&job.id, 5).await.unwrap();
        store.update_progress(&job.id, 3).await.unwrap();
        assert_eq!(store.get(&job.id).await.unwrap().unwrap().progress, 5);

        store.update_progress(&job.id, 100).await.unwrap();
        assert_eq!(
            store.get(&job.id).await.unwrap().unwrap().progress,
            MAX_RUNNING_PROGRESS
        );

        store.complete(&job.id, &job.id.output_key()).await.unwrap();
        let done = store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Done);
        assert_eq!(done.progress, 100);
        assert_eq!(done.output_key, job.id.output_key());
        assert!(done.is_consistent());
        assert!(done.updated_at >= done.created_at);
    }

    #[tokio::test]
    async fn test_terminal_states_are_final() {
        let store = MemoryJobStore::new();
        let job = queued(1).remove(0);
        store.insert(&job).await.unwrap();

        // Not yet claimed
        assert!(matches!(
            store.complete(&job.id, "outputs/x.mp4").await,
            Err(QueueError::InvalidTransition { from: JobStatus::Queued, .. })
        ));

        store.claim_next().await.unwrap().unwrap();
        store.fail(&job.id, "ffmpeg_failed rc=1").await.unwrap();

        let failed = store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error, "ffmpeg_failed rc=1");
        assert!(failed.output_key.is_empty());
        assert!(failed.is_consistent());

        assert!(store.complete(&job.id, "outputs/x.mp4").await.is_err());
        assert!(store.fail(&job.id, "again").await.is_err());
        assert!(store.claim_next().await.unwrap().is_none());

        assert!(matches!(
            store.fail(&JobId::new(), "x").await,
            Err(QueueError::JobNotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_are_exclusive() {
        let store = Arc::new(MemoryJobStore::new());
        for job in queued(5) {
            store.insert(&job).await.unwrap();
        }

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.claim_next().await.unwrap() })
            })
            .collect();

        let mut claimed = Vec::new();
        for handle in handles {
            if let Some(job) = handle.await.unwrap() {
                claimed.push(job.id);
            }
        }

        let unique: HashSet<_> = claimed.iter().collect();
        assert_eq!(claimed.len(), 5);
        assert_eq!(unique.len(), 5);
    }

    #[tokio::test]
    async fn test_insert_rejects_non_queued_job() {
        let store = MemoryJobStore::new();

        let mut done = queued(1).remove(0);
        done.status = JobStatus::Done;
        assert!(matches!(
            store.insert(&done).await,
            Err(QueueError::NotQueued { .. })
        ));

        let mut with_output = queued(1).remove(0);
        with_output.output_key = with_output.id.output_key();
        assert!(matches!(
            store.insert(&with_output).await,
            Err(QueueError::NotQueued { .. })
        ));

        let mut with_progress = queued(1).remove(0);
        with_progress.progress = 40;
        assert!(store.insert(&with_progress).await.is_err());

        let mut with_error = queued(1).remove(0);
        with_error.error = "ffmpeg_failed rc=1".to_string();
        assert!(store.insert(&with_error).await.is_err());

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_id() {
        let store = MemoryJobStore::new();
        let job = queued(1).remove(0);

        store.insert(&job).await.unwrap();
        assert!(matches!(
            store.insert(&job).await,
            Err(QueueError::Duplicate(id)) if id == job.id
        ));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let store = MemoryJobStore::new();
        let jobs = queued(3);
        for job in jobs.iter().rev() {
            store.insert(job).await.unwrap();
        }

        let old = store.list_created_before(jobs[2].created_at).await.unwrap();
        let ids: Vec<_> = old.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![jobs[0].id, jobs[1].id]);

        assert!(store.delete(&jobs[1].id).await.unwrap());
        assert!(!store.delete(&jobs[1].id).await.unwrap());
        assert_eq!(store.len().await, 2);

        // The claimed job is protected until it finishes
        let claimed = store.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.id, jobs[0].id);
        assert!(!store.delete(&claimed.id).await.unwrap());
        store.fail(&claimed.id, "ffmpeg_failed rc=1").await.unwrap();
        assert!(store.delete(&claimed.id).await.unwrap());
        assert!(store.get(&claimed.id).await.unwrap().is_none());
    }
}
