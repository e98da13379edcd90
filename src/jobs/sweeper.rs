//! Heartbeats and the timeout sweep: the two paths that keep the
//! "assigned" queue honest when a worker goes quiet without telling anyone.

use crate::domain::{Job, JobStatus};
use crate::error::CoordinatorError;
use crate::jobs::lock::{LockManager, DEFAULT_LEASE_TTL};
use crate::jobs::store::JobStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// No heartbeat for this long and a job is considered abandoned.
pub const HEARTBEAT_STALE_AFTER: Duration = Duration::from_secs(60);

pub struct Sweeper {
    jobs: Arc<JobStore>,
    lock: Arc<LockManager>,
}

impl Sweeper {
    pub fn new(jobs: Arc<JobStore>, lock: Arc<LockManager>) -> Self {
        Self { jobs, lock }
    }

    /// Proves the holding node is alive, extends its lease, and promotes
    /// `assigned` jobs to `running` on their first beat.
    #[instrument(skip(self))]
    pub async fn heartbeat(&self, job_id: &str, node_id: &str) -> Result<Job, CoordinatorError> {
        self.lock.require_holder(job_id, node_id).await?;
        self.lock.extend(job_id, node_id, DEFAULT_LEASE_TTL).await?;

        let mut job = self.jobs.require(job_id).await?;
        let now = crate::identity::now_ms();

        if job.status == JobStatus::Assigned {
            job.status = JobStatus::Running;
            job.started_at = Some(now);
            // Running still lives in the `assigned` queue, so no move_queue.
            self.jobs.mark_running(job_id).await?;
        }
        job.last_heartbeat = Some(now);
        job.updated_at = now;
        self.jobs.write(&job).await?;

        Ok(job)
    }

    /// Scans the `assigned` queue for jobs whose lease has silently
    /// expired or whose heartbeat has gone stale, and requeues them as
    /// `pending` with a fresh score so other workers can pick them up.
    /// Returns the reclaimed job ids.
    #[instrument(skip(self))]
    pub async fn sweep(&self, stale_after: Duration) -> Result<Vec<String>, CoordinatorError> {
        let ids = self.jobs.queue_range("assigned", usize::MAX).await?;
        let now = crate::identity::now_ms();
        let stale_ms = stale_after.as_millis() as i64;

        let mut reclaimed = Vec::new();
        for id in ids {
            let Some(mut job) = self.jobs.get(&id).await? else {
                continue;
            };

            let lock_missing = self.lock.is_missing(&id).await?;
            let heartbeat_stale = match job.last_heartbeat {
                Some(last) => now - last > stale_ms,
                None => job.assigned_at.map(|at| now - at > stale_ms).unwrap_or(false),
            };

            if !lock_missing && !heartbeat_stale {
                continue;
            }

            warn!(job_id = %id, lock_missing, heartbeat_stale, "reclaiming abandoned job");

            let from_status = job.status;
            job.timeout_reason = Some(if lock_missing {
                "lease expired".to_string()
            } else {
                "heartbeat timeout".to_string()
            });
            job.status = JobStatus::Pending;
            job.assigned_to = None;
            job.assigned_at = None;
            job.started_at = None;
            job.last_heartbeat = None;
            job.attempts += 1;
            job.updated_at = now;

            let score = Job::pending_score(job.priority, now);
            self.jobs.move_queue(&id, from_status, JobStatus::Pending, score).await?;
            self.jobs.write(&job).await?;
            self.jobs.unmark_running(&id).await?;
            self.lock.force_release(&id).await?;

            reclaimed.push(id);
        }

        if !reclaimed.is_empty() {
            info!(count = reclaimed.len(), "sweep reclaimed abandoned jobs");
        }
        Ok(reclaimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use serde_json::json;

    fn sample_job(id: &str) -> Job {
        Job {
            id: id.to_string(),
            prompt: "hi".into(),
            model: "llama3.2:3b".into(),
            options: json!({}),
            priority: 0,
            max_tokens: 1000,
            temperature: 0.7,
            user_id: "u1".into(),
            status: JobStatus::Assigned,
            created_at: 0,
            updated_at: 0,
            assigned_to: Some("nodeA".into()),
            assigned_at: Some(0),
            started_at: None,
            last_heartbeat: None,
            last_chunk_at: None,
            chunk_count: 0,
            last_metrics: None,
            result: None,
            failure_reason: None,
            attempts: 0,
            timeout_reason: None,
        }
    }

    #[tokio::test]
    async fn heartbeat_promotes_assigned_to_running_once() {
        let kv = Arc::new(MemoryStore::new());
        let jobs = Arc::new(JobStore::new(kv.clone()));
        let lock = Arc::new(LockManager::new(kv));
        jobs.create(&sample_job("j1")).await.unwrap();
        lock.acquire("j1", "nodeA", DEFAULT_LEASE_TTL).await.unwrap();

        let sweeper = Sweeper::new(jobs.clone(), lock);
        let job = sweeper.heartbeat("j1", "nodeA").await.unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.started_at.is_some());
        assert!(job.last_heartbeat.is_some());
        assert_eq!(jobs.queue_len("assigned").await.unwrap(), 1);
        assert_eq!(jobs.running_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sweep_ignores_jobs_with_live_lock_and_recent_heartbeat() {
        let kv = Arc::new(MemoryStore::new());
        let jobs = Arc::new(JobStore::new(kv.clone()));
        let lock = Arc::new(LockManager::new(kv));
        jobs.create(&sample_job("j1")).await.unwrap();
        lock.acquire("j1", "nodeA", DEFAULT_LEASE_TTL).await.unwrap();

        let sweeper = Sweeper::new(jobs.clone(), lock);
        sweeper.heartbeat("j1", "nodeA").await.unwrap();
        let reclaimed = sweeper.sweep(HEARTBEAT_STALE_AFTER).await.unwrap();
        assert!(reclaimed.is_empty());
    }

    #[tokio::test]
    async fn sweep_requeues_job_with_expired_lock() {
        let kv = Arc::new(MemoryStore::new());
        let jobs = Arc::new(JobStore::new(kv.clone()));
        let lock = Arc::new(LockManager::new(kv));
        jobs.create(&sample_job("j1")).await.unwrap();
        // No lock acquired at all: simulates a lease that has already expired.

        let sweeper = Sweeper::new(jobs.clone(), lock.clone());
        let reclaimed = sweeper.sweep(HEARTBEAT_STALE_AFTER).await.unwrap();
        assert_eq!(reclaimed, vec!["j1".to_string()]);

        let job = jobs.require("j1").await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 1);
        assert!(job.assigned_to.is_none());
        assert_eq!(jobs.queue_len("pending").await.unwrap(), 1);
        assert_eq!(jobs.queue_len("assigned").await.unwrap(), 0);
        assert!(lock.is_missing("j1").await.unwrap());
    }

    #[tokio::test]
    async fn sweep_requeues_job_with_stale_heartbeat() {
        let kv = Arc::new(MemoryStore::new());
        let jobs = Arc::new(JobStore::new(kv.clone()));
        let lock = Arc::new(LockManager::new(kv));
        let mut job = sample_job("j1");
        job.last_heartbeat = Some(crate::identity::now_ms() - 120_000);
        jobs.create(&job).await.unwrap();
        lock.acquire("j1", "nodeA", DEFAULT_LEASE_TTL).await.unwrap();

        let sweeper = Sweeper::new(jobs.clone(), lock.clone());
        let reclaimed = sweeper.sweep(HEARTBEAT_STALE_AFTER).await.unwrap();
        assert_eq!(reclaimed, vec!["j1".to_string()]);
        assert!(lock.is_missing("j1").await.unwrap());
    }
}
