//! Scheduler: pulls the highest-priority-oldest pending jobs and
//! atomically transfers them to a polling node under a lease.

use crate::domain::{Job, JobStatus};
use crate::error::CoordinatorError;
use crate::jobs::lock::{LockManager, DEFAULT_LEASE_TTL};
use crate::jobs::store::JobStore;
use std::sync::Arc;
use tracing::{debug, instrument};

pub struct Scheduler {
    jobs: Arc<JobStore>,
    lock: Arc<LockManager>,
}

impl Scheduler {
    pub fn new(jobs: Arc<JobStore>, lock: Arc<LockManager>) -> Self {
        Self { jobs, lock }
    }

    /// Assigns up to `max_jobs` pending jobs to `node_id`. Returns fewer
    /// than requested if the queue runs dry or races are lost — never an
    /// error for "not enough work".
    #[instrument(skip(self))]
    pub async fn assign(&self, node_id: &str, max_jobs: usize) -> Result<Vec<Job>, CoordinatorError> {
        if max_jobs == 0 {
            return Ok(Vec::new());
        }

        // Pull a generous candidate window: some candidates will lose the
        // lock race to other concurrent pollers, so request more ids than
        // jobs actually needed.
        let candidate_ids = self.jobs.queue_range("pending", max_jobs * 4 + 8).await?;

        let mut assigned = Vec::with_capacity(max_jobs);
        for job_id in candidate_ids {
            if assigned.len() >= max_jobs {
                break;
            }

            let acquired = self.lock.acquire(&job_id, node_id, DEFAULT_LEASE_TTL).await?;
            if !acquired {
                debug!(job_id, "lost assignment race, skipping");
                continue;
            }

            let Some(mut job) = self.jobs.get(&job_id).await? else {
                // Job vanished between the range scan and the lock win
                // (e.g. cancelled concurrently); release the stray lock.
                self.lock.release(&job_id, node_id).await?;
                continue;
            };

            if job.status != JobStatus::Pending {
                // Already moved on by another path; don't double-assign.
                self.lock.release(&job_id, node_id).await?;
                continue;
            }

            let now = crate::identity::now_ms();
            job.status = JobStatus::Assigned;
            job.assigned_to = Some(node_id.to_string());
            job.assigned_at = Some(now);
            job.updated_at = now;

            self.jobs
                .move_queue(&job_id, JobStatus::Pending, JobStatus::Assigned, now as f64)
                .await?;
            self.jobs.write(&job).await?;

            assigned.push(job);
        }

        Ok(assigned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::store::JobStore;
    use crate::kv::MemoryStore;
    use serde_json::json;

    fn sample_job(id: &str, priority: i64, created_at: i64) -> Job {
        Job {
            id: id.to_string(),
            prompt: "hi".into(),
            model: "llama3.2:3b".into(),
            options: json!({}),
            priority,
            max_tokens: 1000,
            temperature: 0.7,
            user_id: "u1".into(),
            status: JobStatus::Pending,
            created_at,
            updated_at: created_at,
            assigned_to: None,
            assigned_at: None,
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
    async fn assigns_highest_priority_first() {
        let kv = Arc::new(MemoryStore::new());
        let jobs = Arc::new(JobStore::new(kv.clone()));
        let lock = Arc::new(LockManager::new(kv));
        jobs.create(&sample_job("low", 0, 0)).await.unwrap();
        jobs.create(&sample_job("high", 5, 1)).await.unwrap();

        let scheduler = Scheduler::new(jobs, lock);
        let assigned = scheduler.assign("nodeA", 1).await.unwrap();
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].id, "high");
    }

    #[tokio::test]
    async fn returns_fewer_than_requested_when_queue_runs_dry() {
        let kv = Arc::new(MemoryStore::new());
        let jobs = Arc::new(JobStore::new(kv.clone()));
        let lock = Arc::new(LockManager::new(kv));
        jobs.create(&sample_job("only", 0, 0)).await.unwrap();

        let scheduler = Scheduler::new(jobs, lock);
        let assigned = scheduler.assign("nodeA", 5).await.unwrap();
        assert_eq!(assigned.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_assign_only_one_winner() {
        let kv = Arc::new(MemoryStore::new());
        let jobs = Arc::new(JobStore::new(kv.clone()));
        let lock = Arc::new(LockManager::new(kv));
        jobs.create(&sample_job("j1", 0, 0)).await.unwrap();

        let scheduler_a = Scheduler::new(jobs.clone(), lock.clone());
        let scheduler_b = Scheduler::new(jobs, lock);

        let a = scheduler_a.assign("nodeA", 1).await.unwrap();
        let b = scheduler_b.assign("nodeB", 1).await.unwrap();
        assert_eq!(a.len() + b.len(), 1);
    }
}
