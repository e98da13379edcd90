//! Per-job hash record plus queue membership across the four named
//! status classes.

use crate::domain::{Job, JobStatus};
use crate::error::CoordinatorError;
use crate::kv::{Keys, KvStore};
use std::sync::Arc;

pub struct JobStore {
    store: Arc<dyn KvStore>,
}

impl JobStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, job: &Job) -> Result<(), CoordinatorError> {
        self.write(job).await?;
        let score = Job::pending_score(job.priority, job.created_at);
        self.store
            .zadd(&Keys::queue(job.status.queue_name()), &job.id, score)
            .await
            .map_err(CoordinatorError::Internal)?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Job>, CoordinatorError> {
        let fields = self
            .store
            .hash_get_all(&Keys::job(id))
            .await
            .map_err(CoordinatorError::Internal)?;
        let Some(json) = fields.get("record") else {
            return Ok(None);
        };
        let job: Job = serde_json::from_str(json).map_err(|e| CoordinatorError::Internal(e.into()))?;
        Ok(Some(job))
    }

    pub async fn require(&self, id: &str) -> Result<Job, CoordinatorError> {
        self.get(id)
            .await?
            .ok_or_else(|| CoordinatorError::NotFound(format!("job {id} not found")))
    }

    /// Persist a job's current field state without touching queue
    /// membership. Callers that change `status` must additionally call
    /// `move_queue`.
    pub async fn write(&self, job: &Job) -> Result<(), CoordinatorError> {
        let json = serde_json::to_string(job).map_err(|e| CoordinatorError::Internal(e.into()))?;
        self.store
            .hash_set(&Keys::job(&job.id), &[("record", json.as_str())])
            .await
            .map_err(CoordinatorError::Internal)?;
        Ok(())
    }

    /// Move a job between named queues with an explicit score, keeping
    /// the one-queue-at-a-time invariant intact.
    pub async fn move_queue(
        &self,
        job_id: &str,
        from: JobStatus,
        to: JobStatus,
        score: f64,
    ) -> Result<(), CoordinatorError> {
        if from.queue_name() != to.queue_name() {
            self.store
                .zrem(&Keys::queue(from.queue_name()), job_id)
                .await
                .map_err(CoordinatorError::Internal)?;
            self.store
                .zadd(&Keys::queue(to.queue_name()), job_id, score)
                .await
                .map_err(CoordinatorError::Internal)?;
        }
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<(), CoordinatorError> {
        if let Some(job) = self.get(id).await? {
            self.store
                .zrem(&Keys::queue(job.status.queue_name()), id)
                .await
                .map_err(CoordinatorError::Internal)?;
        }
        self.store
            .hash_delete_key(&Keys::job(id))
            .await
            .map_err(CoordinatorError::Internal)?;
        self.store
            .hash_delete_key(&Keys::job_chunks(id))
            .await
            .map_err(CoordinatorError::Internal)?;
        self.store
            .delete(&Keys::job_lock(id))
            .await
            .map_err(CoordinatorError::Internal)?;
        self.unmark_running(id).await?;
        Ok(())
    }

    /// Oldest-first page of ids from a named queue (ascending score).
    pub async fn queue_range(&self, name: &str, limit: usize) -> Result<Vec<String>, CoordinatorError> {
        self.store
            .zrange(&Keys::queue(name), limit)
            .await
            .map_err(CoordinatorError::Internal)
    }

    pub async fn queue_len(&self, name: &str) -> Result<usize, CoordinatorError> {
        self.store
            .zcard(&Keys::queue(name))
            .await
            .map_err(CoordinatorError::Internal)
    }

    /// Tracks `running` as a set distinct from the `assigned` queue, so
    /// stats can report true concurrency rather than aliasing it to the
    /// assigned count.
    pub async fn mark_running(&self, job_id: &str) -> Result<(), CoordinatorError> {
        self.store
            .set_add(&Keys::running_jobs(), job_id)
            .await
            .map_err(CoordinatorError::Internal)
    }

    pub async fn unmark_running(&self, job_id: &str) -> Result<(), CoordinatorError> {
        self.store
            .set_remove(&Keys::running_jobs(), job_id)
            .await
            .map_err(CoordinatorError::Internal)
    }

    pub async fn running_count(&self) -> Result<usize, CoordinatorError> {
        Ok(self
            .store
            .set_members(&Keys::running_jobs())
            .await
            .map_err(CoordinatorError::Internal)?
            .len())
    }

    /// Ids in the `completed`/`failed` queues with a terminal timestamp
    /// older than `older_than_ms` (ago), for maintenance cleanup passes.
    pub async fn queue_older_than(
        &self,
        name: &str,
        older_than_ms: i64,
    ) -> Result<Vec<String>, CoordinatorError> {
        self.store
            .zrange_by_score(&Keys::queue(name), f64::MIN, older_than_ms as f64)
            .await
            .map_err(CoordinatorError::Internal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
    async fn priority_then_age_orders_pending_queue() {
        let store = JobStore::new(Arc::new(MemoryStore::new()));
        store.create(&sample_job("low", 0, 0)).await.unwrap();
        store.create(&sample_job("high", 5, 1)).await.unwrap();
        let ordered = store.queue_range("pending", 10).await.unwrap();
        assert_eq!(ordered, vec!["high".to_string(), "low".to_string()]);
    }

    #[tokio::test]
    async fn delete_removes_record_and_queue_membership() {
        let store = JobStore::new(Arc::new(MemoryStore::new()));
        store.create(&sample_job("j1", 0, 0)).await.unwrap();
        store.delete("j1").await.unwrap();
        assert!(store.get("j1").await.unwrap().is_none());
        assert_eq!(store.queue_len("pending").await.unwrap(), 0);
    }
}
