//! Orders and concatenates streamed fragments, and owns the
//! `complete`/`fail` terminal transitions since both need to flush the
//! chunk log under the same lock check.

use crate::domain::{Chunk, Job, JobStatus};
use crate::error::CoordinatorError;
use crate::jobs::lock::LockManager;
use crate::jobs::store::JobStore;
use crate::kv::{Keys, KvStore};
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

pub struct ChunkAggregator {
    store: Arc<dyn KvStore>,
    jobs: Arc<JobStore>,
    lock: Arc<LockManager>,
}

impl ChunkAggregator {
    pub fn new(store: Arc<dyn KvStore>, jobs: Arc<JobStore>, lock: Arc<LockManager>) -> Self {
        Self { store, jobs, lock }
    }

    #[instrument(skip(self, content, metrics))]
    pub async fn store_chunk(
        &self,
        job_id: &str,
        node_id: &str,
        index: u64,
        content: String,
        metrics: Option<Value>,
    ) -> Result<u64, CoordinatorError> {
        self.lock.require_holder(job_id, node_id).await?;

        let mut job = self.jobs.require(job_id).await?;
        let chunk = Chunk {
            index,
            content,
            metrics: metrics.clone(),
            timestamp: crate::identity::now_ms(),
        };
        let chunk_json =
            serde_json::to_string(&chunk).map_err(|e| CoordinatorError::Internal(e.into()))?;

        // Duplicate indices from the same worker overwrite the prior chunk.
        self.store
            .hash_set(
                &Keys::job_chunks(job_id),
                &[(index.to_string().as_str(), chunk_json.as_str())],
            )
            .await
            .map_err(CoordinatorError::Internal)?;

        job.last_chunk_at = Some(chunk.timestamp);
        job.chunk_count = job.chunk_count.max(index as i64 + 1);
        job.last_metrics = metrics;
        job.updated_at = chunk.timestamp;
        self.jobs.write(&job).await?;

        Ok(index)
    }

    /// Chunks for a job, sorted ascending by index — ordering is restored
    /// at read time, never assumed from arrival order.
    pub async fn read_ordered(&self, job_id: &str) -> Result<Vec<Chunk>, CoordinatorError> {
        let fields = self
            .store
            .hash_get_all(&Keys::job_chunks(job_id))
            .await
            .map_err(CoordinatorError::Internal)?;
        let mut chunks: Vec<Chunk> = fields
            .values()
            .filter_map(|v| serde_json::from_str(v).ok())
            .collect();
        chunks.sort_by_key(|c| c.index);
        Ok(chunks)
    }

    pub async fn concatenated(&self, job_id: &str) -> Result<String, CoordinatorError> {
        let chunks = self.read_ordered(job_id).await?;
        Ok(chunks.into_iter().map(|c| c.content).collect())
    }

    /// `complete` is authoritative; a chunk-level final-ness marker from
    /// the caller is advisory only and never trusted over this call.
    #[instrument(skip(self, final_output))]
    pub async fn complete(
        &self,
        job_id: &str,
        node_id: &str,
        final_output: Option<String>,
    ) -> Result<Job, CoordinatorError> {
        self.lock.require_holder(job_id, node_id).await?;
        let mut job = self.jobs.require(job_id).await?;

        let result = match final_output {
            Some(output) => output,
            None => self.concatenated(job_id).await?,
        };

        let now = crate::identity::now_ms();
        let from_status = job.status;
        job.status = JobStatus::Completed;
        job.result = Some(result);
        job.updated_at = now;

        self.jobs
            .move_queue(job_id, from_status, JobStatus::Completed, now as f64)
            .await?;
        self.jobs.write(&job).await?;
        self.jobs.unmark_running(job_id).await?;
        self.lock.release(job_id, node_id).await?;
        self.store
            .hash_delete_key(&Keys::job_chunks(job_id))
            .await
            .map_err(CoordinatorError::Internal)?;

        Ok(job)
    }

    #[instrument(skip(self))]
    pub async fn fail(
        &self,
        job_id: &str,
        node_id: &str,
        reason: String,
    ) -> Result<Job, CoordinatorError> {
        self.lock.require_holder(job_id, node_id).await?;
        let mut job = self.jobs.require(job_id).await?;

        let now = crate::identity::now_ms();
        let from_status = job.status;
        job.status = JobStatus::Failed;
        job.failure_reason = Some(reason);
        job.updated_at = now;

        self.jobs
            .move_queue(job_id, from_status, JobStatus::Failed, now as f64)
            .await?;
        self.jobs.write(&job).await?;
        self.jobs.unmark_running(job_id).await?;
        self.lock.release(job_id, node_id).await?;
        self.store
            .hash_delete_key(&Keys::job_chunks(job_id))
            .await
            .map_err(CoordinatorError::Internal)?;

        Ok(job)
    }
}
