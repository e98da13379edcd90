//! The single gate preventing two workers from corrupting the same
//! job's result. Every mutating chunk/heartbeat/complete/fail path calls
//! `check` first.

use crate::error::CoordinatorError;
use crate::kv::{Keys, KvStore};
use std::sync::Arc;
use std::time::Duration;

/// Default lease TTL.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(300);

pub struct LockManager {
    store: Arc<dyn KvStore>,
}

impl LockManager {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn acquire(
        &self,
        job_id: &str,
        node_id: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinatorError> {
        self.store
            .set_if_absent(&Keys::job_lock(job_id), node_id, Some(ttl))
            .await
            .map_err(CoordinatorError::Internal)
    }

    pub async fn check(&self, job_id: &str, node_id: &str) -> Result<bool, CoordinatorError> {
        let held_by = self
            .store
            .get(&Keys::job_lock(job_id))
            .await
            .map_err(CoordinatorError::Internal)?;
        Ok(held_by.as_deref() == Some(node_id))
    }

    pub async fn extend(
        &self,
        job_id: &str,
        node_id: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinatorError> {
        if !self.check(job_id, node_id).await? {
            return Ok(false);
        }
        self.store
            .expire(&Keys::job_lock(job_id), ttl)
            .await
            .map_err(CoordinatorError::Internal)
    }

    pub async fn release(&self, job_id: &str, node_id: &str) -> Result<bool, CoordinatorError> {
        self.store
            .compare_delete(&Keys::job_lock(job_id), node_id)
            .await
            .map_err(CoordinatorError::Internal)
    }

    /// Drop the lease regardless of who holds it. Reserved for the sweeper
    /// reclaiming a job from a node that has gone silent — nothing else
    /// should bypass the holder check in `release`.
    pub async fn force_release(&self, job_id: &str) -> Result<(), CoordinatorError> {
        self.store
            .delete(&Keys::job_lock(job_id))
            .await
            .map_err(CoordinatorError::Internal)?;
        Ok(())
    }

    /// `true` if the lock key is absent (TTL == -2), the sweeper's
    /// signal that a lease has expired without an explicit release.
    pub async fn is_missing(&self, job_id: &str) -> Result<bool, CoordinatorError> {
        let ttl = self
            .store
            .ttl(&Keys::job_lock(job_id))
            .await
            .map_err(CoordinatorError::Internal)?;
        Ok(ttl == crate::kv::TTL_MISSING)
    }

    /// Require that `node_id` currently holds the lock for `job_id`,
    /// surfacing `Forbidden` otherwise — the gate every mutating job
    /// operation passes through first.
    pub async fn require_holder(&self, job_id: &str, node_id: &str) -> Result<(), CoordinatorError> {
        if self.check(job_id, node_id).await? {
            Ok(())
        } else {
            Err(CoordinatorError::Forbidden(format!(
                "node {node_id} does not hold the lease for job {job_id}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;

    fn manager() -> LockManager {
        LockManager::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn only_one_acquire_succeeds() {
        let lock = manager();
        assert!(lock.acquire("j1", "nodeA", DEFAULT_LEASE_TTL).await.unwrap());
        assert!(!lock.acquire("j1", "nodeB", DEFAULT_LEASE_TTL).await.unwrap());
    }

    #[tokio::test]
    async fn release_is_holder_only() {
        let lock = manager();
        lock.acquire("j1", "nodeA", DEFAULT_LEASE_TTL).await.unwrap();
        assert!(!lock.release("j1", "nodeB").await.unwrap());
        assert!(lock.release("j1", "nodeA").await.unwrap());
        assert!(lock.is_missing("j1").await.unwrap());
    }

    #[tokio::test]
    async fn extend_requires_current_holder() {
        let lock = manager();
        lock.acquire("j1", "nodeA", DEFAULT_LEASE_TTL).await.unwrap();
        assert!(!lock.extend("j1", "nodeB", DEFAULT_LEASE_TTL).await.unwrap());
        assert!(lock.extend("j1", "nodeA", DEFAULT_LEASE_TTL).await.unwrap());
    }
}
