use crate::config::CoordinatorConfig;
use crate::identity;
use crate::jobs::{ChunkAggregator, JobStore, LockManager, Scheduler, Sweeper};
use crate::kv::KvStore;
use crate::registry::NodeRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub kv: Arc<dyn KvStore>,
    pub config: Arc<CoordinatorConfig>,
    pub registry: Arc<NodeRegistry>,
    pub jobs: Arc<JobStore>,
    pub lock: Arc<LockManager>,
    pub scheduler: Arc<Scheduler>,
    pub chunks: Arc<ChunkAggregator>,
    pub sweeper: Arc<Sweeper>,
}

impl AppState {
    pub fn new(kv: Arc<dyn KvStore>, config: CoordinatorConfig) -> Self {
        let registry = Arc::new(NodeRegistry::new(kv.clone()));
        let jobs = Arc::new(JobStore::new(kv.clone()));
        let lock = Arc::new(LockManager::new(kv.clone()));
        let scheduler = Arc::new(Scheduler::new(jobs.clone(), lock.clone()));
        let chunks = Arc::new(ChunkAggregator::new(kv.clone(), jobs.clone(), lock.clone()));
        let sweeper = Arc::new(Sweeper::new(jobs.clone(), lock.clone()));

        Self {
            kv,
            config: Arc::new(config),
            registry,
            jobs,
            lock,
            scheduler,
            chunks,
            sweeper,
        }
    }

    pub fn now_ms(&self) -> i64 {
        identity::now_ms()
    }
}
