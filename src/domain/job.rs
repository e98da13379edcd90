use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of lifecycle states. Never a free-form string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Assigned,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// The named queue a job of this status belongs to. A job lives in
    /// exactly one queue at a time. `Running` shares the `assigned` queue
    /// with `Assigned`.
    pub fn queue_name(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Assigned | JobStatus::Running => "assigned",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub prompt: String,
    pub model: String,
    pub options: Value,
    pub priority: i64,
    pub max_tokens: i64,
    pub temperature: f64,
    pub user_id: String,
    pub status: JobStatus,
    pub created_at: i64,
    pub updated_at: i64,
    pub assigned_to: Option<String>,
    pub assigned_at: Option<i64>,
    pub started_at: Option<i64>,
    pub last_heartbeat: Option<i64>,
    pub last_chunk_at: Option<i64>,
    pub chunk_count: i64,
    pub last_metrics: Option<Value>,
    pub result: Option<String>,
    pub failure_reason: Option<String>,
    pub attempts: i64,
    pub timeout_reason: Option<String>,
}

impl Job {
    /// `score = -priority * 10^6 + createdAt_ms`.
    /// Ascending range scans then yield highest-priority-oldest-first.
    pub fn pending_score(priority: i64, created_at_ms: i64) -> f64 {
        (-priority * 1_000_000 + created_at_ms) as f64
    }
}
