use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A node's cached liveness hint. The authoritative predicate on read is
/// `now - last_seen_ms < ONLINE_WINDOW`; `status` just avoids recomputing
/// that on every listing when callers don't need it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Online,
    Offline,
}

/// A self-registered worker node, identified by a public-key fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub node_id: String,
    pub public_key: String,
    pub name: String,
    pub user_id: Option<String>,
    pub status: NodeStatus,
    pub last_seen: i64,
    pub is_public: bool,
    pub capabilities: Value,
    pub active_jobs: i64,
    pub max_concurrent_jobs: i64,
    pub claimed_at: Option<i64>,
}

impl Node {
    /// A node is considered live if it has
    /// been seen within the last 15 minutes, regardless of its cached status.
    pub const ONLINE_WINDOW_MS: i64 = 15 * 60 * 1000;

    pub fn is_online(&self, now_ms: i64) -> bool {
        now_ms - self.last_seen < Self::ONLINE_WINDOW_MS
    }
}
