use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A bounded partial output, identified by a monotonically increasing
/// index within its job. The chunk log is ordered by `index` at read
/// time, not insertion order — chunks may arrive out of sequence under
/// worker retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub index: u64,
    pub content: String,
    pub metrics: Option<Value>,
    pub timestamp: i64,
}
