//! Domain entities: `Node`, `Job`, `Chunk` and their closed status enums.
//!
//! These are plain serde-derived records with no store-specific logic;
//! `kv` and `jobs`/`registry` own the mapping to and from the persisted
//! hash/sorted-set representation the coordinator persists.

mod chunk;
mod job;
mod node;

pub use chunk::Chunk;
pub use job::{Job, JobStatus};
pub use node::{Node, NodeStatus};
