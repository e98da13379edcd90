//! The sole writer of node records. Every other component only reads
//! through `get`/`list_for_user`/`list_public`.

use crate::domain::{Node, NodeStatus};
use crate::error::CoordinatorError;
use crate::identity::{self, fingerprint, SignatureEnvelope, VerifiedNode};
use crate::kv::{Keys, KvStore};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Soft-TTL on a node record, refreshed on every authenticated update.
pub const NODE_SOFT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub struct NodeRegistry {
    store: Arc<dyn KvStore>,
}

impl NodeRegistry {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, public_key))]
    pub async fn claim(
        &self,
        public_key: &str,
        name: &str,
        user_id: &str,
    ) -> Result<Node, CoordinatorError> {
        let key_bytes = BASE64
            .decode(public_key)
            .map_err(|_| CoordinatorError::BadRequest("malformed public key".into()))?;
        let node_id = fingerprint(&key_bytes);
        let now = crate::identity::now_ms();

        let existing = self.get(&node_id).await?;
        let node = match existing {
            Some(mut existing) if existing.user_id.as_deref() == Some(user_id) => {
                existing.status = NodeStatus::Online;
                existing.last_seen = now;
                existing
            }
            Some(existing) if existing.user_id.is_some() => {
                warn!(node_id, "claim rejected: already bound to another user");
                return Err(CoordinatorError::Conflict(
                    "node fingerprint already claimed by another user".into(),
                ));
            }
            Some(mut existing) => {
                // Record exists (e.g. pinged before claim) but unowned.
                existing.user_id = Some(user_id.to_string());
                existing.status = NodeStatus::Online;
                existing.last_seen = now;
                existing.claimed_at = Some(now);
                existing
            }
            None => Node {
                node_id: node_id.clone(),
                public_key: public_key.to_string(),
                name: name.to_string(),
                user_id: Some(user_id.to_string()),
                status: NodeStatus::Online,
                last_seen: now,
                is_public: false,
                capabilities: Value::Object(Default::default()),
                active_jobs: 0,
                max_concurrent_jobs: 1,
                claimed_at: Some(now),
            },
        };

        self.put(&node).await?;
        self.store
            .set_add(&Keys::user_nodes(user_id), &node.node_id)
            .await?;

        info!(node_id = %node.node_id, "node claimed");
        Ok(node)
    }

    /// Verifies a signature envelope AND that the presented `publicKey`
    /// matches the one on file for `nodeId`. The signature alone only
    /// proves self-consistency (the caller holds *some* private key); a
    /// caller could otherwise name any `nodeId` it likes and sign with a
    /// key of its own choosing. Every node-authenticated job operation
    /// (poll/heartbeat/chunk/complete/fail) must route through this
    /// rather than `identity::verify` directly.
    pub async fn authenticate(
        &self,
        envelope: &SignatureEnvelope,
        now_ms: i64,
    ) -> Result<VerifiedNode, CoordinatorError> {
        let verified = identity::verify(envelope, now_ms)?;
        let node = self
            .get(&verified.node_id)
            .await?
            .ok_or_else(|| CoordinatorError::NotFound(format!("node {} not found", verified.node_id)))?;
        if node.public_key != verified.public_key {
            return Err(CoordinatorError::Unauthorized(
                "public key does not match the registered node".into(),
            ));
        }
        Ok(verified)
    }

    #[instrument(skip(self, public_key, extras))]
    pub async fn ping(
        &self,
        node_id: &str,
        public_key: &str,
        extras: Option<Value>,
    ) -> Result<Node, CoordinatorError> {
        let mut node = self
            .get(node_id)
            .await?
            .ok_or_else(|| CoordinatorError::NotFound(format!("node {node_id} not found")))?;

        if node.public_key != public_key {
            return Err(CoordinatorError::Unauthorized(
                "public key does not match claimed node".into(),
            ));
        }

        node.last_seen = crate::identity::now_ms();
        node.status = NodeStatus::Online;

        if let Some(extras) = extras.as_ref().and_then(|v| v.as_object()) {
            if let Some(caps) = extras.get("capabilities") {
                node.capabilities = caps.clone();
            }
            if let Some(active) = extras.get("activeJobs").and_then(|v| v.as_i64()) {
                node.active_jobs = active;
            }
            if let Some(max) = extras.get("maxConcurrentJobs").and_then(|v| v.as_i64()) {
                node.max_concurrent_jobs = max;
            }
        }

        self.put(&node).await?;
        Ok(node)
    }

    pub async fn set_visibility(
        &self,
        node_id: &str,
        user_id: &str,
        is_public: bool,
    ) -> Result<Node, CoordinatorError> {
        let mut node = self
            .get(node_id)
            .await?
            .ok_or_else(|| CoordinatorError::NotFound(format!("node {node_id} not found")))?;

        if node.user_id.as_deref() != Some(user_id) {
            return Err(CoordinatorError::Forbidden(
                "only the owning user may change node visibility".into(),
            ));
        }

        node.is_public = is_public;
        self.put(&node).await?;

        if is_public {
            self.store.set_add(&Keys::public_nodes(), node_id).await?;
        } else {
            self.store.set_remove(&Keys::public_nodes(), node_id).await?;
        }

        Ok(node)
    }

    pub async fn get(&self, node_id: &str) -> Result<Option<Node>, CoordinatorError> {
        let fields = self
            .store
            .hash_get_all(&Keys::node(node_id))
            .await
            .map_err(CoordinatorError::Internal)?;
        if fields.is_empty() {
            return Ok(None);
        }
        let json = fields
            .get("record")
            .ok_or_else(|| CoordinatorError::Internal(anyhow::anyhow!("node record corrupt")))?;
        let node: Node =
            serde_json::from_str(json).map_err(|e| CoordinatorError::Internal(e.into()))?;
        Ok(Some(node))
    }

    async fn put(&self, node: &Node) -> Result<(), CoordinatorError> {
        let json = serde_json::to_string(node).map_err(|e| CoordinatorError::Internal(e.into()))?;
        self.store
            .hash_set(&Keys::node(&node.node_id), &[("record", json.as_str())])
            .await
            .map_err(CoordinatorError::Internal)?;
        self.store
            .expire(&Keys::node(&node.node_id), NODE_SOFT_TTL)
            .await
            .map_err(CoordinatorError::Internal)?;
        Ok(())
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Node>, CoordinatorError> {
        let ids = self
            .store
            .set_members(&Keys::user_nodes(user_id))
            .await
            .map_err(CoordinatorError::Internal)?;
        let now = crate::identity::now_ms();
        let mut nodes = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(mut node) = self.get(&id).await? {
                Self::recompute_status(&mut node, now);
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    /// The stored `status` is only a cached hint; the computed
    /// `Node::is_online` predicate is authoritative on read.
    fn recompute_status(node: &mut Node, now_ms: i64) {
        node.status = if node.is_online(now_ms) {
            NodeStatus::Online
        } else {
            NodeStatus::Offline
        };
    }

    /// Returns public nodes (capped at `limit`) and the count of online
    /// nodes across the whole fleet, for aggregate display.
    pub async fn list_public(&self, limit: usize) -> Result<(Vec<Node>, usize), CoordinatorError> {
        let ids = self
            .store
            .set_members(&Keys::public_nodes())
            .await
            .map_err(CoordinatorError::Internal)?;
        let now = crate::identity::now_ms();
        let mut nodes = Vec::new();
        for id in ids.iter().take(limit) {
            if let Some(mut node) = self.get(id).await? {
                Self::recompute_status(&mut node, now);
                nodes.push(node);
            }
        }

        let all_node_keys = self
            .store
            .keys("node:*")
            .await
            .map_err(CoordinatorError::Internal)?;
        let mut total_online = 0;
        for key in all_node_keys {
            let node_id = key.trim_start_matches("node:");
            if let Some(node) = self.get(node_id).await? {
                if node.is_online(now) {
                    total_online += 1;
                }
            }
        }

        Ok((nodes, total_online))
    }

    /// Hard-removes nodes whose `last_seen` is older than `max_age`,
    /// along with their user-set/public-set memberships.
    #[instrument(skip(self))]
    pub async fn cleanup_inactive(&self, max_age: Duration) -> Result<usize, CoordinatorError> {
        let now = crate::identity::now_ms();
        let horizon = now - max_age.as_millis() as i64;

        let all_node_keys = self
            .store
            .keys("node:*")
            .await
            .map_err(CoordinatorError::Internal)?;

        let mut removed = 0;
        for key in all_node_keys {
            let node_id = key.trim_start_matches("node:").to_string();
            let Some(node) = self.get(&node_id).await? else {
                continue;
            };
            if node.last_seen < horizon {
                self.store
                    .hash_delete_key(&key)
                    .await
                    .map_err(CoordinatorError::Internal)?;
                if let Some(user_id) = &node.user_id {
                    self.store
                        .set_remove(&Keys::user_nodes(user_id), &node_id)
                        .await
                        .map_err(CoordinatorError::Internal)?;
                }
                self.store
                    .set_remove(&Keys::public_nodes(), &node_id)
                    .await
                    .map_err(CoordinatorError::Internal)?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "registry cleanup removed inactive nodes");
        }
        Ok(removed)
    }
}
