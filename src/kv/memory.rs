//! In-memory `KvStore` backend: the default for tests and local
//! development. Not shared across processes — see `RedisStore` for the
//! production backend.

use super::KvStore;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Inner {
    strings: HashMap<String, (String, Option<Instant>)>,
    hashes: HashMap<String, HashMap<String, String>>,
    /// member -> score, kept alongside a score-sorted index for range scans.
    zsets: HashMap<String, BTreeMap<OrderedScore, Vec<String>>>,
    zscores: HashMap<String, HashMap<String, f64>>,
    sets: HashMap<String, std::collections::HashSet<String>>,
}

/// `f64` wrapper giving sorted sets a total order for `BTreeMap` keys.
/// Scores in this crate are always finite (derived from priorities and
/// epoch millis), so `NaN` never occurs in practice.
#[derive(Debug, Clone, Copy, PartialEq)]
struct OrderedScore(f64);
impl Eq for OrderedScore {}
impl PartialOrd for OrderedScore {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for OrderedScore {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(std::cmp::Ordering::Equal)
    }
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn is_live(value: &(String, Option<Instant>)) -> bool {
        match value.1 {
            Some(deadline) => Instant::now() < deadline,
            None => true,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut guard = self.inner.lock().unwrap();
        if let Some(entry) = guard.strings.get(key) {
            if Self::is_live(entry) {
                return Ok(Some(entry.0.clone()));
            }
            guard.strings.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> anyhow::Result<()> {
        let deadline = ttl.map(|d| Instant::now() + d);
        self.inner
            .lock()
            .unwrap()
            .strings
            .insert(key.to_string(), (value.to_string(), deadline));
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> anyhow::Result<bool> {
        let mut guard = self.inner.lock().unwrap();
        if let Some(entry) = guard.strings.get(key) {
            if Self::is_live(entry) {
                return Ok(false);
            }
        }
        let deadline = ttl.map(|d| Instant::now() + d);
        guard
            .strings
            .insert(key.to_string(), (value.to_string(), deadline));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.inner.lock().unwrap().strings.remove(key).is_some())
    }

    async fn compare_delete(&self, key: &str, expected: &str) -> anyhow::Result<bool> {
        let mut guard = self.inner.lock().unwrap();
        let matches = guard
            .strings
            .get(key)
            .map(|entry| Self::is_live(entry) && entry.0 == expected)
            .unwrap_or(false);
        if matches {
            guard.strings.remove(key);
        }
        Ok(matches)
    }

    async fn ttl(&self, key: &str) -> anyhow::Result<i64> {
        let guard = self.inner.lock().unwrap();
        match guard.strings.get(key) {
            None => Ok(super::TTL_MISSING),
            Some((_, None)) => Ok(super::TTL_NO_EXPIRY),
            Some((_, Some(deadline))) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    Ok(super::TTL_MISSING)
                } else {
                    Ok(remaining.as_secs() as i64)
                }
            }
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> anyhow::Result<bool> {
        let mut guard = self.inner.lock().unwrap();
        if let Some(entry) = guard.strings.get_mut(key) {
            if Self::is_live(entry) {
                entry.1 = Some(Instant::now() + ttl);
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn hash_set(&self, key: &str, fields: &[(&str, &str)]) -> anyhow::Result<()> {
        let mut guard = self.inner.lock().unwrap();
        let hash = guard.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert(field.to_string(), value.to_string());
        }
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> anyhow::Result<HashMap<String, String>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .hashes
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn hash_delete_key(&self, key: &str) -> anyhow::Result<()> {
        self.inner.lock().unwrap().hashes.remove(key);
        Ok(())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> anyhow::Result<()> {
        let mut guard = self.inner.lock().unwrap();
        // Remove any existing entry for this member first so re-adding
        // with a new score doesn't leave a stale bucket behind.
        if let Some(old_score) = guard
            .zscores
            .get(key)
            .and_then(|scores| scores.get(member))
            .copied()
        {
            if let Some(bucket) = guard
                .zsets
                .get_mut(key)
                .and_then(|tree| tree.get_mut(&OrderedScore(old_score)))
            {
                bucket.retain(|m| m != member);
            }
        }
        guard
            .zsets
            .entry(key.to_string())
            .or_default()
            .entry(OrderedScore(score))
            .or_default()
            .push(member.to_string());
        guard
            .zscores
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> anyhow::Result<()> {
        let mut guard = self.inner.lock().unwrap();
        if let Some(score) = guard
            .zscores
            .get_mut(key)
            .and_then(|scores| scores.remove(member))
        {
            if let Some(bucket) = guard
                .zsets
                .get_mut(key)
                .and_then(|tree| tree.get_mut(&OrderedScore(score)))
            {
                bucket.retain(|m| m != member);
            }
        }
        Ok(())
    }

    async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> anyhow::Result<Vec<String>> {
        let guard = self.inner.lock().unwrap();
        let mut out = Vec::new();
        if let Some(tree) = guard.zsets.get(key) {
            for (score, members) in tree.range(OrderedScore(min)..=OrderedScore(max)) {
                let _ = score;
                out.extend(members.iter().cloned());
            }
        }
        Ok(out)
    }

    async fn zrange(&self, key: &str, limit: usize) -> anyhow::Result<Vec<String>> {
        let guard = self.inner.lock().unwrap();
        let mut out = Vec::new();
        if let Some(tree) = guard.zsets.get(key) {
            'outer: for members in tree.values() {
                for member in members {
                    out.push(member.clone());
                    if out.len() >= limit {
                        break 'outer;
                    }
                }
            }
        }
        Ok(out)
    }

    async fn zcard(&self, key: &str) -> anyhow::Result<usize> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .zscores
            .get(key)
            .map(|m| m.len())
            .unwrap_or(0))
    }

    async fn set_add(&self, key: &str, member: &str) -> anyhow::Result<()> {
        self.inner
            .lock()
            .unwrap()
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> anyhow::Result<()> {
        if let Some(set) = self.inner.lock().unwrap().sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn keys(&self, pattern: &str) -> anyhow::Result<Vec<String>> {
        let prefix = pattern.trim_end_matches('*');
        let guard = self.inner.lock().unwrap();
        Ok(guard
            .strings
            .keys()
            .chain(guard.hashes.keys())
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_if_absent_is_exclusive() {
        let store = MemoryStore::new();
        assert!(store.set_if_absent("k", "a", None).await.unwrap());
        assert!(!store.set_if_absent("k", "b", None).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn compare_delete_only_matches_holder() {
        let store = MemoryStore::new();
        store.set("lock", "nodeA", None).await.unwrap();
        assert!(!store.compare_delete("lock", "nodeB").await.unwrap());
        assert!(store.compare_delete("lock", "nodeA").await.unwrap());
        assert_eq!(store.get("lock").await.unwrap(), None);
    }

    #[tokio::test]
    async fn zrange_respects_score_order() {
        let store = MemoryStore::new();
        store.zadd("q", "high", -5_000_000.0).await.unwrap();
        store.zadd("q", "low", 0.0).await.unwrap();
        let ordered = store.zrange("q", 10).await.unwrap();
        assert_eq!(ordered, vec!["high".to_string(), "low".to_string()]);
    }

    #[tokio::test]
    async fn expired_key_reads_as_missing() {
        let store = MemoryStore::new();
        store
            .set("temp", "v", Some(Duration::from_millis(1)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.get("temp").await.unwrap(), None);
        assert_eq!(store.ttl("temp").await.unwrap(), super::super::TTL_MISSING);
    }
}
