//! Key-value storage port and implementations
//!
//! The production store is a distributed key-value service with
//! read-after-write consistency only within a region, no multi-key
//! transactions, and no atomic counters. Everything the auth core
//! persists goes through [`KvStore`]; the concrete backend is chosen
//! by dependency injection at startup, never by feature detection in
//! handlers. [`MemoryKv`] mirrors the local-dev fallback and is what
//! the tests run against.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use time::OffsetDateTime;

use crate::error::{StoreError, StoreResult};
use crate::types::RateLimitRecord;

/// Storage port for the auth core.
///
/// Values are opaque strings (the core stores JSON-encoded records).
/// `put` with a TTL relies on the backend expiring the key; callers
/// must still treat a read of an expired-but-present record as absent.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;

    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Connectivity probe for readiness checks
    async fn ping(&self) -> StoreResult<()>;
}

// =============================================================================
// In-memory implementation (local dev and tests)
// =============================================================================

/// In-memory store with lazy TTL expiry
#[derive(Default)]
pub struct MemoryKv {
    entries: tokio::sync::RwLock<HashMap<String, (String, Option<OffsetDateTime>)>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries. Lazy reads already treat them as absent;
    /// this just reclaims memory and is safe to skip entirely.
    pub async fn purge_expired(&self) {
        let now = OffsetDateTime::now_utc();
        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, deadline)| deadline.map(|d| d > now).unwrap_or(true));
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).and_then(|(value, deadline)| {
            match deadline {
                // Expired entries read as absent; purge_expired reclaims them
                Some(d) if *d <= OffsetDateTime::now_utc() => None,
                _ => Some(value.clone()),
            }
        }))
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let deadline = ttl.map(|d| OffsetDateTime::now_utc() + d);
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (value.to_string(), deadline));
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

// =============================================================================
// Redis implementation (production)
// =============================================================================

/// Networked KV backed by Redis
#[derive(Clone)]
pub struct RedisKv {
    manager: redis::aio::ConnectionManager,
}

impl RedisKv {
    /// Connect and return a store handle. The connection manager
    /// reconnects on its own; callers keep one handle and clone it.
    pub async fn connect(redis_url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        let manager = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl KvStore for RedisKv {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut con = self.manager.clone();
        Ok(con.get(key).await?)
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let mut con = self.manager.clone();
        match ttl {
            Some(d) => con.set_ex::<_, _, ()>(key, value, d.as_secs()).await?,
            None => con.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut con = self.manager.clone();
        con.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut con = self.manager.clone();
        redis::cmd("PING").query_async::<()>(&mut con).await?;
        Ok(())
    }
}

// =============================================================================
// Windowed counters
// =============================================================================

/// Windowed-counter operations over any [`KvStore`].
///
/// These are plain read-modify-write: there is no compare-and-swap and
/// no atomic increment in the storage contract, so two concurrent
/// bumps of the same key can both observe N and both write N + 1. The
/// rate limiter accepts that undercount; do not paper over it here.
#[async_trait]
pub trait CounterStore: KvStore {
    async fn read_window(&self, key: &str) -> StoreResult<Option<RateLimitRecord>> {
        match self.get(key).await? {
            Some(raw) => {
                let record =
                    serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
                        key: key.to_string(),
                        reason: e.to_string(),
                    })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn write_window(
        &self,
        key: &str,
        record: &RateLimitRecord,
        ttl: Duration,
    ) -> StoreResult<()> {
        let raw = serde_json::to_string(record)
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        self.put(key, &raw, Some(ttl)).await
    }
}

impl<T: KvStore + ?Sized> CounterStore for T {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_put_get_delete() {
        let kv = MemoryKv::new();
        kv.put("k", "v", None).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("v"));

        kv.delete("k").await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), None);

        // Deleting an absent key is not an error
        kv.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_ttl_expiry_is_lazy() {
        let kv = MemoryKv::new();
        kv.put("gone", "x", Some(Duration::from_secs(0)))
            .await
            .unwrap();
        // Deadline is now; the entry must read as absent
        assert_eq!(kv.get("gone").await.unwrap(), None);

        kv.purge_expired().await;
        assert_eq!(kv.get("gone").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_overwrite_replaces_ttl() {
        let kv = MemoryKv::new();
        kv.put("k", "old", Some(Duration::from_secs(0)))
            .await
            .unwrap();
        kv.put("k", "new", None).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_counter_round_trip() {
        let kv = MemoryKv::new();
        assert!(kv.read_window("rl:x").await.unwrap().is_none());

        let record = RateLimitRecord {
            attempt_count: 3,
            window_start: 1_700_000_000,
        };
        kv.write_window("rl:x", &record, Duration::from_secs(60))
            .await
            .unwrap();

        let back = kv.read_window("rl:x").await.unwrap().unwrap();
        assert_eq!(back.attempt_count, 3);
        assert_eq!(back.window_start, 1_700_000_000);
    }

    #[tokio::test]
    async fn test_counter_corrupt_record_surfaces() {
        let kv = MemoryKv::new();
        kv.put("rl:bad", "not json", None).await.unwrap();
        let err = kv.read_window("rl:bad").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
