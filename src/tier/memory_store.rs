//! Process-local [`KvStore`] with TTL and lease support.
//!
//! Stands in for the shared store in tests and in single-node deployments
//! that have nowhere to share. Expiry is lazy: an expired entry is dropped
//! the next time it is touched, which is exactly the visibility a TTL
//! contract promises.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;

use crate::error::InfraError;
use crate::tier::persistent::KvStore;

#[derive(Debug, Clone)]
struct StoredValue {
    data: Bytes,
    expires_at: Instant,
}

impl StoredValue {
    fn expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory TTL store. Value keys and lease keys share one map; the
/// caller-side key namespaces keep them disjoint.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, StoredValue>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries, for test assertions.
    pub async fn len(&self) -> usize {
        let mut entries = self.entries.lock().await;
        entries.retain(|_, v| !v.expired());
        entries.len()
    }
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, InfraError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(value) if !value.expired() => Ok(Some(value.data.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), InfraError> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            StoredValue {
                data: value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn try_lock(&self, key: &str, lease: Duration) -> Result<bool, InfraError> {
        let mut entries = self.entries.lock().await;
        if let Some(existing) = entries.get(key) {
            if !existing.expired() {
                return Ok(false);
            }
        }
        entries.insert(
            key.to_string(),
            StoredValue {
                data: Bytes::from_static(b"1"),
                expires_at: Instant::now() + lease,
            },
        );
        Ok(true)
    }

    async fn unlock(&self, key: &str) -> Result<(), InfraError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}
