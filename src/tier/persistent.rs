//! Persistent tier: thin client over a shared, TTL-capable key/value store.
//!
//! The store itself is an external collaborator behind the [`KvStore`]
//! trait (Redis or anything with get / set-with-ttl / set-if-absent
//! semantics). This client adds the two guarantees the orchestrator relies
//! on: every call carries an explicit timeout, and every failure mode
//! surfaces as a typed [`InfraError`], never a panic or an indefinite
//! block.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compute::Embedding;
use crate::error::InfraError;
use crate::key::CacheKey;

/// Minimal contract a shared store must satisfy.
///
/// `try_lock` is set-if-absent with a lease TTL; `unlock` deletes the lease.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, InfraError>;

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), InfraError>;

    /// Returns `true` if the lease was granted to this caller.
    async fn try_lock(&self, key: &str, lease: Duration) -> Result<bool, InfraError>;

    async fn unlock(&self, key: &str) -> Result<(), InfraError>;
}

/// Wire format of one cached entry.
///
/// Entries are immutable: replaced wholesale or expired, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    /// The cached vector.
    pub vector: Embedding,

    /// Unix seconds at which the entry was written.
    pub stored_at: u64,
}

impl StoredEntry {
    pub fn new(vector: Embedding) -> Self {
        let stored_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self { vector, stored_at }
    }

    fn encode(&self) -> Result<Bytes, InfraError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| InfraError::Codec(e.to_string()))
    }

    fn decode(data: &[u8]) -> Result<Self, InfraError> {
        serde_json::from_slice(data).map_err(|e| InfraError::Codec(e.to_string()))
    }
}

/// Timeout- and codec-aware client for the shared store.
pub struct PersistentTier {
    store: Arc<dyn KvStore>,
    op_timeout: Duration,
    entry_ttl: Duration,
}

impl PersistentTier {
    pub fn new(store: Arc<dyn KvStore>, op_timeout: Duration, entry_ttl: Duration) -> Self {
        Self {
            store,
            op_timeout,
            entry_ttl,
        }
    }

    async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, InfraError>>,
    ) -> Result<T, InfraError> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(InfraError::Timeout(self.op_timeout)),
        }
    }

    /// Fetch an entry. `Ok(None)` means absent (or expired), which is not
    /// an error, just a future recompute.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<StoredEntry>, InfraError> {
        let raw = self
            .with_timeout(self.store.get(&key.storage_key()))
            .await?;
        match raw {
            Some(data) => {
                let entry = StoredEntry::decode(&data)?;
                debug!(key = %key, dims = entry.vector.len(), "Persistent tier hit");
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /// Store an entry under the configured TTL.
    pub async fn put(&self, key: &CacheKey, entry: &StoredEntry) -> Result<(), InfraError> {
        let data = entry.encode()?;
        self.with_timeout(
            self.store
                .set(&key.storage_key(), data, self.entry_ttl),
        )
        .await?;
        debug!(key = %key, ttl_secs = self.entry_ttl.as_secs(), "Wrote entry to persistent tier");
        Ok(())
    }

    /// Attempt to take the stampede lease for a key.
    pub async fn try_lock(&self, key: &CacheKey, lease: Duration) -> Result<bool, InfraError> {
        self.with_timeout(self.store.try_lock(&key.lock_key(), lease))
            .await
    }

    /// Drop the stampede lease for a key.
    pub async fn unlock(&self, key: &CacheKey) -> Result<(), InfraError> {
        self.with_timeout(self.store.unlock(&key.lock_key())).await
    }
}
