//! Cache orchestrator: the public API.
//!
//! Composes the memory tier, persistent tier, stampede guard, and
//! statistics tracker into single-item and batch `get_or_compute`. Ownership
//! is strictly one-directional: the orchestrator owns everything, the tiers
//! know nothing about each other, and the instance itself is caller-owned.
//! Construct it explicitly and inject it; there is no process-wide
//! singleton.
//!
//! Propagation policy: infrastructure faults in the caching layer are
//! always absorbed (requests succeed with more recomputation instead of
//! failing); key-derivation and compute faults are always surfaced. Once
//! the store has failed within a request, the rest of that request skips
//! persistence entirely (no lease, no write-back) so a hanging store costs
//! at most one timeout per request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::compute::{ComputeSource, Embedding};
use crate::config::{CacheConfig, ConfigError};
use crate::error::{CacheError, ComputeError, InfraError};
use crate::guard::{LockOutcome, StampedeGuard, StampedePolicy};
use crate::key::{CacheKey, KeyDeriver};
use crate::stats::{StatisticsTracker, StatsSnapshot};
use crate::tier::memory::MemoryTier;
use crate::tier::persistent::{KvStore, PersistentTier, StoredEntry};

/// Outcome of one pass over both tiers.
enum TierLookup {
    Hit(Embedding),
    Miss,
    /// The store failed on the lookup; persistence is off for the rest of
    /// this request.
    StoreDown,
}

/// Two-tier cache in front of a deterministic compute function.
pub struct CacheOrchestrator {
    deriver: KeyDeriver,
    memory: MemoryTier,
    persistent: Arc<PersistentTier>,
    guard: StampedeGuard,
    stats: StatisticsTracker,
    policy: StampedePolicy,
    /// Set while the persistent tier is misbehaving, so the healthy→degraded
    /// edge is logged once instead of per request.
    degraded: AtomicBool,
}

impl CacheOrchestrator {
    /// Build an orchestrator over an external store client.
    pub fn new(config: CacheConfig, store: Arc<dyn KvStore>) -> Result<Self, ConfigError> {
        config.validate()?;

        let persistent = Arc::new(PersistentTier::new(
            store,
            config.persistent.op_timeout(),
            config.persistent.entry_ttl(),
        ));
        let guard = StampedeGuard::new(Arc::clone(&persistent), config.lock.lease_ttl());

        Ok(Self {
            deriver: KeyDeriver::new(config.model_id.clone()),
            memory: MemoryTier::new(config.memory.capacity),
            persistent,
            guard,
            stats: StatisticsTracker::new(config.stats.cost_per_computation),
            policy: config.lock.policy,
            degraded: AtomicBool::new(false),
        })
    }

    /// Current counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Whether the last persistent-tier interaction failed.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Look up one input, computing it on a full miss.
    ///
    /// Never fails because of the persistent tier; only key-derivation and
    /// compute errors reach the caller.
    pub async fn get_or_compute(
        &self,
        input: &str,
        source: &dyn ComputeSource,
    ) -> Result<Embedding, CacheError> {
        let key = self.deriver.derive(input)?;

        match self.try_tiers(&key).await {
            TierLookup::Hit(vector) => return Ok(vector),
            TierLookup::Miss => {}
            // The store already cost this request one timeout; compute
            // without a lease and cache the result in memory only.
            TierLookup::StoreDown => return self.compute_unlocked(input, &key, source, false).await,
        }

        match self.guard.acquire(&key).await {
            LockOutcome::Acquired => match source.compute(input).await {
                Ok(vector) => {
                    self.store_computed(&key, &vector, true).await;
                    self.guard.release(&key).await;
                    self.stats.record_miss();
                    Ok(vector)
                }
                Err(err) => {
                    // Failures are never cached; the lease goes back
                    // immediately so the next caller can retry.
                    self.guard.release(&key).await;
                    Err(CacheError::Compute(err))
                }
            },
            LockOutcome::AlreadyHeld => {
                if let Some(wait) = self.policy.wait() {
                    sleep(wait).await;
                    match self.try_tiers(&key).await {
                        TierLookup::Hit(vector) => return Ok(vector),
                        TierLookup::Miss => {
                            debug!(key = %key, "Lock holder did not publish in time, computing directly");
                            self.compute_unlocked(input, &key, source, true).await
                        }
                        TierLookup::StoreDown => {
                            self.compute_unlocked(input, &key, source, false).await
                        }
                    }
                } else {
                    self.compute_unlocked(input, &key, source, true).await
                }
            }
            // A broken lock means a broken store; skip the write-back too.
            LockOutcome::Unavailable => self.compute_unlocked(input, &key, source, false).await,
        }
    }

    /// Look up a batch, computing all unresolved inputs in one batched call.
    ///
    /// Output order matches input order exactly. A failed batch compute
    /// fails the whole batch; items already resolved from the tiers are
    /// unaffected for future requests.
    pub async fn batch_get_or_compute(
        &self,
        inputs: &[String],
        source: &dyn ComputeSource,
    ) -> Result<Vec<Embedding>, CacheError> {
        let mut slots: Vec<Option<Embedding>> = vec![None; inputs.len()];
        let mut unresolved: Vec<(usize, CacheKey)> = Vec::new();
        let mut store_down = false;

        for (idx, input) in inputs.iter().enumerate() {
            let key = self.deriver.derive(input)?;

            // After the first store fault the remaining lookups stay in
            // memory, so the whole batch pays at most one timeout.
            if store_down {
                match self.memory.get(&key).await {
                    Some(vector) => {
                        self.stats.record_memory_hit();
                        slots[idx] = Some(vector);
                    }
                    None => unresolved.push((idx, key)),
                }
                continue;
            }

            match self.try_tiers(&key).await {
                TierLookup::Hit(vector) => slots[idx] = Some(vector),
                TierLookup::Miss => unresolved.push((idx, key)),
                TierLookup::StoreDown => {
                    store_down = true;
                    unresolved.push((idx, key));
                }
            }
        }

        if unresolved.is_empty() {
            return Ok(Self::collect_slots(slots));
        }

        debug!(
            total = inputs.len(),
            unresolved = unresolved.len(),
            store_down,
            "Batch partition complete"
        );

        // Take per-key leases up front; every exit path below releases the
        // leases actually acquired. With the store down there is nothing to
        // lease: everything goes straight to compute.
        let mut held: Vec<CacheKey> = Vec::new();
        let mut contended: Vec<(usize, CacheKey)> = Vec::new();
        let mut pending: Vec<(usize, CacheKey)> = Vec::new();

        if store_down {
            pending = unresolved;
        } else {
            for (idx, key) in unresolved {
                match self.guard.acquire(&key).await {
                    LockOutcome::Acquired => {
                        held.push(key);
                        pending.push((idx, key));
                    }
                    LockOutcome::AlreadyHeld if self.policy.wait().is_some() => {
                        contended.push((idx, key));
                    }
                    LockOutcome::AlreadyHeld | LockOutcome::Unavailable => {
                        pending.push((idx, key));
                    }
                }
            }
        }

        if !contended.is_empty() {
            // One bounded wait covers all contended keys, then each gets a
            // single re-lookup. Whatever is still missing is computed here,
            // duplicate work accepted.
            if let Some(wait) = self.policy.wait() {
                sleep(wait).await;
            }
            for (idx, key) in contended {
                match self.try_tiers(&key).await {
                    TierLookup::Hit(vector) => slots[idx] = Some(vector),
                    TierLookup::Miss => pending.push((idx, key)),
                    TierLookup::StoreDown => {
                        store_down = true;
                        pending.push((idx, key));
                    }
                }
            }
        }

        if !pending.is_empty() {
            let batch_inputs: Vec<String> = pending
                .iter()
                .map(|(idx, _)| inputs[*idx].clone())
                .collect();

            let values = match source.compute_batch(&batch_inputs).await {
                Ok(values) if values.len() == batch_inputs.len() => values,
                Ok(values) => {
                    self.release_all(&held).await;
                    return Err(CacheError::Compute(ComputeError::BatchShape {
                        expected: batch_inputs.len(),
                        got: values.len(),
                    }));
                }
                Err(err) => {
                    self.release_all(&held).await;
                    return Err(CacheError::Compute(err));
                }
            };

            for ((idx, key), vector) in pending.into_iter().zip(values) {
                self.store_computed(&key, &vector, !store_down).await;
                self.stats.record_miss();
                slots[idx] = Some(vector);
            }
        }

        self.release_all(&held).await;
        Ok(Self::collect_slots(slots))
    }

    /// Memory lookup, then persistent lookup with promotion. Records the
    /// hit on success; absorbs persistent-tier faults into
    /// [`TierLookup::StoreDown`].
    async fn try_tiers(&self, key: &CacheKey) -> TierLookup {
        if let Some(vector) = self.memory.get(key).await {
            self.stats.record_memory_hit();
            return TierLookup::Hit(vector);
        }

        match self.persistent.get(key).await {
            Ok(Some(entry)) => {
                self.memory.put(*key, entry.vector.clone()).await;
                debug!(key = %key, "Promoted persistent entry into memory tier");
                self.stats.record_persistent_hit();
                self.mark_store_healthy();
                TierLookup::Hit(entry.vector)
            }
            Ok(None) => {
                self.mark_store_healthy();
                TierLookup::Miss
            }
            Err(err) => {
                self.note_store_error(key, &err);
                TierLookup::StoreDown
            }
        }
    }

    /// Compute without holding the lease. `persist` is false once the store
    /// has already failed within this request.
    async fn compute_unlocked(
        &self,
        input: &str,
        key: &CacheKey,
        source: &dyn ComputeSource,
        persist: bool,
    ) -> Result<Embedding, CacheError> {
        let vector = source.compute(input).await?;
        self.store_computed(key, &vector, persist).await;
        self.stats.record_miss();
        Ok(vector)
    }

    /// Write-back after a successful compute: persistent first (best-effort,
    /// faults absorbed), then memory. With `persist` off only the memory
    /// tier is written; the entry reaches the store on a later healthy
    /// request.
    async fn store_computed(&self, key: &CacheKey, vector: &Embedding, persist: bool) {
        if persist {
            let entry = StoredEntry::new(vector.clone());
            match self.persistent.put(key, &entry).await {
                Ok(()) => self.mark_store_healthy(),
                Err(err) => self.note_store_error(key, &err),
            }
        }
        self.memory.put(*key, vector.clone()).await;
    }

    async fn release_all(&self, held: &[CacheKey]) {
        for key in held {
            self.guard.release(key).await;
        }
    }

    fn note_store_error(&self, key: &CacheKey, err: &InfraError) {
        self.stats.record_persistent_error();
        if !self.degraded.swap(true, Ordering::Relaxed) {
            warn!(key = %key, error = %err, "Persistent tier unavailable, entering degraded mode");
        } else {
            debug!(key = %key, error = %err, "Persistent tier still unavailable");
        }
    }

    fn mark_store_healthy(&self) {
        if self.degraded.swap(false, Ordering::Relaxed) {
            info!("Persistent tier recovered, leaving degraded mode");
        }
    }

    fn collect_slots(slots: Vec<Option<Embedding>>) -> Vec<Embedding> {
        slots
            .into_iter()
            .map(|slot| slot.expect("slot resolved by tier hit or batch compute"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::memory_store::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct FixedSource;

    #[async_trait]
    impl ComputeSource for FixedSource {
        async fn compute(&self, input: &str) -> Result<Embedding, ComputeError> {
            Ok(vec![input.len() as f32])
        }
        async fn compute_batch(&self, inputs: &[String]) -> Result<Vec<Embedding>, ComputeError> {
            Ok(inputs.iter().map(|i| vec![i.len() as f32]).collect())
        }
    }

    /// Returns the wrong number of values for any batch.
    struct MisshapenSource;

    #[async_trait]
    impl ComputeSource for MisshapenSource {
        async fn compute(&self, _input: &str) -> Result<Embedding, ComputeError> {
            Ok(vec![0.0])
        }
        async fn compute_batch(&self, _inputs: &[String]) -> Result<Vec<Embedding>, ComputeError> {
            Ok(vec![])
        }
    }

    fn orchestrator() -> CacheOrchestrator {
        CacheOrchestrator::new(CacheConfig::default(), Arc::new(InMemoryStore::new())).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut cfg = CacheConfig::default();
        cfg.memory.capacity = 0;
        assert!(CacheOrchestrator::new(cfg, Arc::new(InMemoryStore::new())).is_err());
    }

    #[tokio::test]
    async fn test_miss_then_memory_hit() {
        let cache = orchestrator();
        let v1 = cache.get_or_compute("hello", &FixedSource).await.unwrap();
        let v2 = cache.get_or_compute("hello", &FixedSource).await.unwrap();
        assert_eq!(v1, v2);

        let snap = cache.stats();
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.memory_hits, 1);
        assert_eq!(snap.total_requests, 2);
    }

    #[tokio::test]
    async fn test_batch_shape_mismatch_surfaces() {
        let cache = orchestrator();
        let inputs = vec!["a".to_string(), "b".to_string()];
        let err = cache
            .batch_get_or_compute(&inputs, &MisshapenSource)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CacheError::Compute(ComputeError::BatchShape { expected: 2, got: 0 })
        ));
    }

    #[tokio::test]
    async fn test_shape_error_releases_leases() {
        let cache = orchestrator();
        let inputs = vec!["a".to_string()];
        let _ = cache.batch_get_or_compute(&inputs, &MisshapenSource).await;

        // A retry must be able to take the lease again.
        let values = cache
            .batch_get_or_compute(&inputs, &FixedSource)
            .await
            .unwrap();
        assert_eq!(values, vec![vec![1.0]]);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let cache = orchestrator();
        let calls = AtomicUsize::new(0);

        struct Counting<'a>(&'a AtomicUsize);

        #[async_trait]
        impl ComputeSource for Counting<'_> {
            async fn compute(&self, _input: &str) -> Result<Embedding, ComputeError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(vec![0.0])
            }
            async fn compute_batch(
                &self,
                inputs: &[String],
            ) -> Result<Vec<Embedding>, ComputeError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(inputs.iter().map(|_| vec![0.0]).collect())
            }
        }

        let values = cache
            .batch_get_or_compute(&[], &Counting(&calls))
            .await
            .unwrap();
        assert!(values.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
