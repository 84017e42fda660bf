//! Stampede control: a short-lived distributed lock per missing key.
//!
//! The lease lives in the persistent store, so it serializes recomputation
//! across process boundaries (all replicas share one store). It is
//! self-expiring rather than heartbeat-renewed: a crashed holder blocks a
//! key for at most one lease TTL.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::key::CacheKey;
use crate::tier::persistent::PersistentTier;

/// Result of a lock acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// This caller holds the lease and should compute.
    Acquired,
    /// Another caller is computing this key right now.
    AlreadyHeld,
    /// The store is unreachable; locking is off the table for this request.
    Unavailable,
}

/// What a caller does when the lock is already held.
///
/// A configured trade-off, never inferred: waiting trades latency for
/// deduplicated work, computing directly trades duplicate cost for latency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StampedePolicy {
    /// Wait briefly, then retry the full tier lookup once before computing.
    WaitRetry { wait_ms: u64 },
    /// Compute immediately, accepting duplicate work.
    ComputeDirect,
}

impl StampedePolicy {
    /// Wait duration, if this policy waits at all.
    pub fn wait(&self) -> Option<Duration> {
        match self {
            StampedePolicy::WaitRetry { wait_ms } => Some(Duration::from_millis(*wait_ms)),
            StampedePolicy::ComputeDirect => None,
        }
    }
}

impl Default for StampedePolicy {
    fn default() -> Self {
        StampedePolicy::WaitRetry { wait_ms: 150 }
    }
}

/// Wraps the persistent tier's lease primitives into acquire/release with
/// degraded-mode semantics.
pub struct StampedeGuard {
    tier: Arc<PersistentTier>,
    lease_ttl: Duration,
}

impl StampedeGuard {
    pub fn new(tier: Arc<PersistentTier>, lease_ttl: Duration) -> Self {
        Self { tier, lease_ttl }
    }

    /// Try to take the lease for a key.
    ///
    /// Infra errors are folded into [`LockOutcome::Unavailable`] here: the
    /// orchestrator treats a broken lock exactly like a missing one and
    /// falls back to direct compute.
    pub async fn acquire(&self, key: &CacheKey) -> LockOutcome {
        match self.tier.try_lock(key, self.lease_ttl).await {
            Ok(true) => {
                debug!(key = %key, lease_secs = self.lease_ttl.as_secs(), "Acquired stampede lease");
                LockOutcome::Acquired
            }
            Ok(false) => LockOutcome::AlreadyHeld,
            Err(err) => {
                debug!(key = %key, error = %err, "Lock acquisition failed, treating as unavailable");
                LockOutcome::Unavailable
            }
        }
    }

    /// Release the lease. Best-effort: on failure the lease expires on its
    /// own, which is the safety net the TTL exists for.
    pub async fn release(&self, key: &CacheKey) {
        if let Err(err) = self.tier.unlock(key).await {
            warn!(key = %key, error = %err, "Failed to release stampede lease, will self-expire");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::memory_store::InMemoryStore;

    fn guard() -> StampedeGuard {
        let tier = Arc::new(PersistentTier::new(
            Arc::new(InMemoryStore::new()),
            Duration::from_millis(250),
            Duration::from_secs(60),
        ));
        StampedeGuard::new(tier, Duration::from_secs(5))
    }

    fn key(input: &str) -> CacheKey {
        crate::key::KeyDeriver::new("m").derive(input).unwrap()
    }

    #[tokio::test]
    async fn test_second_acquire_sees_already_held() {
        let guard = guard();
        let k = key("contended");

        assert_eq!(guard.acquire(&k).await, LockOutcome::Acquired);
        assert_eq!(guard.acquire(&k).await, LockOutcome::AlreadyHeld);

        guard.release(&k).await;
        assert_eq!(guard.acquire(&k).await, LockOutcome::Acquired);
    }

    #[tokio::test]
    async fn test_independent_keys_do_not_contend() {
        let guard = guard();
        assert_eq!(guard.acquire(&key("a")).await, LockOutcome::Acquired);
        assert_eq!(guard.acquire(&key("b")).await, LockOutcome::Acquired);
    }

    #[test]
    fn test_policy_wait() {
        assert_eq!(
            StampedePolicy::WaitRetry { wait_ms: 150 }.wait(),
            Some(Duration::from_millis(150))
        );
        assert_eq!(StampedePolicy::ComputeDirect.wait(), None);
    }

    #[test]
    fn test_policy_serde_shape() {
        let json = serde_json::to_string(&StampedePolicy::default()).unwrap();
        assert!(json.contains("wait_retry"));
        let parsed: StampedePolicy = serde_json::from_str(r#"{"mode":"compute_direct"}"#).unwrap();
        assert_eq!(parsed, StampedePolicy::ComputeDirect);
    }
}
