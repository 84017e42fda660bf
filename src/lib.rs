//! memo-tier: two-tier cache for expensive deterministic computations.
//!
//! Sits in front of a costly, deterministic function (the motivating case
//! is an embedding API billed per call) and memoizes results across two
//! tiers:
//!   in-process LRU (microseconds) → shared TTL key/value store (milliseconds)
//!
//! On a full miss the orchestrator serializes concurrent recomputation of
//! the same key with a short-lease distributed lock, and when the shared
//! store is unreachable it degrades to memory-only caching instead of
//! failing the caller.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use memo_tier::{CacheConfig, CacheOrchestrator, ComputeSource, InMemoryStore};
//!
//! # async fn example(embedder: impl ComputeSource) -> anyhow::Result<()> {
//! let cache = CacheOrchestrator::new(CacheConfig::default(), Arc::new(InMemoryStore::new()))?;
//!
//! let vector = cache.get_or_compute("some text", &embedder).await?;
//!
//! let snap = cache.stats();
//! tracing::info!(hit_rate = snap.hit_rate, cost_saved = snap.cost_saved, "cache stats");
//! # Ok(())
//! # }
//! ```

pub mod compute;
pub mod config;
pub mod error;
pub mod guard;
pub mod key;
pub mod orchestrator;
pub mod stats;
pub mod tier;

pub use compute::{ComputeSource, Embedding};
pub use config::{CacheConfig, ConfigError};
pub use error::{CacheError, ComputeError, InfraError, KeyDerivationError};
pub use guard::{LockOutcome, StampedePolicy};
pub use key::{CacheKey, KeyDeriver};
pub use orchestrator::CacheOrchestrator;
pub use stats::StatsSnapshot;
pub use tier::memory_store::InMemoryStore;
pub use tier::persistent::{KvStore, StoredEntry};
