//! Runtime configuration for memo-tier.
//!
//! Configuration can be loaded from a JSON file or constructed
//! programmatically. All tuning knobs (tier capacity, TTLs, timeouts,
//! stampede policy, cost accounting) live here; there is no dynamic
//! reconfiguration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::guard::StampedePolicy;

/// A configuration value that can never work.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("memory tier capacity must be at least 1")]
    ZeroCapacity,

    #[error("model id must not be empty")]
    EmptyModelId,

    #[error("lock lease TTL must be at least 1 second")]
    ZeroLease,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Identifier of the upstream model/version; part of every cache key.
    pub model_id: String,

    /// Memory tier settings.
    pub memory: MemoryConfig,

    /// Persistent tier settings.
    pub persistent: PersistentConfig,

    /// Stampede lock settings.
    pub lock: LockConfig,

    /// Statistics settings.
    pub stats: StatsConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            model_id: "text-embedding-3-small".to_string(),
            memory: MemoryConfig::default(),
            persistent: PersistentConfig::default(),
            lock: LockConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

/// Memory tier (in-process LRU) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Maximum number of entries held in process memory.
    pub capacity: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

/// Persistent tier (shared TTL store) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentConfig {
    /// TTL applied to every stored entry, in seconds.
    pub entry_ttl_secs: u64,

    /// Per-call timeout for store operations, in milliseconds.
    ///
    /// Exceeding it marks the tier unavailable for that request; the
    /// request itself never fails because of it.
    pub op_timeout_ms: u64,
}

impl Default for PersistentConfig {
    fn default() -> Self {
        Self {
            entry_ttl_secs: 7 * 24 * 3600, // 7 days
            op_timeout_ms: 250,
        }
    }
}

impl PersistentConfig {
    pub fn entry_ttl(&self) -> Duration {
        Duration::from_secs(self.entry_ttl_secs)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

/// Stampede lock settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Lease TTL in seconds. Self-expiring: a crashed holder blocks a key
    /// for at most one lease, with no heartbeat or renewal.
    pub lease_ttl_secs: u64,

    /// What a caller does when the lock is already held.
    pub policy: StampedePolicy,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease_ttl_secs: 10,
            policy: StampedePolicy::default(),
        }
    }
}

impl LockConfig {
    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }
}

/// Statistics settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Cost of one upstream computation, in whatever unit the deployment
    /// bills in. Only used for the `cost_saved` figure in snapshots.
    pub cost_per_computation: f64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            cost_per_computation: 0.0001,
        }
    }
}

impl CacheConfig {
    /// Load configuration from a JSON file, falling back to defaults when
    /// the file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: CacheConfig = serde_json::from_str(&data)?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(CacheConfig::default())
        }
    }

    /// Reject values the orchestrator cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.model_id.is_empty() {
            return Err(ConfigError::EmptyModelId);
        }
        if self.lock.lease_ttl_secs == 0 {
            return Err(ConfigError::ZeroLease);
        }
        Ok(())
    }
}
