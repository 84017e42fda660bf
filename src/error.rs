//! Error taxonomy for the cache subsystem.
//!
//! Three failure classes with different propagation rules:
//! - [`KeyDerivationError`]: fatal for the request, always surfaced.
//! - [`InfraError`]: persistent-tier or lock faults, always absorbed by the
//!   orchestrator (degraded mode), never caller-visible.
//! - [`ComputeError`]: surfaced to the caller verbatim, never cached.

use std::time::Duration;

use thiserror::Error;

/// Input could not be canonically encoded for hashing.
///
/// Non-retryable; propagates immediately and is never cached.
#[derive(Error, Debug)]
pub enum KeyDerivationError {
    #[error("input of {0} bytes exceeds the canonical encoding limit")]
    InputTooLarge(usize),

    #[error("model id of {0} bytes exceeds the canonical encoding limit")]
    ModelIdTooLarge(usize),
}

/// The persistent tier (or the lock it hosts) is unreachable, slow, or
/// returned garbage.
///
/// These never reach the caller: the orchestrator interprets every variant
/// as "temporarily unavailable" and degrades to memory-only operation.
#[derive(Error, Debug)]
pub enum InfraError {
    #[error("persistent store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("persistent store unavailable: {0}")]
    Unavailable(String),

    #[error("persistent store backend error: {0}")]
    Backend(String),

    #[error("stored entry is not decodable: {0}")]
    Codec(String),
}

/// The external compute function failed.
///
/// Retry is the caller's responsibility; the cache never stores a failure.
#[derive(Error, Debug)]
pub enum ComputeError {
    #[error("compute failed: {0}")]
    Failed(String),

    #[error("batch compute returned {got} values for {expected} inputs")]
    BatchShape { expected: usize, got: usize },
}

/// Caller-visible errors from [`crate::orchestrator::CacheOrchestrator`].
///
/// Infrastructure faults are deliberately absent: availability wins over
/// cache consistency, so they are absorbed internally.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error(transparent)]
    KeyDerivation(#[from] KeyDerivationError),

    #[error(transparent)]
    Compute(#[from] ComputeError),
}
