//! Contract with the expensive external computation.
//!
//! This is the only boundary to the real work (the motivating case is an
//! embedding API billed per call). Retries, rate limiting, and transport are
//! the implementor's concern; the cache only distinguishes success from
//! [`ComputeError`], which it surfaces verbatim and never stores.

use async_trait::async_trait;

use crate::error::ComputeError;

/// Result of one computation.
pub type Embedding = Vec<f32>;

/// A deterministic, possibly-failing external computation.
///
/// Determinism is assumed: two calls with the same input must produce the
/// same value, which is what makes last-write-wins replacement value-safe.
#[async_trait]
pub trait ComputeSource: Send + Sync {
    /// Compute the value for a single input.
    async fn compute(&self, input: &str) -> Result<Embedding, ComputeError>;

    /// Compute values for a batch of inputs in one round trip.
    ///
    /// Must return exactly one value per input, in input order; the
    /// orchestrator rejects a mismatched shape as a [`ComputeError`].
    async fn compute_batch(&self, inputs: &[String]) -> Result<Vec<Embedding>, ComputeError>;
}
