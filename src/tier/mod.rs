//! Cache tiers.
//!
//! - [`memory`]: bounded in-process LRU tier (microsecond latency)
//! - [`persistent`]: client over a shared TTL key/value store
//!   (millisecond latency, may fail)
//! - [`memory_store`]: process-local store implementation for tests and
//!   single-node deployments

pub mod memory;
pub mod memory_store;
pub mod persistent;
