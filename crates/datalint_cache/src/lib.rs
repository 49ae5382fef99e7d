//! # Datalint Cache
//!
//! Content-addressed memoization of dataset inspections.
//!
//! Outcomes are keyed by a fingerprint of the artifact bytes plus the task's
//! check profile. Computation runs on tokio's blocking pool, bounded by the
//! task timeout and cancellable through a `CancellationToken`.

pub mod cache;
pub mod fingerprint;
mod snapshot;

pub use cache::{Cache, CacheKey, CacheStats};
pub use fingerprint::{fingerprint_artifact, fingerprint_bytes};

use datalint_core::{CacheConfig, Result};

/// Creates a result cache.
///
/// Fails with [`datalint_core::DatalintError::CacheConfig`] on invalid
/// configuration. When `persist_path` names an existing snapshot written by
/// this engine version, its unexpired entries are loaded.
pub fn create_cache(config: CacheConfig) -> Result<Cache> {
    Cache::new(config)
}
