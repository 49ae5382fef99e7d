pub mod scan;
pub mod sniff;
pub mod validate;

use anyhow::{Context, Result};
use datalint_config::EngineConfig;
use datalint_sdk::{create_cache, Cache};
use tracing::{info, warn};

/// Opens the result cache described by the engine configuration.
pub(crate) fn open_cache(config: &EngineConfig) -> Result<Cache> {
    create_cache(config.cache.clone()).context("Failed to create result cache")
}

/// Writes the cache snapshot when a persist path is configured.
///
/// A failed write is logged; it never fails the command.
pub(crate) fn persist_cache(cache: &Cache) {
    if cache.config().persist_path.is_none() {
        return;
    }
    match cache.persist() {
        Ok(entries) => info!("Cache snapshot saved ({} entries)", entries),
        Err(e) => warn!("Failed to save cache snapshot: {}", e),
    }
}
