use anyhow::{Context, Result};
use datalint_config::EngineConfig;
use datalint_sdk::{scan_dataset_cached, DEFAULT_SCAN_CONCURRENCY};
use std::sync::Arc;
use tracing::info;

use super::{open_cache, persist_cache};
use crate::output;

pub async fn execute(dir: &str, format: &str, config: &EngineConfig) -> Result<()> {
    info!("Scanning dataset: {}", dir);

    let cache = Arc::new(open_cache(config)?);
    let report = scan_dataset_cached(
        dir,
        &config.inspection,
        Arc::clone(&cache),
        DEFAULT_SCAN_CONCURRENCY,
    )
    .await
    .with_context(|| format!("Failed to scan {}", dir))?;
    persist_cache(&cache);

    output::print_scan_report(&report, format)?;

    if !report.is_clean() {
        std::process::exit(1);
    }

    Ok(())
}
