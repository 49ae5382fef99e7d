use anyhow::{Context, Result};
use datalint_config::EngineConfig;
use datalint_sdk::{sniff, Artifact};
use tracing::info;

use crate::output;

pub fn execute(path: &str, format: &str, config: &EngineConfig) -> Result<()> {
    info!("Sniffing dataset: {}", path);

    let report = sniff(Artifact::path(path), &config.inspection)
        .with_context(|| format!("Failed to detect the format of {}", path))?;

    output::print_sniff_report(path, &report, format)
}
