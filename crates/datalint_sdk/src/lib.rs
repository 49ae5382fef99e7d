//! # Datalint SDK
//!
//! Public API of the datalint engine.
//!
//! The free functions cover the common cases: detect a file's format,
//! validate it against a format, inspect it with a timeout, or scan a whole
//! dataset directory. For repeated inspections, create a [`Cache`] once and
//! share it.
//!
//! ## Example
//!
//! ```no_run
//! use datalint_sdk::{get_dataset_format, validate_dataset_format, DatasetFormat};
//!
//! let format = get_dataset_format("data/train/labels.csv").unwrap();
//! assert_eq!(format, DatasetFormat::Csv);
//!
//! let result = validate_dataset_format("data/train/labels.csv", format).unwrap();
//! println!("{:?}: {} diagnostics", result.status, result.diagnostics.len());
//! ```

pub mod scan;

pub use datalint_cache::{fingerprint_artifact, fingerprint_bytes, Cache, CacheKey, CacheStats};
pub use datalint_config::{ConfigError, EngineConfig};
pub use datalint_core::*;
pub use datalint_validator::{Inspect, InspectionContext, Inspector};
pub use scan::{
    scan_dataset, scan_dataset_cached, ScanReport, ScannedFile, Split, DEFAULT_SCAN_CONCURRENCY,
};

use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Version of the engine.
pub const VERSION: &str = ENGINE_VERSION;

/// Creates a result cache.
///
/// Fails with [`DatalintError::CacheConfig`] when the configuration is
/// invalid.
pub fn create_cache(config: CacheConfig) -> Result<Cache> {
    datalint_cache::create_cache(config)
}

/// Detects the format of a file.
///
/// Fails with [`DatalintError::UnrecognizedFormat`] when no detector matches,
/// including for empty files.
pub fn get_dataset_format(path: impl AsRef<Path>) -> Result<DatasetFormat> {
    Ok(sniff(Artifact::path(path.as_ref()), &InspectionOptions::default())?.format)
}

/// Detects the format, content type and dialect of an artifact.
pub fn sniff(artifact: impl Into<Artifact>, options: &InspectionOptions) -> Result<SniffReport> {
    Inspector::new().sniff(&artifact.into(), options, &InspectionContext::new())
}

/// Validates a file against a format using the structure and header checks.
///
/// A mismatch is a [`ValidationStatus::Mismatch`] result, not an error.
pub fn validate_dataset_format(
    path: impl AsRef<Path>,
    format: DatasetFormat,
) -> Result<ValidationResult> {
    validate_with(
        Artifact::path(path.as_ref()),
        format,
        &[Check::Structure, Check::Header],
        &InspectionOptions::default(),
    )
}

/// Validates an artifact against a format with explicit checks and options.
pub fn validate_with(
    artifact: impl Into<Artifact>,
    format: DatasetFormat,
    checks: &[Check],
    options: &InspectionOptions,
) -> Result<ValidationResult> {
    Inspector::new().validate(
        &artifact.into(),
        format,
        checks,
        options,
        &InspectionContext::new(),
    )
}

/// Runs a task on the blocking pool, bounded by the task's timeout.
///
/// A run that exceeds the timeout is cancelled and reported as
/// [`DatalintError::Timeout`].
pub async fn inspect(task: DatasetTask) -> Result<InspectionOutcome> {
    let timeout = task.options().timeout();
    let name = task.artifact().display_name();
    let cancel = CancellationToken::new();
    let ctx = InspectionContext::with_cancellation(cancel.clone());

    let handle = tokio::task::spawn_blocking(move || Inspector::new().inspect(&task, &ctx));
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            warn!(artifact = %name, error = %e, "inspection task failed to join");
            Err(DatalintError::internal(format!("inspection task failed: {}", e)))
        }
        Err(_) => {
            cancel.cancel();
            Err(DatalintError::timeout(name, timeout))
        }
    }
}
