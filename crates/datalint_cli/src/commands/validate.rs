use anyhow::{bail, Context, Result};
use datalint_config::EngineConfig;
use datalint_sdk::{Artifact, Check, DatasetFormat, DatasetTask, FormatVerdict};
use tracing::info;

use super::{open_cache, persist_cache};
use crate::output;

/// Options of the `validate` command.
pub struct ValidateArgs {
    pub declared: Option<DatasetFormat>,
    pub strict: bool,
    pub sample_rows: Option<usize>,
    pub checks: Vec<Check>,
}

pub async fn execute(
    path: &str,
    args: ValidateArgs,
    format: &str,
    config: &EngineConfig,
) -> Result<()> {
    info!("Validating dataset: {}", path);
    info!("Strict mode: {}", args.strict || config.inspection.strict);
    if let Some(declared) = args.declared {
        info!("Declared format: {}", declared);
    }

    let mut options = config.inspection.clone();
    if args.strict {
        options.strict = true;
    }
    if let Some(rows) = args.sample_rows {
        options.sample_rows = rows;
    }

    let checks = if args.checks.is_empty() {
        vec![Check::Structure, Check::Header]
    } else {
        args.checks
    };

    let mut builder = DatasetTask::builder(Artifact::path(path))
        .checks(checks)
        .options(options);
    builder = match args.declared {
        Some(declared) => builder.declared_format(declared),
        // Keep the verdict so that an unrecognized file can be explained.
        None => builder.check(Check::DetectFormat),
    };
    let task = builder.build();

    let cache = open_cache(config)?;
    let outcome = cache
        .get_or_compute(&task)
        .await
        .with_context(|| format!("Failed to inspect {}", path))?;
    persist_cache(&cache);

    let Some(result) = outcome.validation.as_ref() else {
        let reason = match &outcome.verdict {
            Some(FormatVerdict::Unrecognized { reason }) => reason.as_str(),
            _ => "no format to validate against",
        };
        bail!("Could not detect the format of {}: {}", path, reason);
    };

    output::print_validation_result(path, result, format)?;

    if !result.passed() {
        std::process::exit(1);
    }

    Ok(())
}
