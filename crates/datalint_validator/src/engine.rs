//! Main inspection engine.
//!
//! This module provides the [`Inspector`] that ties the sniffer and the
//! per-format validators together: it detects a format, picks the matching
//! validator and turns raw findings into a [`ValidationResult`].

use crate::delimited::sniff_dialect;
use crate::{
    ArrowIpcValidator, ArtifactSource, AvroValidator, DelimitedValidator, Findings,
    ImageValidator, InspectionContext, JsonLinesValidator, JsonValidator, OrcValidator,
    ParquetValidator, Sniffer, ValidationScope,
};
use datalint_core::{
    Artifact, Check, DatalintError, DatasetFormat, DatasetTask, DelimitedDialect, Diagnostic,
    DiagnosticCode, FormatVerdict, InspectionOptions, InspectionOutcome, Result, SniffReport,
    ValidationResult, ValidationStats,
};
use std::time::Instant;
use tracing::debug;

/// Something that can run a [`DatasetTask`] to completion.
///
/// The result cache is generic over this trait so that the computation it
/// memoizes can be swapped out.
pub trait Inspect: Send + Sync + 'static {
    /// Runs every check the task asks for.
    fn inspect(&self, task: &DatasetTask, ctx: &InspectionContext) -> Result<InspectionOutcome>;
}

/// Format detection and validation engine.
///
/// # Example
///
/// ```rust
/// use datalint_core::{Artifact, DatasetFormat, InspectionOptions, ValidationStatus};
/// use datalint_validator::{InspectionContext, Inspector};
///
/// let inspector = Inspector::new();
/// let artifact = Artifact::bytes("people.csv", "id,name\n1,ada\n2,grace\n");
/// let ctx = InspectionContext::new();
///
/// let report = inspector.sniff(&artifact, &InspectionOptions::default(), &ctx).unwrap();
/// assert_eq!(report.format, DatasetFormat::Csv);
///
/// let result = inspector
///     .validate(&artifact, DatasetFormat::Csv, &[], &InspectionOptions::default(), &ctx)
///     .unwrap();
/// assert_eq!(result.status, ValidationStatus::Valid);
/// ```
pub struct Inspector {
    sniffer: Sniffer,
    delimited: DelimitedValidator,
    parquet: ParquetValidator,
    arrow_ipc: ArrowIpcValidator,
    avro: AvroValidator,
    orc: OrcValidator,
    image: ImageValidator,
    json: JsonValidator,
    json_lines: JsonLinesValidator,
}

impl Inspector {
    /// Creates a new inspector.
    pub fn new() -> Self {
        Self {
            sniffer: Sniffer::new(),
            delimited: DelimitedValidator::new(),
            parquet: ParquetValidator::new(),
            arrow_ipc: ArrowIpcValidator::new(),
            avro: AvroValidator::new(),
            orc: OrcValidator::new(),
            image: ImageValidator::new(),
            json: JsonValidator::new(),
            json_lines: JsonLinesValidator::new(),
        }
    }

    /// Runs the detector chain on an artifact.
    pub fn detect(
        &self,
        artifact: &Artifact,
        options: &InspectionOptions,
        ctx: &InspectionContext,
    ) -> Result<FormatVerdict> {
        let source = ArtifactSource::open(artifact)?;
        self.sniffer.sniff_source(&source, options.sniff_bytes, ctx)
    }

    /// Detects the format of an artifact.
    ///
    /// Fails with [`DatalintError::UnrecognizedFormat`] when no detector
    /// matches, including for empty artifacts.
    pub fn sniff(
        &self,
        artifact: &Artifact,
        options: &InspectionOptions,
        ctx: &InspectionContext,
    ) -> Result<SniffReport> {
        match self.detect(artifact, options, ctx)? {
            FormatVerdict::Detected(report) => Ok(report),
            FormatVerdict::Unrecognized { reason } => Err(DatalintError::unrecognized(
                artifact.display_name(),
                reason,
            )),
        }
    }

    /// Validates an artifact against a format.
    ///
    /// Structural checks always run; `checks` adds header and content layers.
    /// An empty slice means structure plus headers.
    pub fn validate(
        &self,
        artifact: &Artifact,
        format: DatasetFormat,
        checks: &[Check],
        options: &InspectionOptions,
        ctx: &InspectionContext,
    ) -> Result<ValidationResult> {
        let source = ArtifactSource::open(artifact)?;
        let scope = if checks.is_empty() {
            ValidationScope::from_checks(&Check::DEFAULT)
        } else {
            ValidationScope::from_checks(checks)
        };
        self.validate_source(&source, format, None, scope, options, ctx)
    }

    fn validate_source(
        &self,
        source: &ArtifactSource,
        format: DatasetFormat,
        sniffed: Option<&SniffReport>,
        scope: ValidationScope,
        options: &InspectionOptions,
        ctx: &InspectionContext,
    ) -> Result<ValidationResult> {
        let start = Instant::now();

        let findings = if source.is_empty() {
            let mut findings = Findings::default();
            findings.push(
                Diagnostic::error(DiagnosticCode::Truncated, "artifact is empty").at_offset(0),
            );
            findings
        } else {
            match format {
                DatasetFormat::Csv | DatasetFormat::Tsv => {
                    let dialect = self.resolve_dialect(source, format, sniffed, options)?;
                    self.delimited
                        .validate(source, &dialect, scope, options.sample_rows, ctx)?
                }
                DatasetFormat::Parquet => self.parquet.validate(source, scope, ctx)?,
                DatasetFormat::ArrowIpc => self.arrow_ipc.validate(source, scope, ctx)?,
                DatasetFormat::Avro => {
                    self.avro
                        .validate(source, scope, options.sample_rows, ctx)?
                }
                DatasetFormat::Orc => self.orc.validate(source, scope, ctx)?,
                DatasetFormat::Png | DatasetFormat::Jpeg | DatasetFormat::Gif => {
                    self.image.validate(source, format, scope, ctx)?
                }
                DatasetFormat::Json => self.json.validate(source, scope, ctx)?,
                DatasetFormat::JsonLines => {
                    self.json_lines
                        .validate(source, scope, options.sample_rows, ctx)?
                }
            }
        };

        let stats = ValidationStats {
            bytes_checked: findings.bytes_checked.min(source.len()),
            bytes_total: source.len(),
            records_checked: findings.records_checked,
            duration_ms: start.elapsed().as_millis() as u64,
            image: findings.image,
        };
        let result = ValidationResult::conclude(
            format,
            findings.diagnostics,
            stats,
            findings.sampled,
            options.strict,
        );

        debug!(
            artifact = source.name(),
            format = %format,
            status = ?result.status,
            diagnostics = result.diagnostics.len(),
            "validation finished"
        );
        Ok(result)
    }

    /// Picks the dialect used to validate delimited text.
    ///
    /// A dialect sniffed for the same format wins; otherwise the prefix is
    /// sniffed again and kept when its delimiter agrees with the format.
    fn resolve_dialect(
        &self,
        source: &ArtifactSource,
        format: DatasetFormat,
        sniffed: Option<&SniffReport>,
        options: &InspectionOptions,
    ) -> Result<DelimitedDialect> {
        if let Some(dialect) = sniffed
            .filter(|report| report.format == format)
            .and_then(|report| report.dialect)
        {
            return Ok(dialect);
        }

        let prefix = source.prefix(options.sniff_bytes.max(1))?;
        let sample = crate::Sample::new(&prefix, source.len());
        let dialect = sample
            .complete_lines()
            .and_then(sniff_dialect)
            .filter(|d| (d.delimiter == b'\t') == (format == DatasetFormat::Tsv));
        Ok(dialect.unwrap_or_else(|| DelimitedDialect::for_format(format)))
    }

    /// Runs every check a task asks for.
    ///
    /// Detection runs when requested or when no format was declared. A
    /// declared format takes precedence over the detected one for
    /// validation, which runs whenever structure, header or content checks
    /// are requested and a format is known.
    pub fn inspect(&self, task: &DatasetTask, ctx: &InspectionContext) -> Result<InspectionOutcome> {
        let options = task.options();
        let source = ArtifactSource::open(task.artifact())?;

        // 1. Format detection
        let verdict = if task.wants(Check::DetectFormat) || task.declared_format().is_none() {
            Some(
                self.sniffer
                    .sniff_source(&source, options.sniff_bytes, ctx)?,
            )
        } else {
            None
        };

        // 2. Validation against the declared or detected format
        let wants_validation = task.wants(Check::Structure)
            || task.wants(Check::Header)
            || task.wants(Check::Content);
        let sniffed = match &verdict {
            Some(FormatVerdict::Detected(report)) => Some(report),
            _ => None,
        };
        let format = task.declared_format().or(sniffed.map(|r| r.format));

        let validation = match format {
            Some(format) if wants_validation => Some(self.validate_source(
                &source,
                format,
                sniffed,
                ValidationScope::from_checks(task.checks()),
                options,
                ctx,
            )?),
            _ => None,
        };

        Ok(InspectionOutcome {
            fingerprint: None,
            verdict: if task.wants(Check::DetectFormat) {
                verdict
            } else {
                None
            },
            validation,
        })
    }
}

impl Default for Inspector {
    fn default() -> Self {
        Self::new()
    }
}

impl Inspect for Inspector {
    fn inspect(&self, task: &DatasetTask, ctx: &InspectionContext) -> Result<InspectionOutcome> {
        Inspector::inspect(self, task, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalint_core::ValidationStatus;
    use pretty_assertions::assert_eq;

    fn csv() -> Artifact {
        Artifact::bytes("people.csv", "id,name,score\n1,ada,0.9\n2,grace,0.8\n")
    }

    #[test]
    fn test_sniff_unrecognized_is_error() {
        let err = Inspector::new()
            .sniff(
                &Artifact::bytes("empty.bin", Vec::new()),
                &InspectionOptions::default(),
                &InspectionContext::new(),
            )
            .unwrap_err();
        assert!(matches!(err, DatalintError::UnrecognizedFormat { .. }));
    }

    #[test]
    fn test_validate_empty_artifact_is_mismatch() {
        let result = Inspector::new()
            .validate(
                &Artifact::bytes("empty.csv", Vec::new()),
                DatasetFormat::Csv,
                &[],
                &InspectionOptions::default(),
                &InspectionContext::new(),
            )
            .unwrap();
        assert_eq!(result.status, ValidationStatus::Mismatch);
        assert_eq!(result.diagnostics[0].code, DiagnosticCode::Truncated);
    }

    #[test]
    fn test_inspect_default_checks() {
        let outcome = Inspector::new()
            .inspect(&DatasetTask::new(csv()), &InspectionContext::new())
            .unwrap();
        assert_eq!(outcome.format(), Some(DatasetFormat::Csv));
        let validation = outcome.validation.unwrap();
        assert_eq!(validation.status, ValidationStatus::Valid);
        assert!(validation.diagnostics.is_empty());
        assert_eq!(validation.stats.records_checked, 2);
    }

    #[test]
    fn test_inspect_detection_only() {
        let task = DatasetTask::builder(csv())
            .check(Check::DetectFormat)
            .build();
        let outcome = Inspector::new()
            .inspect(&task, &InspectionContext::new())
            .unwrap();
        assert!(outcome.validation.is_none());
        assert_eq!(outcome.format(), Some(DatasetFormat::Csv));
    }

    #[test]
    fn test_declared_format_overrides_detection() {
        let task = DatasetTask::builder(csv())
            .check(Check::Structure)
            .declared_format(DatasetFormat::Parquet)
            .build();
        let outcome = Inspector::new()
            .inspect(&task, &InspectionContext::new())
            .unwrap();
        assert!(outcome.verdict.is_none());
        let validation = outcome.validation.unwrap();
        assert_eq!(validation.format, DatasetFormat::Parquet);
        assert_eq!(validation.status, ValidationStatus::Mismatch);
    }

    #[test]
    fn test_declared_tsv_uses_tab_dialect() {
        let result = Inspector::new()
            .validate(
                &Artifact::bytes("t.tsv", "a\tb\n1\t2\n"),
                DatasetFormat::Tsv,
                &[],
                &InspectionOptions::default(),
                &InspectionContext::new(),
            )
            .unwrap();
        assert_eq!(result.status, ValidationStatus::Valid);
    }

    #[test]
    fn test_strict_mode_fails_on_warnings() {
        let artifact = Artifact::bytes("dup.csv", "id,id\n1,2\n");
        let lenient = Inspector::new()
            .validate(
                &artifact,
                DatasetFormat::Csv,
                &[],
                &InspectionOptions::default(),
                &InspectionContext::new(),
            )
            .unwrap();
        assert_eq!(lenient.status, ValidationStatus::Valid);

        let strict = Inspector::new()
            .validate(
                &artifact,
                DatasetFormat::Csv,
                &[],
                &InspectionOptions::default().with_strict(true),
                &InspectionContext::new(),
            )
            .unwrap();
        assert_eq!(strict.status, ValidationStatus::Mismatch);
    }

    #[test]
    fn test_partial_confidence() {
        let mut text = String::from("id,value\n");
        for i in 0..1000 {
            text.push_str(&format!("{},{}\n", i, i * 2));
        }
        let result = Inspector::new()
            .validate(
                &Artifact::bytes("big.csv", text),
                DatasetFormat::Csv,
                &[],
                &InspectionOptions::default().with_sample_rows(100),
                &InspectionContext::new(),
            )
            .unwrap();
        match result.status {
            ValidationStatus::Partial { confidence } => {
                assert!(confidence > 0.0 && confidence < 1.0)
            }
            other => panic!("expected a partial result, got {:?}", other),
        }
    }

    #[test]
    fn test_cancelled_context() {
        let token = tokio_util::sync::CancellationToken::new();
        token.cancel();
        let err = Inspector::new()
            .inspect(
                &DatasetTask::new(csv()),
                &InspectionContext::with_cancellation(token),
            )
            .unwrap_err();
        assert!(matches!(err, DatalintError::Cancelled));
    }
}
