//! Validation results and inspection outcomes.
//!
//! Malformed data is a legitimate result, not an error: validators report it
//! as a [`ValidationStatus::Mismatch`] with a list of [`Diagnostic`]s so that
//! batch callers can keep going.

use crate::{DatasetFormat, SniffReport};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational note
    Info,
    /// Suspicious but structurally acceptable
    Warning,
    /// The artifact violates the format grammar
    Error,
}

/// Machine-readable diagnostic category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticCode {
    /// Leading magic number missing or wrong
    BadMagic,
    /// Trailer magic or footer framing corrupt
    CorruptTrailer,
    /// The artifact ends inside a structure
    Truncated,
    /// A record has the wrong number of fields
    ColumnCount,
    /// Header row or schema problem
    BadHeader,
    /// Quoted field never closed
    UnterminatedQuote,
    /// Text is not valid UTF-8 or contains NUL bytes
    InvalidEncoding,
    /// Text does not parse
    Syntax,
    /// Metadata block does not decode
    CorruptMetadata,
    /// Payload does not decode
    CorruptData,
    /// Checksum mismatch
    Checksum,
    /// Valid but unsupported by this engine
    UnsupportedFeature,
}

impl DiagnosticCode {
    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCode::BadMagic => "bad_magic",
            DiagnosticCode::CorruptTrailer => "corrupt_trailer",
            DiagnosticCode::Truncated => "truncated",
            DiagnosticCode::ColumnCount => "column_count",
            DiagnosticCode::BadHeader => "bad_header",
            DiagnosticCode::UnterminatedQuote => "unterminated_quote",
            DiagnosticCode::InvalidEncoding => "invalid_encoding",
            DiagnosticCode::Syntax => "syntax",
            DiagnosticCode::CorruptMetadata => "corrupt_metadata",
            DiagnosticCode::CorruptData => "corrupt_data",
            DiagnosticCode::Checksum => "checksum",
            DiagnosticCode::UnsupportedFeature => "unsupported_feature",
        }
    }
}

/// One finding produced by a validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity
    pub severity: Severity,
    /// Category
    pub code: DiagnosticCode,
    /// Human-readable description
    pub message: String,
    /// Byte offset the finding refers to
    pub offset: Option<u64>,
    /// Zero-based record index the finding refers to
    pub record: Option<u64>,
}

impl Diagnostic {
    /// Creates an error diagnostic.
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            offset: None,
            record: None,
        }
    }

    /// Creates a warning diagnostic.
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(code, message)
        }
    }

    /// Attaches a byte offset.
    pub fn at_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Attaches a record index.
    pub fn at_record(mut self, record: u64) -> Self {
        self.record = Some(record);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "[{}] {}", severity, self.code.as_str())?;
        if let Some(offset) = self.offset {
            write!(f, " at offset {}", offset)?;
        }
        if let Some(record) = self.record {
            write!(f, " (record {})", record)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Overall validation verdict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValidationStatus {
    /// The whole artifact conforms to the format. Outside strict mode,
    /// warnings may still be attached; errors never are.
    Valid,
    /// The checked sample conforms; the rest was not read
    Partial {
        /// Share of the artifact that was checked, in `0.0..=1.0`
        confidence: f64,
    },
    /// The artifact contradicts the format
    Mismatch,
}

/// Geometry of a decoded raster image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    /// Colour channels per pixel (1 grey, 2 grey+alpha, 3 RGB, 4 RGBA)
    pub channels: u8,
}

/// Statistics about one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationStats {
    /// Bytes the validator read
    pub bytes_checked: u64,
    /// Artifact size in bytes
    pub bytes_total: u64,
    /// Records (rows, blocks, lines, chunks) checked
    pub records_checked: u64,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// Image geometry, when the content check decoded an image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageInfo>,
}

/// Result of validating an artifact against a format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Format the artifact was validated against
    pub format: DatasetFormat,
    /// Verdict
    pub status: ValidationStatus,
    /// Findings, in discovery order
    pub diagnostics: Vec<Diagnostic>,
    /// Statistics
    pub stats: ValidationStats,
}

impl ValidationResult {
    /// Builds a result and derives its status.
    ///
    /// Any error diagnostic, or any warning in strict mode, makes the result a
    /// mismatch. Otherwise a sampled pass is partial with a confidence equal
    /// to the checked share of bytes. A passing result therefore carries no
    /// errors, and carries warnings only when `strict` is off.
    pub fn conclude(
        format: DatasetFormat,
        diagnostics: Vec<Diagnostic>,
        stats: ValidationStats,
        sampled: bool,
        strict: bool,
    ) -> Self {
        let failing = diagnostics.iter().any(|d| {
            d.severity == Severity::Error || (strict && d.severity == Severity::Warning)
        });

        let status = if failing {
            ValidationStatus::Mismatch
        } else if sampled && stats.bytes_checked < stats.bytes_total {
            let confidence = if stats.bytes_total == 0 {
                1.0
            } else {
                (stats.bytes_checked as f64 / stats.bytes_total as f64).clamp(0.0, 1.0)
            };
            ValidationStatus::Partial { confidence }
        } else {
            ValidationStatus::Valid
        };

        Self {
            format,
            status,
            diagnostics,
            stats,
        }
    }

    /// Returns true unless the status is a mismatch.
    pub fn passed(&self) -> bool {
        !matches!(self.status, ValidationStatus::Mismatch)
    }

    /// Returns true for partial results.
    pub fn is_partial(&self) -> bool {
        matches!(self.status, ValidationStatus::Partial { .. })
    }

    /// Error diagnostics only.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    /// Warning diagnostics only.
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }
}

/// Hash function used to fingerprint artifact content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintAlgorithm {
    /// 128-bit XXH3, fast non-cryptographic hash
    #[default]
    Xxh3,
    /// SHA-256
    Sha256,
}

impl FingerprintAlgorithm {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            FingerprintAlgorithm::Xxh3 => "xxh3",
            FingerprintAlgorithm::Sha256 => "sha256",
        }
    }
}

impl std::str::FromStr for FingerprintAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "xxh3" | "xxhash" => Ok(FingerprintAlgorithm::Xxh3),
            "sha256" | "sha-256" => Ok(FingerprintAlgorithm::Sha256),
            other => Err(format!("unknown fingerprint algorithm '{}'", other)),
        }
    }
}

/// Content-derived identity of an artifact snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Hash function
    pub algorithm: FingerprintAlgorithm,
    /// Lowercase hex digest
    pub digest: String,
    /// Artifact size in bytes
    pub size: u64,
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.as_str(), self.digest)
    }
}

/// Result of format detection for an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum FormatVerdict {
    /// A detector matched
    Detected(SniffReport),
    /// No detector matched
    Unrecognized {
        /// Why every detector declined
        reason: String,
    },
}

impl FormatVerdict {
    /// Detected format, if any.
    pub fn format(&self) -> Option<DatasetFormat> {
        match self {
            FormatVerdict::Detected(report) => Some(report.format),
            FormatVerdict::Unrecognized { .. } => None,
        }
    }
}

/// Everything one task produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionOutcome {
    /// Content fingerprint, when computed by the cache
    pub fingerprint: Option<Fingerprint>,
    /// Sniffer verdict, when format detection ran
    pub verdict: Option<FormatVerdict>,
    /// Validation result, when a format was known and validation ran
    pub validation: Option<ValidationResult>,
}

impl InspectionOutcome {
    /// Format the artifact was judged by: declared or detected.
    pub fn format(&self) -> Option<DatasetFormat> {
        self.validation
            .as_ref()
            .map(|v| v.format)
            .or_else(|| self.verdict.as_ref().and_then(FormatVerdict::format))
    }

    /// Returns true when no validation failed and the format was recognized.
    pub fn passed(&self) -> bool {
        let recognized = !matches!(self.verdict, Some(FormatVerdict::Unrecognized { .. }))
            || self.validation.is_some();
        recognized && self.validation.as_ref().is_none_or(ValidationResult::passed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stats(checked: u64, total: u64) -> ValidationStats {
        ValidationStats {
            bytes_checked: checked,
            bytes_total: total,
            records_checked: 1,
            duration_ms: 0,
            image: None,
        }
    }

    #[test]
    fn test_conclude_valid() {
        let result =
            ValidationResult::conclude(DatasetFormat::Csv, vec![], stats(10, 10), false, false);
        assert_eq!(result.status, ValidationStatus::Valid);
        assert!(result.passed());
    }

    #[test]
    fn test_conclude_error_is_mismatch() {
        let diag = Diagnostic::error(DiagnosticCode::ColumnCount, "3 fields, expected 2");
        let result =
            ValidationResult::conclude(DatasetFormat::Csv, vec![diag], stats(10, 10), true, false);
        assert_eq!(result.status, ValidationStatus::Mismatch);
        assert_eq!(result.errors().count(), 1);
    }

    #[test]
    fn test_conclude_warning_only_fails_in_strict_mode() {
        let diag = Diagnostic::warning(DiagnosticCode::BadHeader, "duplicate column");
        let lenient = ValidationResult::conclude(
            DatasetFormat::Csv,
            vec![diag.clone()],
            stats(10, 10),
            false,
            false,
        );
        assert_eq!(lenient.status, ValidationStatus::Valid);
        assert_eq!(lenient.errors().count(), 0);
        assert_eq!(lenient.warnings().count(), 1);

        let strict =
            ValidationResult::conclude(DatasetFormat::Csv, vec![diag], stats(10, 10), false, true);
        assert_eq!(strict.status, ValidationStatus::Mismatch);
        assert!(!strict.passed());
    }

    #[test]
    fn test_conclude_partial_confidence() {
        let result =
            ValidationResult::conclude(DatasetFormat::Csv, vec![], stats(25, 100), true, false);
        assert_eq!(result.status, ValidationStatus::Partial { confidence: 0.25 });
        assert!(result.is_partial());
        assert!(result.passed());
    }

    #[test]
    fn test_sampled_but_complete_is_valid() {
        let result =
            ValidationResult::conclude(DatasetFormat::Csv, vec![], stats(100, 100), true, false);
        assert_eq!(result.status, ValidationStatus::Valid);
    }

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic::error(DiagnosticCode::CorruptTrailer, "missing PAR1")
            .at_offset(96)
            .at_record(2);
        assert_eq!(
            diag.to_string(),
            "[error] corrupt_trailer at offset 96 (record 2): missing PAR1"
        );
    }

    #[test]
    fn test_fingerprint_display() {
        let fp = Fingerprint {
            algorithm: FingerprintAlgorithm::Sha256,
            digest: "ab12".to_string(),
            size: 4,
        };
        assert_eq!(fp.to_string(), "sha256:ab12");
    }

    #[test]
    fn test_outcome_passed_for_unrecognized_without_validation() {
        let outcome = InspectionOutcome {
            fingerprint: None,
            verdict: Some(FormatVerdict::Unrecognized {
                reason: "empty".to_string(),
            }),
            validation: None,
        };
        assert!(!outcome.passed());
        assert_eq!(outcome.format(), None);
    }
}
