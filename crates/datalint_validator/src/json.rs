//! JSON documents and JSON Lines.

use crate::{ArtifactSource, Findings, InspectionContext, ValidationScope};
use datalint_core::{Diagnostic, DiagnosticCode, Result};
use serde::de::IgnoredAny;
use serde::Deserialize;
use serde_json::Value;
use std::io::{BufRead, Read};

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Validates single-document JSON artifacts.
pub struct JsonValidator;

impl JsonValidator {
    /// Creates a new JSON validator.
    pub fn new() -> Self {
        Self
    }

    /// Parses the whole document and rejects trailing data.
    pub fn validate(
        &self,
        source: &ArtifactSource,
        scope: ValidationScope,
        ctx: &InspectionContext,
    ) -> Result<Findings> {
        let mut findings = Findings::whole(source.len());

        let mut reader = ctx.guard(source.reader()?);
        if source.prefix(BOM.len())? == BOM {
            let mut bom = [0u8; 3];
            reader
                .read_exact(&mut bom)
                .map_err(|e| ctx.io_error(source.name(), e))?;
        }
        let mut de = serde_json::Deserializer::from_reader(reader);
        let parsed = IgnoredAny::deserialize(&mut de).and_then(|_| de.end());

        if let Err(e) = parsed {
            if e.is_io() {
                return Err(ctx.io_error(
                    source.name(),
                    std::io::Error::other(e.to_string()),
                ));
            }
            let code = if e.is_eof() {
                DiagnosticCode::Truncated
            } else {
                DiagnosticCode::Syntax
            };
            findings.push(Diagnostic::error(code, e.to_string()));
            return Ok(findings);
        }
        findings.records_checked = 1;

        if scope.header {
            let first = first_significant_byte(source)?;
            if !matches!(first, Some(b'{') | Some(b'[')) {
                findings.push(
                    Diagnostic::warning(
                        DiagnosticCode::BadHeader,
                        "top-level value is neither an object nor an array",
                    )
                    .at_offset(0),
                );
            }
        }

        Ok(findings)
    }
}

fn first_significant_byte(source: &ArtifactSource) -> Result<Option<u8>> {
    let prefix = source.prefix(4096)?;
    let prefix = prefix.strip_prefix(BOM).unwrap_or(&prefix);
    Ok(prefix.iter().copied().find(|b| !b.is_ascii_whitespace()))
}

impl Default for JsonValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Validates newline-delimited JSON.
pub struct JsonLinesValidator;

impl JsonLinesValidator {
    /// Creates a new JSON Lines validator.
    pub fn new() -> Self {
        Self
    }

    /// Parses each non-empty line on its own. Stops after `sample_rows`
    /// records.
    pub fn validate(
        &self,
        source: &ArtifactSource,
        scope: ValidationScope,
        sample_rows: usize,
        ctx: &InspectionContext,
    ) -> Result<Findings> {
        let mut findings = Findings::default();
        let mut reader = ctx.guard(source.reader()?);
        let mut line = Vec::new();
        let mut offset: u64 = 0;
        let mut record: u64 = 0;

        loop {
            line.clear();
            let n = reader
                .read_until(b'\n', &mut line)
                .map_err(|e| ctx.io_error(source.name(), e))?;
            if n == 0 {
                break;
            }
            let start = offset;
            offset += n as u64;

            let body = if record == 0 && start == 0 {
                line.strip_prefix(BOM).unwrap_or(&line)
            } else {
                &line[..]
            };
            if body.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            match serde_json::from_slice::<Value>(body) {
                Ok(value) => {
                    if scope.header && !value.is_object() {
                        findings.push(
                            Diagnostic::warning(
                                DiagnosticCode::BadHeader,
                                "line holds a JSON value that is not an object",
                            )
                            .at_offset(start)
                            .at_record(record),
                        );
                    }
                }
                Err(e) => {
                    findings.push(
                        Diagnostic::error(
                            DiagnosticCode::Syntax,
                            format!("invalid JSON: {}", e),
                        )
                        .at_offset(start)
                        .at_record(record),
                    );
                }
            }
            record += 1;

            if findings.error_budget_spent() {
                findings.sampled = true;
                break;
            }
            if record >= sample_rows as u64 && offset < source.len() {
                findings.sampled = true;
                break;
            }
            if record % 1024 == 0 {
                ctx.checkpoint()?;
            }
        }

        findings.bytes_checked = offset;
        findings.records_checked = record;
        Ok(findings)
    }
}

impl Default for JsonLinesValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalint_core::Artifact;
    use pretty_assertions::assert_eq;

    fn source(text: &str) -> ArtifactSource {
        ArtifactSource::open(&Artifact::bytes("t.json", text.to_string())).unwrap()
    }

    fn json(text: &str) -> Findings {
        JsonValidator::new()
            .validate(&source(text), ValidationScope::full(), &InspectionContext::new())
            .unwrap()
    }

    fn jsonl(text: &str, sample_rows: usize) -> Findings {
        JsonLinesValidator::new()
            .validate(
                &source(text),
                ValidationScope::full(),
                sample_rows,
                &InspectionContext::new(),
            )
            .unwrap()
    }

    #[test]
    fn test_valid_document() {
        let findings = json("{\"images\": [], \"annotations\": []}\n");
        assert!(findings.diagnostics.is_empty());
    }

    #[test]
    fn test_syntax_error_cites_position() {
        let findings = json("{\n  \"a\": 1,\n  \"b\": ]\n}");
        assert_eq!(findings.diagnostics.len(), 1);
        assert_eq!(findings.diagnostics[0].code, DiagnosticCode::Syntax);
        assert!(findings.diagnostics[0].message.contains("line 3"));
    }

    #[test]
    fn test_truncated_document() {
        let findings = json("[1, 2, 3");
        assert_eq!(findings.diagnostics[0].code, DiagnosticCode::Truncated);
    }

    #[test]
    fn test_trailing_data() {
        let findings = json("{} {}");
        assert_eq!(findings.diagnostics[0].code, DiagnosticCode::Syntax);
    }

    #[test]
    fn test_scalar_document_is_warning() {
        let findings = json("42");
        assert_eq!(findings.diagnostics.len(), 1);
        assert!(!findings.has_errors());
    }

    #[test]
    fn test_json_lines_bad_line() {
        let findings = jsonl("{\"a\":1}\n{\"a\":\n{\"a\":3}\n", 100);
        assert_eq!(findings.diagnostics.len(), 1);
        let diag = &findings.diagnostics[0];
        assert_eq!(diag.code, DiagnosticCode::Syntax);
        assert_eq!(diag.record, Some(1));
        assert_eq!(diag.offset, Some(8));
        assert_eq!(findings.records_checked, 3);
    }

    #[test]
    fn test_json_lines_skips_blank_lines() {
        let findings = jsonl("{\"a\":1}\n\n{\"a\":2}\n", 100);
        assert!(findings.diagnostics.is_empty());
        assert_eq!(findings.records_checked, 2);
    }

    #[test]
    fn test_json_lines_sampling() {
        let text: String = (0..20).map(|i| format!("{{\"i\":{}}}\n", i)).collect();
        let findings = jsonl(&text, 5);
        assert!(findings.sampled);
        assert_eq!(findings.records_checked, 5);
    }
}
