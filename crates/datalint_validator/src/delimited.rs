//! Delimited text (CSV/TSV) records, dialect sniffing and validation.
//!
//! Records follow RFC 4180 quoting: a field that starts with `"` is quoted,
//! may contain delimiters and newlines, and escapes quotes as `""`.

use crate::{ArtifactSource, Findings, InspectionContext, ValidationScope};
use datalint_core::{DelimitedDialect, Diagnostic, DiagnosticCode, Result};
use std::collections::HashSet;
use std::io::{self, BufRead};
use thiserror::Error;
use tracing::debug;

/// Delimiters the sniffer tries, in tie-break order.
pub const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b'\t', b';', b'|'];

/// Records examined when sniffing a dialect.
const SNIFF_RECORDS: usize = 50;

/// One parsed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Field values, unquoted
    pub fields: Vec<String>,
    /// Byte offset of the first byte of the record
    pub offset: u64,
}

impl Record {
    /// A physical line with no content.
    pub fn is_blank(&self) -> bool {
        self.fields.len() == 1 && self.fields[0].trim().is_empty()
    }
}

/// Failure to read one record.
#[derive(Debug, Error)]
pub enum RecordError {
    /// A quoted field was still open at end of input
    #[error("quoted field starting in record at offset {offset} is never closed")]
    UnterminatedQuote { offset: u64 },

    /// The record is not valid UTF-8 or contains NUL bytes
    #[error("record at offset {offset} is not valid UTF-8 text")]
    InvalidEncoding { offset: u64 },

    /// The underlying reader failed
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Streaming, quote-aware record reader.
pub struct RecordReader<R> {
    reader: R,
    delimiter: u8,
    offset: u64,
    line: Vec<u8>,
}

impl<R: BufRead> RecordReader<R> {
    /// Creates a reader splitting on `delimiter`.
    pub fn new(reader: R, delimiter: u8) -> Self {
        Self {
            reader,
            delimiter,
            offset: 0,
            line: Vec::new(),
        }
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Whether input remains after the last record.
    pub fn has_more(&mut self) -> io::Result<bool> {
        Ok(!self.reader.fill_buf()?.is_empty())
    }

    /// Reads the next record; `None` at end of input.
    pub fn next_record(&mut self) -> Option<std::result::Result<Record, RecordError>> {
        let start = self.offset;
        let mut fields: Vec<Vec<u8>> = Vec::new();
        let mut field: Vec<u8> = Vec::new();
        let mut in_quotes = false;
        let mut quoted = false;
        let mut consumed = 0u64;

        loop {
            self.line.clear();
            let n = match self.reader.read_until(b'\n', &mut self.line) {
                Ok(n) => n,
                Err(e) => return Some(Err(RecordError::Io(e))),
            };
            if n == 0 {
                if consumed == 0 {
                    return None;
                }
                // Only reachable with an open quote: a closed record ends
                // below on its newline or at end of input.
                return Some(Err(RecordError::UnterminatedQuote { offset: start }));
            }
            consumed += n as u64;
            self.offset += n as u64;

            let line = &self.line;
            let mut i = 0;
            while i < line.len() {
                let b = line[i];
                if in_quotes {
                    if b == b'"' {
                        if line.get(i + 1) == Some(&b'"') {
                            field.push(b'"');
                            i += 2;
                            continue;
                        }
                        in_quotes = false;
                    } else {
                        field.push(b);
                    }
                } else if b == b'"' && field.is_empty() && !quoted {
                    in_quotes = true;
                    quoted = true;
                } else if b == self.delimiter {
                    fields.push(std::mem::take(&mut field));
                    quoted = false;
                } else if b == b'\n' {
                    break;
                } else if !(b == b'\r' && line.get(i + 1) == Some(&b'\n')) {
                    field.push(b);
                }
                i += 1;
            }

            if in_quotes {
                continue;
            }
            fields.push(field);
            break;
        }

        let mut decoded = Vec::with_capacity(fields.len());
        for raw in fields {
            if raw.contains(&0) {
                return Some(Err(RecordError::InvalidEncoding { offset: start }));
            }
            match String::from_utf8(raw) {
                Ok(s) => decoded.push(s),
                Err(_) => return Some(Err(RecordError::InvalidEncoding { offset: start })),
            }
        }

        Some(Ok(Record {
            fields: decoded,
            offset: start,
        }))
    }
}

fn is_numeric(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && value.bytes().any(|b| b.is_ascii_digit()) && value.parse::<f64>().is_ok()
}

fn names_unique_and_present(fields: &[String]) -> bool {
    let mut seen = HashSet::new();
    fields
        .iter()
        .all(|f| !f.trim().is_empty() && seen.insert(f.trim()))
}

/// Decides whether the first record is a header row.
///
/// A header is assumed when some column is non-numeric in the first record
/// but numeric in every later record, or when no column holds numbers at all
/// and the first record's names are present and unique.
pub fn looks_like_header(records: &[Vec<String>]) -> bool {
    let Some((first, rest)) = records.split_first() else {
        return false;
    };

    if rest.is_empty() {
        return names_unique_and_present(first) && !first.iter().any(|f| is_numeric(f));
    }

    let typed_column = (0..first.len()).any(|col| {
        !is_numeric(&first[col])
            && rest
                .iter()
                .all(|row| row.get(col).is_some_and(|v| is_numeric(v)))
    });
    if typed_column {
        return true;
    }

    let any_numeric = records.iter().flatten().any(|f| is_numeric(f));
    !any_numeric && names_unique_and_present(first)
}

/// Sniffs a dialect from complete lines of text.
///
/// A candidate delimiter qualifies when every sampled record splits into the
/// same number of fields, at least two. The widest split wins; ties go to the
/// earlier candidate.
pub fn sniff_dialect(text: &str) -> Option<DelimitedDialect> {
    let mut best: Option<(u8, usize, Vec<Vec<String>>)> = None;

    for &delimiter in &CANDIDATE_DELIMITERS {
        let mut reader = RecordReader::new(text.as_bytes(), delimiter);
        let mut records = Vec::new();
        while records.len() < SNIFF_RECORDS {
            match reader.next_record() {
                Some(Ok(record)) if record.is_blank() => continue,
                Some(Ok(record)) => records.push(record.fields),
                // The prefix may end inside a quoted field.
                Some(Err(_)) | None => break,
            }
        }

        let Some(columns) = records.first().map(Vec::len) else {
            continue;
        };
        if columns < 2 || records.iter().any(|r| r.len() != columns) {
            continue;
        }
        if best.as_ref().is_none_or(|(_, width, _)| columns > *width) {
            best = Some((delimiter, columns, records));
        }
    }

    best.map(|(delimiter, columns, records)| DelimitedDialect {
        delimiter,
        has_header: looks_like_header(&records),
        columns,
    })
}

/// Validates delimited text against a dialect.
pub struct DelimitedValidator;

impl DelimitedValidator {
    /// Creates a new delimited-text validator.
    pub fn new() -> Self {
        Self
    }

    /// Checks that every record has the same number of fields, quotes are
    /// balanced and the text decodes. Stops after `sample_rows` data records.
    pub fn validate(
        &self,
        source: &ArtifactSource,
        dialect: &DelimitedDialect,
        scope: ValidationScope,
        sample_rows: usize,
        ctx: &InspectionContext,
    ) -> Result<Findings> {
        let mut findings = Findings::default();
        let mut reader = RecordReader::new(ctx.guard(source.reader()?), dialect.delimiter);
        let mut expected: Option<usize> = None;
        let mut index: u64 = 0;
        let mut data_records: usize = 0;

        while let Some(next) = reader.next_record() {
            let record = match next {
                Ok(record) => record,
                Err(RecordError::UnterminatedQuote { offset }) => {
                    findings.push(
                        Diagnostic::error(
                            DiagnosticCode::UnterminatedQuote,
                            "quoted field is never closed before end of file",
                        )
                        .at_offset(offset)
                        .at_record(index),
                    );
                    break;
                }
                Err(RecordError::InvalidEncoding { offset }) => {
                    findings.push(
                        Diagnostic::error(
                            DiagnosticCode::InvalidEncoding,
                            "record is not valid UTF-8 text",
                        )
                        .at_offset(offset)
                        .at_record(index),
                    );
                    index += 1;
                    if findings.error_budget_spent() {
                        findings.sampled = true;
                        break;
                    }
                    continue;
                }
                Err(RecordError::Io(e)) => return Err(ctx.io_error(source.name(), e)),
            };

            if record.is_blank() {
                continue;
            }

            match expected {
                None => {
                    expected = Some(record.fields.len());
                    if dialect.has_header {
                        if scope.header {
                            check_header(&record, &mut findings);
                        }
                        index += 1;
                        continue;
                    }
                }
                Some(columns) if record.fields.len() != columns => {
                    findings.push(
                        Diagnostic::error(
                            DiagnosticCode::ColumnCount,
                            format!(
                                "record has {} fields, expected {}",
                                record.fields.len(),
                                columns
                            ),
                        )
                        .at_offset(record.offset)
                        .at_record(index),
                    );
                }
                Some(_) => {}
            }

            index += 1;
            data_records += 1;

            if findings.error_budget_spent() {
                findings.sampled = true;
                break;
            }
            if data_records >= sample_rows {
                let more = reader
                    .has_more()
                    .map_err(|e| ctx.io_error(source.name(), e))?;
                if more {
                    debug!(
                        artifact = source.name(),
                        records = data_records,
                        "stopping delimited validation at sample limit"
                    );
                    findings.sampled = true;
                    break;
                }
            }
            if index % 1024 == 0 {
                ctx.checkpoint()?;
            }
        }

        findings.bytes_checked = reader.offset();
        findings.records_checked = data_records as u64;
        Ok(findings)
    }
}

fn check_header(record: &Record, findings: &mut Findings) {
    let mut seen = HashSet::new();
    for (col, name) in record.fields.iter().enumerate() {
        let name = name.trim();
        if name.is_empty() {
            findings.push(
                Diagnostic::warning(
                    DiagnosticCode::BadHeader,
                    format!("column {} has an empty name", col),
                )
                .at_offset(record.offset)
                .at_record(0),
            );
        } else if !seen.insert(name) {
            findings.push(
                Diagnostic::warning(
                    DiagnosticCode::BadHeader,
                    format!("duplicate column name '{}'", name),
                )
                .at_offset(record.offset)
                .at_record(0),
            );
        }
    }
}

impl Default for DelimitedValidator {
    fn default() -> Self {
        Self::new()
    }
}
