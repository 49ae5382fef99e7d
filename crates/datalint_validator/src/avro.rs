//! Avro object container files.
//!
//! Layout: `Obj\x01`, a metadata map of zig-zag varint framed key/value
//! pairs, a 16-byte sync marker, then data blocks of
//! `(count, size, payload, sync)`.

use crate::{ArtifactSource, Findings, InspectionContext, ValidationScope};
use datalint_core::{DatasetType, Diagnostic, DiagnosticCode, Result};
use std::collections::BTreeMap;
use std::io::{self, BufRead, Read};
use thiserror::Error;

/// Avro container magic number.
pub const AVRO_MAGIC: &[u8] = b"Obj\x01";

const SYNC_LEN: usize = 16;

/// Codecs defined by the Avro specification.
const KNOWN_CODECS: [&str; 6] = ["null", "deflate", "snappy", "bzip2", "xz", "zstandard"];

/// Decoded container header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvroHeader {
    /// File metadata (`avro.schema`, `avro.codec`, user keys)
    pub metadata: BTreeMap<String, Vec<u8>>,
    /// Sync marker repeated after every data block
    pub sync: [u8; SYNC_LEN],
    /// Encoded header length in bytes
    pub len: usize,
}

impl AvroHeader {
    /// Raw `avro.schema` value.
    pub fn schema(&self) -> Option<&[u8]> {
        self.metadata.get("avro.schema").map(Vec::as_slice)
    }

    /// Declared codec; absent means `null`.
    pub fn codec(&self) -> String {
        self.metadata
            .get("avro.codec")
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .unwrap_or_else(|| "null".to_string())
    }
}

/// Why a header could not be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("missing Avro magic number")]
    BadMagic,

    #[error("header ends before its metadata map and sync marker")]
    Truncated,

    #[error("malformed header: {0}")]
    Malformed(String),
}

fn read_long(buf: &[u8], pos: &mut usize) -> std::result::Result<i64, HeaderError> {
    let mut raw: u64 = 0;
    for shift in (0..64).step_by(7) {
        let Some(&byte) = buf.get(*pos) else {
            return Err(HeaderError::Truncated);
        };
        *pos += 1;
        raw |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(zigzag(raw));
        }
    }
    Err(HeaderError::Malformed("varint longer than 10 bytes".to_string()))
}

fn zigzag(raw: u64) -> i64 {
    ((raw >> 1) as i64) ^ -((raw & 1) as i64)
}

fn read_bytes<'a>(buf: &'a [u8], pos: &mut usize) -> std::result::Result<&'a [u8], HeaderError> {
    let len = read_long(buf, pos)?;
    let len = usize::try_from(len)
        .map_err(|_| HeaderError::Malformed(format!("negative length {}", len)))?;
    let end = pos.checked_add(len).ok_or(HeaderError::Truncated)?;
    let slice = buf.get(*pos..end).ok_or(HeaderError::Truncated)?;
    *pos = end;
    Ok(slice)
}

/// Decodes a container header from the leading bytes of a file.
///
/// Returns [`HeaderError::Truncated`] when `buf` ends inside the header; the
/// caller may retry with a longer prefix.
pub fn parse_header(buf: &[u8]) -> std::result::Result<AvroHeader, HeaderError> {
    if buf.len() < AVRO_MAGIC.len() {
        return Err(HeaderError::Truncated);
    }
    if !buf.starts_with(AVRO_MAGIC) {
        return Err(HeaderError::BadMagic);
    }

    let mut pos = AVRO_MAGIC.len();
    let mut metadata = BTreeMap::new();
    loop {
        let mut count = read_long(buf, &mut pos)?;
        if count == 0 {
            break;
        }
        if count < 0 {
            count = -count;
            // Negative counts are followed by the block's byte size.
            read_long(buf, &mut pos)?;
        }
        for _ in 0..count {
            let key = read_bytes(buf, &mut pos)?;
            let key = std::str::from_utf8(key)
                .map_err(|_| HeaderError::Malformed("metadata key is not UTF-8".to_string()))?
                .to_string();
            let value = read_bytes(buf, &mut pos)?.to_vec();
            metadata.insert(key, value);
        }
    }

    let sync: [u8; SYNC_LEN] = buf
        .get(pos..pos + SYNC_LEN)
        .and_then(|s| s.try_into().ok())
        .ok_or(HeaderError::Truncated)?;

    Ok(AvroHeader {
        metadata,
        sync,
        len: pos + SYNC_LEN,
    })
}

/// Classifies content from an Avro schema: records are tabular, anything
/// else is an opaque blob.
pub fn schema_dataset_type(schema: &[u8]) -> DatasetType {
    match serde_json::from_slice::<serde_json::Value>(schema) {
        Ok(serde_json::Value::Object(map))
            if map.get("type").and_then(|t| t.as_str()) == Some("record") =>
        {
            DatasetType::Tabular
        }
        _ => DatasetType::Blob,
    }
}

/// Reads the header, growing the prefix until it fits.
pub fn read_header(source: &ArtifactSource) -> Result<std::result::Result<AvroHeader, HeaderError>> {
    let mut window = 4096usize;
    loop {
        let prefix = source.prefix(window)?;
        match parse_header(&prefix) {
            Err(HeaderError::Truncated) if (prefix.len() as u64) < source.len() => {
                window = window.saturating_mul(2);
            }
            other => return Ok(other),
        }
    }
}

/// Reads a zig-zag varint; `Ok(None)` on a clean end of input.
fn read_stream_long<R: BufRead>(reader: &mut R) -> io::Result<Option<i64>> {
    let mut raw: u64 = 0;
    for (i, shift) in (0..64).step_by(7).enumerate() {
        let mut byte = [0u8; 1];
        if reader.read(&mut byte)? == 0 {
            if i == 0 {
                return Ok(None);
            }
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        raw |= u64::from(byte[0] & 0x7f) << shift;
        if byte[0] & 0x80 == 0 {
            return Ok(Some(zigzag(raw)));
        }
    }
    Err(io::Error::new(io::ErrorKind::InvalidData, "varint too long"))
}

/// Validates Avro object container files.
pub struct AvroValidator;

impl AvroValidator {
    /// Creates a new Avro validator.
    pub fn new() -> Self {
        Self
    }

    /// Checks the header and walks data blocks, verifying every sync marker.
    ///
    /// Block payloads are not decoded, so the content layer adds nothing
    /// beyond the block walk.
    pub fn validate(
        &self,
        source: &ArtifactSource,
        scope: ValidationScope,
        sample_rows: usize,
        ctx: &InspectionContext,
    ) -> Result<Findings> {
        let mut findings = Findings::default();

        let header = match read_header(source)? {
            Ok(header) => header,
            Err(err) => {
                let code = match err {
                    HeaderError::BadMagic => DiagnosticCode::BadMagic,
                    HeaderError::Truncated => DiagnosticCode::Truncated,
                    HeaderError::Malformed(_) => DiagnosticCode::CorruptMetadata,
                };
                findings.push(Diagnostic::error(code, err.to_string()).at_offset(0));
                findings.bytes_checked = source.len();
                return Ok(findings);
            }
        };

        if scope.header {
            check_metadata(&header, &mut findings);
        }

        let mut reader = ctx.guard(source.reader()?);
        let skip = io::copy(&mut (&mut reader).take(header.len as u64), &mut io::sink())
            .map_err(|e| ctx.io_error(source.name(), e))?;
        let mut offset = skip;
        let mut records: u64 = 0;

        loop {
            ctx.checkpoint()?;
            let block_start = offset;

            let count = match read_block_long(&mut reader, &mut offset) {
                Ok(Some(count)) => count,
                Ok(None) => break,
                Err(e) => {
                    if let Some(diag) = block_diagnostic(&e, block_start) {
                        findings.push(diag);
                        break;
                    }
                    return Err(ctx.io_error(source.name(), e));
                }
            };
            let size = match read_block_long(&mut reader, &mut offset) {
                Ok(Some(size)) => size,
                Ok(None) => {
                    findings.push(truncated_block(block_start));
                    break;
                }
                Err(e) => {
                    if let Some(diag) = block_diagnostic(&e, block_start) {
                        findings.push(diag);
                        break;
                    }
                    return Err(ctx.io_error(source.name(), e));
                }
            };
            if count < 0 || size < 0 {
                findings.push(
                    Diagnostic::error(
                        DiagnosticCode::CorruptData,
                        format!("data block declares {} records in {} bytes", count, size),
                    )
                    .at_offset(block_start),
                );
                break;
            }

            let size = size as u64;
            let copied = io::copy(&mut (&mut reader).take(size), &mut io::sink())
                .map_err(|e| ctx.io_error(source.name(), e))?;
            offset += copied;
            if copied < size {
                findings.push(truncated_block(block_start));
                break;
            }

            let mut sync = [0u8; SYNC_LEN];
            let sync_offset = offset;
            match reader.read_exact(&mut sync) {
                Ok(()) => offset += SYNC_LEN as u64,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    findings.push(truncated_block(block_start));
                    break;
                }
                Err(e) => return Err(ctx.io_error(source.name(), e)),
            }
            if sync != header.sync {
                findings.push(
                    Diagnostic::error(
                        DiagnosticCode::CorruptData,
                        format!(
                            "sync marker after block at offset {} does not match the header",
                            block_start
                        ),
                    )
                    .at_offset(sync_offset),
                );
                break;
            }

            records += count as u64;
            if records >= sample_rows as u64 && offset < source.len() {
                findings.sampled = true;
                break;
            }
        }

        findings.bytes_checked = offset;
        findings.records_checked = records;
        Ok(findings)
    }
}

fn read_block_long<R: BufRead>(reader: &mut R, offset: &mut u64) -> io::Result<Option<i64>> {
    let mut counted = Counting { inner: reader, read: 0 };
    let value = read_stream_long(&mut counted);
    *offset += counted.read;
    value
}

fn block_diagnostic(err: &io::Error, block_start: u64) -> Option<Diagnostic> {
    match err.kind() {
        io::ErrorKind::UnexpectedEof => Some(truncated_block(block_start)),
        io::ErrorKind::InvalidData => Some(
            Diagnostic::error(DiagnosticCode::CorruptData, "malformed block header varint")
                .at_offset(block_start),
        ),
        _ => None,
    }
}

fn truncated_block(offset: u64) -> Diagnostic {
    Diagnostic::error(
        DiagnosticCode::Truncated,
        "data block is cut off by the end of the file",
    )
    .at_offset(offset)
}

fn check_metadata(header: &AvroHeader, findings: &mut Findings) {
    match header.schema() {
        None => findings.push(
            Diagnostic::error(DiagnosticCode::CorruptMetadata, "header has no avro.schema entry")
                .at_offset(0),
        ),
        Some(schema) => {
            if let Err(e) = serde_json::from_slice::<serde_json::Value>(schema) {
                findings.push(
                    Diagnostic::error(
                        DiagnosticCode::CorruptMetadata,
                        format!("avro.schema is not valid JSON: {}", e),
                    )
                    .at_offset(0),
                );
            }
        }
    }

    let codec = header.codec();
    if !KNOWN_CODECS.contains(&codec.as_str()) {
        findings.push(
            Diagnostic::warning(
                DiagnosticCode::UnsupportedFeature,
                format!("unknown codec '{}'", codec),
            )
            .at_offset(0),
        );
    }
}

/// Byte-counting reader adapter.
struct Counting<'a, R> {
    inner: &'a mut R,
    read: u64,
}

impl<R: Read> Read for Counting<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n as u64;
        Ok(n)
    }
}

impl<R: BufRead> BufRead for Counting<'_, R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.read += amt as u64;
        self.inner.consume(amt)
    }
}

impl Default for AvroValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalint_core::Artifact;
    use pretty_assertions::assert_eq;

    const SYNC: [u8; 16] = *b"0123456789abcdef";

    fn long(value: i64, out: &mut Vec<u8>) {
        let mut n = ((value << 1) ^ (value >> 63)) as u64;
        while n >= 0x80 {
            out.push((n as u8 & 0x7f) | 0x80);
            n >>= 7;
        }
        out.push(n as u8);
    }

    fn bytes(value: &[u8], out: &mut Vec<u8>) {
        long(value.len() as i64, out);
        out.extend_from_slice(value);
    }

    fn container(schema: &str, codec: &str, blocks: &[(i64, &[u8])]) -> Vec<u8> {
        let mut out = AVRO_MAGIC.to_vec();
        long(2, &mut out);
        bytes(b"avro.schema", &mut out);
        bytes(schema.as_bytes(), &mut out);
        bytes(b"avro.codec", &mut out);
        bytes(codec.as_bytes(), &mut out);
        long(0, &mut out);
        out.extend_from_slice(&SYNC);
        for (count, payload) in blocks {
            long(*count, &mut out);
            bytes(payload, &mut out);
            out.extend_from_slice(&SYNC);
        }
        out
    }

    const RECORD: &str = r#"{"type":"record","name":"r","fields":[{"name":"x","type":"long"}]}"#;

    fn validate(data: Vec<u8>, sample_rows: usize) -> Findings {
        let source = ArtifactSource::open(&Artifact::bytes("t.avro", data)).unwrap();
        AvroValidator::new()
            .validate(
                &source,
                ValidationScope::full(),
                sample_rows,
                &InspectionContext::new(),
            )
            .unwrap()
    }

    #[test]
    fn test_parse_header() {
        let data = container(RECORD, "null", &[]);
        let header = parse_header(&data).unwrap();
        assert_eq!(header.sync, SYNC);
        assert_eq!(header.len, data.len());
        assert_eq!(header.codec(), "null");
        assert_eq!(schema_dataset_type(header.schema().unwrap()), DatasetType::Tabular);
    }

    #[test]
    fn test_parse_header_truncated() {
        let data = container(RECORD, "null", &[]);
        assert_eq!(parse_header(&data[..20]), Err(HeaderError::Truncated));
        assert_eq!(parse_header(b"PAR1xxxx"), Err(HeaderError::BadMagic));
    }

    #[test]
    fn test_non_record_schema_is_blob() {
        assert_eq!(schema_dataset_type(br#""bytes""#), DatasetType::Blob);
        assert_eq!(schema_dataset_type(b"not json"), DatasetType::Blob);
    }

    #[test]
    fn test_valid_blocks() {
        let findings = validate(container(RECORD, "null", &[(2, &[2, 4]), (1, &[6])]), 100);
        assert!(findings.diagnostics.is_empty());
        assert_eq!(findings.records_checked, 3);
        assert!(!findings.sampled);
    }

    #[test]
    fn test_bad_sync_marker() {
        let mut data = container(RECORD, "null", &[(1, &[2])]);
        let last = data.len() - 1;
        data[last] ^= 0xff;
        let findings = validate(data, 100);
        assert_eq!(findings.diagnostics[0].code, DiagnosticCode::CorruptData);
    }

    #[test]
    fn test_truncated_block() {
        let mut data = container(RECORD, "null", &[(1, &[2, 4, 6, 8])]);
        data.truncate(data.len() - 18);
        let findings = validate(data, 100);
        assert_eq!(findings.diagnostics[0].code, DiagnosticCode::Truncated);
    }

    #[test]
    fn test_unknown_codec_is_warning() {
        let findings = validate(container(RECORD, "lz77", &[]), 100);
        assert_eq!(findings.diagnostics.len(), 1);
        assert!(!findings.has_errors());
    }

    #[test]
    fn test_sampling() {
        let findings = validate(container(RECORD, "null", &[(5, &[2]), (5, &[2])]), 5);
        assert!(findings.sampled);
        assert_eq!(findings.records_checked, 5);
    }
}
