//! Columnar container formats: Parquet, Arrow IPC and ORC.
//!
//! The structural layer checks magic numbers and footer framing directly on
//! the file bytes. Header and content layers decode footers with the Arrow
//! and Parquet readers.

use crate::{ArtifactSource, Findings, InspectionContext, ValidationScope};
use datalint_core::{Diagnostic, DiagnosticCode, Result};
use parquet::errors::ParquetError;
use parquet::file::reader::{ChunkReader, FileReader, SerializedFileReader};
use std::io::{BufReader, Cursor};
use tracing::debug;

/// Parquet magic, at both ends of the file.
pub const PARQUET_MAGIC: &[u8] = b"PAR1";

/// Arrow IPC file magic, at both ends of the file.
pub const ARROW_MAGIC: &[u8] = b"ARROW1";

/// ORC magic at the start of the file.
pub const ORC_MAGIC: &[u8] = b"ORC";

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// The file ended before the trailer could be read, usually because it
/// shrank after it was opened.
fn short_tail(len: u64, read: usize, wanted: usize) -> Diagnostic {
    let offset = len.saturating_sub(wanted as u64);
    Diagnostic::error(
        DiagnosticCode::Truncated,
        format!(
            "expected {} trailer bytes at offset {}, read {}",
            wanted, offset, read
        ),
    )
    .at_offset(offset)
}

/// Validates Parquet files.
pub struct ParquetValidator;

impl ParquetValidator {
    /// Creates a new Parquet validator.
    pub fn new() -> Self {
        Self
    }

    /// Checks both magic numbers and the footer length, then decodes the
    /// footer metadata when headers or content are requested.
    pub fn validate(
        &self,
        source: &ArtifactSource,
        scope: ValidationScope,
        ctx: &InspectionContext,
    ) -> Result<Findings> {
        let mut findings = Findings::whole(source.len());
        let len = source.len();

        if len < 12 {
            findings.push(
                Diagnostic::error(
                    DiagnosticCode::Truncated,
                    format!("{} bytes is too short for a Parquet file", len),
                )
                .at_offset(0),
            );
            return Ok(findings);
        }

        if source.prefix(4)? != PARQUET_MAGIC {
            findings.push(
                Diagnostic::error(DiagnosticCode::BadMagic, "missing PAR1 magic at offset 0")
                    .at_offset(0),
            );
            return Ok(findings);
        }

        let tail = source.tail(8)?;
        if tail.len() < 8 {
            findings.push(short_tail(len, tail.len(), 8));
            return Ok(findings);
        }
        if &tail[4..] != PARQUET_MAGIC {
            let offset = len - 4;
            findings.push(
                Diagnostic::error(
                    DiagnosticCode::CorruptTrailer,
                    format!("missing PAR1 trailer at offset {}", offset),
                )
                .at_offset(offset),
            );
            return Ok(findings);
        }

        let footer_len = u64::from(le_u32(&tail));
        if footer_len == 0 || footer_len + 12 > len {
            let offset = len - 8;
            findings.push(
                Diagnostic::error(
                    DiagnosticCode::CorruptTrailer,
                    format!(
                        "footer length {} at offset {} does not fit in a {} byte file",
                        footer_len, offset, len
                    ),
                )
                .at_offset(offset),
            );
            return Ok(findings);
        }

        if !(scope.header || scope.content) {
            return Ok(findings);
        }
        ctx.checkpoint()?;

        match source.open_file()? {
            Some(file) => check_parquet_footer(
                SerializedFileReader::new(file),
                source,
                footer_len,
                scope,
                ctx,
                &mut findings,
            )?,
            None => check_parquet_footer(
                SerializedFileReader::new(source.to_bytes()?),
                source,
                footer_len,
                scope,
                ctx,
                &mut findings,
            )?,
        }

        Ok(findings)
    }
}

fn check_parquet_footer<R: ChunkReader + 'static>(
    opened: std::result::Result<SerializedFileReader<R>, ParquetError>,
    source: &ArtifactSource,
    footer_len: u64,
    scope: ValidationScope,
    ctx: &InspectionContext,
    findings: &mut Findings,
) -> Result<()> {
    let len = source.len();
    let data_end = len - 8 - footer_len;
    let reader = match opened {
        Ok(reader) => reader,
        Err(e) => {
            findings.push(
                Diagnostic::error(
                    DiagnosticCode::CorruptMetadata,
                    format!("footer metadata does not decode: {}", e),
                )
                .at_offset(data_end),
            );
            return Ok(());
        }
    };

    let metadata = reader.metadata();
    let file_meta = metadata.file_metadata();
    findings.records_checked = u64::try_from(file_meta.num_rows()).unwrap_or(0);

    if scope.header && file_meta.schema_descr().num_columns() == 0 {
        findings.push(Diagnostic::warning(
            DiagnosticCode::CorruptMetadata,
            "schema has no columns",
        ));
    }

    if scope.content {
        for (group, row_group) in metadata.row_groups().iter().enumerate() {
            ctx.checkpoint()?;
            for column in row_group.columns() {
                let (start, size) = column.byte_range();
                let fits = start >= 4 && start.checked_add(size).is_some_and(|e| e <= data_end);
                if !fits {
                    findings.push(
                        Diagnostic::error(
                            DiagnosticCode::CorruptData,
                            format!(
                                "column chunk '{}' in row group {} spans bytes {}..{} outside the data region",
                                column.column_path().string(),
                                group,
                                start,
                                start.saturating_add(size)
                            ),
                        )
                        .at_offset(start),
                    );
                }
            }
        }
        debug!(
            artifact = source.name(),
            row_groups = metadata.num_row_groups(),
            "checked parquet column chunk ranges"
        );
    }

    Ok(())
}

impl Default for ParquetValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Validates Arrow IPC files.
pub struct ArrowIpcValidator;

impl ArrowIpcValidator {
    /// Creates a new Arrow IPC validator.
    pub fn new() -> Self {
        Self
    }

    /// Checks both magic numbers and the footer length, then decodes the
    /// schema (headers) and every record batch (content).
    pub fn validate(
        &self,
        source: &ArtifactSource,
        scope: ValidationScope,
        ctx: &InspectionContext,
    ) -> Result<Findings> {
        let mut findings = Findings::whole(source.len());
        let len = source.len();

        // Leading magic padded to 8 bytes, footer length, trailing magic.
        if len < 18 {
            findings.push(
                Diagnostic::error(
                    DiagnosticCode::Truncated,
                    format!("{} bytes is too short for an Arrow IPC file", len),
                )
                .at_offset(0),
            );
            return Ok(findings);
        }

        if source.prefix(6)? != ARROW_MAGIC {
            findings.push(
                Diagnostic::error(DiagnosticCode::BadMagic, "missing ARROW1 magic at offset 0")
                    .at_offset(0),
            );
            return Ok(findings);
        }

        let tail = source.tail(10)?;
        if tail.len() < 10 {
            findings.push(short_tail(len, tail.len(), 10));
            return Ok(findings);
        }
        if &tail[4..] != ARROW_MAGIC {
            let offset = len - 6;
            findings.push(
                Diagnostic::error(
                    DiagnosticCode::CorruptTrailer,
                    format!("missing ARROW1 trailer at offset {}", offset),
                )
                .at_offset(offset),
            );
            return Ok(findings);
        }

        let footer_len = i32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
        let fits = footer_len > 0 && (footer_len as u64) + 18 <= len;
        if !fits {
            let offset = len - 10;
            findings.push(
                Diagnostic::error(
                    DiagnosticCode::CorruptTrailer,
                    format!(
                        "footer length {} at offset {} does not fit in a {} byte file",
                        footer_len, offset, len
                    ),
                )
                .at_offset(offset),
            );
            return Ok(findings);
        }

        if !(scope.header || scope.content) {
            return Ok(findings);
        }
        ctx.checkpoint()?;

        match source.open_file()? {
            Some(file) => read_ipc(
                arrow_ipc::reader::FileReader::try_new(BufReader::new(file), None),
                scope,
                ctx,
                &mut findings,
            )?,
            None => read_ipc(
                arrow_ipc::reader::FileReader::try_new(Cursor::new(source.to_bytes()?), None),
                scope,
                ctx,
                &mut findings,
            )?,
        }

        Ok(findings)
    }
}

fn read_ipc<R: std::io::Read + std::io::Seek>(
    opened: std::result::Result<arrow_ipc::reader::FileReader<R>, arrow_schema::ArrowError>,
    scope: ValidationScope,
    ctx: &InspectionContext,
    findings: &mut Findings,
) -> Result<()> {
    let reader = match opened {
        Ok(reader) => reader,
        Err(e) => {
            findings.push(Diagnostic::error(
                DiagnosticCode::CorruptMetadata,
                format!("footer or schema does not decode: {}", e),
            ));
            return Ok(());
        }
    };

    if scope.header && reader.schema().fields().is_empty() {
        findings.push(Diagnostic::warning(
            DiagnosticCode::CorruptMetadata,
            "schema has no fields",
        ));
    }

    if scope.content {
        let mut rows = 0u64;
        for (index, batch) in reader.enumerate() {
            ctx.checkpoint()?;
            match batch {
                Ok(batch) => rows += batch.num_rows() as u64,
                Err(e) => {
                    findings.push(Diagnostic::error(
                        DiagnosticCode::CorruptData,
                        format!("record batch {} does not decode: {}", index, e),
                    ));
                    break;
                }
            }
        }
        findings.records_checked = rows;
    }

    Ok(())
}

impl Default for ArrowIpcValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads a protobuf varint.
fn read_varint(buf: &[u8], pos: &mut usize) -> Option<u64> {
    let mut value = 0u64;
    for shift in (0..64).step_by(7) {
        let byte = *buf.get(*pos)?;
        *pos += 1;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Some(value);
        }
    }
    None
}

/// Extracts the footer length (field 1) from an ORC postscript.
fn postscript_footer_len(postscript: &[u8]) -> Option<u64> {
    let mut pos = 0;
    while pos < postscript.len() {
        let key = read_varint(postscript, &mut pos)?;
        match (key >> 3, key & 0x7) {
            (1, 0) => return read_varint(postscript, &mut pos),
            (_, 0) => {
                read_varint(postscript, &mut pos)?;
            }
            (_, 1) => pos += 8,
            (_, 2) => {
                let len = usize::try_from(read_varint(postscript, &mut pos)?).ok()?;
                pos = pos.checked_add(len)?;
            }
            (_, 5) => pos += 4,
            _ => return None,
        }
    }
    None
}

/// Validates ORC files.
pub struct OrcValidator;

impl OrcValidator {
    /// Creates a new ORC validator.
    pub fn new() -> Self {
        Self
    }

    /// Checks the leading magic and the postscript framing at the file tail.
    pub fn validate(
        &self,
        source: &ArtifactSource,
        scope: ValidationScope,
        _ctx: &InspectionContext,
    ) -> Result<Findings> {
        let mut findings = Findings::whole(source.len());
        let len = source.len();

        if source.prefix(3)? != ORC_MAGIC {
            findings.push(
                Diagnostic::error(DiagnosticCode::BadMagic, "missing ORC magic at offset 0")
                    .at_offset(0),
            );
            return Ok(findings);
        }

        // The postscript is at most 255 bytes, followed by its length byte.
        let tail = source.tail(256)?;
        let wanted = usize::try_from(len.min(256)).unwrap_or(256);
        if tail.len() < wanted {
            findings.push(short_tail(len, tail.len(), wanted));
            return Ok(findings);
        }
        let Some(&ps_len) = tail.last() else {
            return Ok(findings);
        };
        let ps_len = usize::from(ps_len);
        let len_offset = len - 1;
        if ps_len == 0 || (ps_len as u64) + 1 + 3 > len {
            findings.push(
                Diagnostic::error(
                    DiagnosticCode::CorruptTrailer,
                    format!(
                        "postscript length {} at offset {} does not fit",
                        ps_len, len_offset
                    ),
                )
                .at_offset(len_offset),
            );
            return Ok(findings);
        }

        let postscript = &tail[tail.len() - 1 - ps_len..tail.len() - 1];
        let ps_offset = len - 1 - ps_len as u64;
        if !postscript.windows(3).any(|w| w == ORC_MAGIC) {
            findings.push(
                Diagnostic::error(
                    DiagnosticCode::CorruptTrailer,
                    format!("postscript at offset {} has no ORC magic", ps_offset),
                )
                .at_offset(ps_offset),
            );
            return Ok(findings);
        }

        if scope.header {
            match postscript_footer_len(postscript) {
                Some(footer_len) if footer_len + ps_len as u64 + 1 + 3 <= len => {}
                Some(footer_len) => findings.push(
                    Diagnostic::error(
                        DiagnosticCode::CorruptMetadata,
                        format!("footer length {} does not fit in a {} byte file", footer_len, len),
                    )
                    .at_offset(ps_offset),
                ),
                None => findings.push(
                    Diagnostic::error(
                        DiagnosticCode::CorruptMetadata,
                        "postscript does not declare a footer length",
                    )
                    .at_offset(ps_offset),
                ),
            }
        }

        Ok(findings)
    }
}

impl Default for OrcValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::{Int64Array, RecordBatch, StringArray};
    use arrow_schema::{DataType, Field, Schema};
    use datalint_core::Artifact;
    use parquet::arrow::ArrowWriter;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])),
                Arc::new(StringArray::from(vec!["a", "b", "c"])),
            ],
        )
        .unwrap()
    }

    fn parquet_bytes() -> Vec<u8> {
        let batch = batch();
        let mut buf = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
        buf
    }

    fn arrow_bytes() -> Vec<u8> {
        let batch = batch();
        let mut buf = Vec::new();
        {
            let mut writer =
                arrow_ipc::writer::FileWriter::try_new(&mut buf, &batch.schema()).unwrap();
            writer.write(&batch).unwrap();
            writer.finish().unwrap();
        }
        buf
    }

    fn orc_bytes() -> Vec<u8> {
        let footer = [0u8; 5];
        let postscript = [0x08, 0x05, 0x10, 0x00, 0x82, 0xF4, 0x03, 0x03, b'O', b'R', b'C'];
        let mut out = ORC_MAGIC.to_vec();
        out.extend_from_slice(&footer);
        out.extend_from_slice(&postscript);
        out.push(postscript.len() as u8);
        out
    }

    fn source(data: Vec<u8>) -> ArtifactSource {
        ArtifactSource::open(&Artifact::bytes("t", data)).unwrap()
    }

    #[test]
    fn test_valid_parquet() {
        let findings = ParquetValidator::new()
            .validate(&source(parquet_bytes()), ValidationScope::full(), &InspectionContext::new())
            .unwrap();
        assert!(findings.diagnostics.is_empty(), "{:?}", findings.diagnostics);
        assert_eq!(findings.records_checked, 3);
    }

    #[test]
    fn test_truncated_parquet_cites_trailer_offset() {
        let mut data = parquet_bytes();
        data.truncate(data.len() - 10);
        let expected = data.len() as u64 - 4;
        let findings = ParquetValidator::new()
            .validate(&source(data), ValidationScope::full(), &InspectionContext::new())
            .unwrap();
        assert_eq!(findings.diagnostics.len(), 1);
        assert_eq!(findings.diagnostics[0].code, DiagnosticCode::CorruptTrailer);
        assert_eq!(findings.diagnostics[0].offset, Some(expected));
        assert!(findings.diagnostics[0].message.contains(&expected.to_string()));
    }

    #[test]
    fn test_parquet_footer_length_out_of_range() {
        let mut data = parquet_bytes();
        let at = data.len() - 8;
        data[at..at + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        let findings = ParquetValidator::new()
            .validate(&source(data), ValidationScope::full(), &InspectionContext::new())
            .unwrap();
        assert_eq!(findings.diagnostics[0].offset, Some(at as u64));
    }

    fn shrunk_after_open(data: &[u8]) -> (tempfile::NamedTempFile, ArtifactSource) {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();
        let source = ArtifactSource::open(&Artifact::path(file.path())).unwrap();
        file.as_file().set_len(16).unwrap();
        (file, source)
    }

    #[test]
    fn test_parquet_shrunk_after_open_is_truncated() {
        let (_file, source) = shrunk_after_open(&parquet_bytes());
        let findings = ParquetValidator::new()
            .validate(&source, ValidationScope::full(), &InspectionContext::new())
            .unwrap();
        assert_eq!(findings.diagnostics.len(), 1);
        assert_eq!(findings.diagnostics[0].code, DiagnosticCode::Truncated);
        assert_eq!(findings.diagnostics[0].offset, Some(source.len() - 8));
    }

    #[test]
    fn test_arrow_ipc_shrunk_after_open_is_truncated() {
        let (_file, source) = shrunk_after_open(&arrow_bytes());
        let findings = ArrowIpcValidator::new()
            .validate(&source, ValidationScope::full(), &InspectionContext::new())
            .unwrap();
        assert_eq!(findings.diagnostics.len(), 1);
        assert_eq!(findings.diagnostics[0].code, DiagnosticCode::Truncated);
    }

    #[test]
    fn test_orc_shrunk_after_open_is_truncated() {
        let mut data = orc_bytes();
        data.resize(64, 0);
        let (_file, source) = shrunk_after_open(&data);
        let findings = OrcValidator::new()
            .validate(&source, ValidationScope::full(), &InspectionContext::new())
            .unwrap();
        assert_eq!(findings.diagnostics.len(), 1);
        assert_eq!(findings.diagnostics[0].code, DiagnosticCode::Truncated);
    }

    #[test]
    fn test_valid_arrow_ipc() {
        let findings = ArrowIpcValidator::new()
            .validate(&source(arrow_bytes()), ValidationScope::full(), &InspectionContext::new())
            .unwrap();
        assert!(findings.diagnostics.is_empty(), "{:?}", findings.diagnostics);
        assert_eq!(findings.records_checked, 3);
    }

    #[test]
    fn test_arrow_ipc_missing_trailer() {
        let mut data = arrow_bytes();
        data.truncate(data.len() - 3);
        let findings = ArrowIpcValidator::new()
            .validate(&source(data), ValidationScope::full(), &InspectionContext::new())
            .unwrap();
        assert_eq!(findings.diagnostics[0].code, DiagnosticCode::CorruptTrailer);
    }

    #[test]
    fn test_orc_postscript() {
        let findings = OrcValidator::new()
            .validate(&source(orc_bytes()), ValidationScope::full(), &InspectionContext::new())
            .unwrap();
        assert!(findings.diagnostics.is_empty(), "{:?}", findings.diagnostics);
    }

    #[test]
    fn test_orc_bad_postscript_length() {
        let mut data = orc_bytes();
        let last = data.len() - 1;
        data[last] = 200;
        let findings = OrcValidator::new()
            .validate(&source(data), ValidationScope::full(), &InspectionContext::new())
            .unwrap();
        assert_eq!(findings.diagnostics[0].code, DiagnosticCode::CorruptTrailer);
    }

    #[test]
    fn test_postscript_footer_len() {
        assert_eq!(postscript_footer_len(&[0x08, 0x2A, 0x10, 0x01]), Some(42));
        assert_eq!(postscript_footer_len(&[0x10, 0x01]), None);
    }
}
