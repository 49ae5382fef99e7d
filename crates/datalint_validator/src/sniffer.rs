//! Format detection.
//!
//! The sniffer reads a bounded prefix of an artifact and offers it to an
//! ordered list of [`FormatDetector`]s. The first detector in priority order
//! that accepts the prefix decides the format; later detectors never run.

use crate::avro::{self, AVRO_MAGIC};
use crate::columnar::{ARROW_MAGIC, ORC_MAGIC, PARQUET_MAGIC};
use crate::delimited::sniff_dialect;
use crate::raster::{JPEG_SOI, PNG_SIGNATURE};
use crate::{ArtifactSource, InspectionContext};
use datalint_core::{
    DatasetFormat, DatasetType, DelimitedDialect, FormatVerdict, Result, SniffReport,
};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::debug;

const BOM: &str = "\u{feff}";

/// Lines examined by the JSON Lines detector.
const JSONL_SAMPLE_LINES: usize = 100;

/// A positive detection.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Detected format
    pub format: DatasetFormat,
    /// Content classification
    pub dataset_type: DatasetType,
    /// Dialect, for delimited text
    pub dialect: Option<DelimitedDialect>,
}

impl Detection {
    fn new(format: DatasetFormat, dataset_type: DatasetType) -> Self {
        Self {
            format,
            dataset_type,
            dialect: None,
        }
    }
}

/// The bytes a detector gets to look at.
#[derive(Debug)]
pub struct Sample<'a> {
    bytes: &'a [u8],
    total_len: u64,
    text: Option<&'a str>,
}

impl<'a> Sample<'a> {
    /// Wraps a prefix of an artifact of `total_len` bytes.
    pub fn new(bytes: &'a [u8], total_len: u64) -> Self {
        let truncated = (bytes.len() as u64) < total_len;
        Self {
            bytes,
            total_len,
            text: decode_text(bytes, truncated),
        }
    }

    /// Raw prefix bytes.
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Whether the prefix is shorter than the artifact.
    pub fn is_truncated(&self) -> bool {
        (self.bytes.len() as u64) < self.total_len
    }

    /// The prefix as text, without a byte order mark, when it is UTF-8 text.
    pub fn text(&self) -> Option<&'a str> {
        self.text
    }

    /// The text up to the last complete line.
    ///
    /// For a prefix cut at the sniff boundary the final, partial line is
    /// dropped; otherwise this is the whole text.
    pub fn complete_lines(&self) -> Option<&'a str> {
        let text = self.text?;
        if !self.is_truncated() {
            return Some(text);
        }
        text.rfind('\n').map(|end| &text[..=end])
    }
}

fn decode_text(bytes: &[u8], truncated: bool) -> Option<&str> {
    if bytes.contains(&0) {
        return None;
    }
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        // A multi-byte character cut at the sniff boundary.
        Err(e) if truncated && e.error_len().is_none() => {
            std::str::from_utf8(&bytes[..e.valid_up_to()]).ok()?
        }
        Err(_) => return None,
    };
    Some(text.strip_prefix(BOM).unwrap_or(text))
}

/// One format detector in the sniffer chain.
pub trait FormatDetector: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Inspects the sample; `None` declines.
    fn detect(&self, sample: &Sample<'_>) -> Option<Detection>;
}

/// Detects a format by a fixed magic number at offset 0.
pub struct MagicDetector {
    name: &'static str,
    format: DatasetFormat,
    dataset_type: DatasetType,
    magics: &'static [&'static [u8]],
}

impl MagicDetector {
    /// Creates a detector matching any of `magics`.
    pub const fn new(
        name: &'static str,
        format: DatasetFormat,
        dataset_type: DatasetType,
        magics: &'static [&'static [u8]],
    ) -> Self {
        Self {
            name,
            format,
            dataset_type,
            magics,
        }
    }
}

impl FormatDetector for MagicDetector {
    fn name(&self) -> &'static str {
        self.name
    }

    fn detect(&self, sample: &Sample<'_>) -> Option<Detection> {
        self.magics
            .iter()
            .any(|magic| sample.bytes().starts_with(magic))
            .then(|| Detection::new(self.format, self.dataset_type))
    }
}

/// Detects Avro containers and classifies them by their schema.
pub struct AvroDetector;

impl FormatDetector for AvroDetector {
    fn name(&self) -> &'static str {
        "avro"
    }

    fn detect(&self, sample: &Sample<'_>) -> Option<Detection> {
        if !sample.bytes().starts_with(AVRO_MAGIC) {
            return None;
        }
        let dataset_type = avro::parse_header(sample.bytes())
            .ok()
            .and_then(|header| header.schema().map(avro::schema_dataset_type))
            .unwrap_or(DatasetType::Blob);
        Some(Detection::new(DatasetFormat::Avro, dataset_type))
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// Detects newline-delimited JSON.
///
/// Requires at least two complete non-empty lines, each a JSON value, the
/// first of them an object.
pub struct JsonLinesDetector;

impl FormatDetector for JsonLinesDetector {
    fn name(&self) -> &'static str {
        "json_lines"
    }

    fn detect(&self, sample: &Sample<'_>) -> Option<Detection> {
        let text = sample.complete_lines()?;
        let mut values = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            if values.len() == JSONL_SAMPLE_LINES {
                break;
            }
            values.push(serde_json::from_str::<Value>(line).ok()?);
        }
        if values.len() < 2 || !values[0].is_object() {
            return None;
        }

        let keys = |v: &Value| {
            v.as_object()
                .map(|o| o.keys().cloned().collect::<BTreeSet<_>>())
        };
        let first_keys = keys(&values[0]);
        let tabular = values.iter().all(|v| {
            keys(v) == first_keys
                && v.as_object()
                    .is_some_and(|o| o.values().all(is_scalar))
        });

        let dataset_type = if tabular {
            DatasetType::Tabular
        } else {
            DatasetType::Document
        };
        Some(Detection::new(DatasetFormat::JsonLines, dataset_type))
    }
}

/// Detects a single JSON document.
pub struct JsonDetector;

impl JsonDetector {
    fn classify(value: &Value) -> DatasetType {
        match value {
            Value::Object(map)
                if map.get("images").is_some_and(Value::is_array)
                    && map.get("annotations").is_some_and(Value::is_array) =>
            {
                DatasetType::Annotations
            }
            Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => {
                DatasetType::Tabular
            }
            _ => DatasetType::Document,
        }
    }

    /// Classification from a prefix that does not parse on its own.
    fn classify_prefix(text: &str) -> DatasetType {
        if text.starts_with('{') && text.contains("\"images\"") && text.contains("\"annotations\"")
        {
            DatasetType::Annotations
        } else if text.starts_with('[') && text[1..].trim_start().starts_with('{') {
            DatasetType::Tabular
        } else {
            DatasetType::Document
        }
    }
}

impl FormatDetector for JsonDetector {
    fn name(&self) -> &'static str {
        "json"
    }

    fn detect(&self, sample: &Sample<'_>) -> Option<Detection> {
        let text = sample.text()?.trim_start();
        if !(text.starts_with('{') || text.starts_with('[')) {
            return None;
        }

        let dataset_type = match serde_json::from_str::<Value>(text) {
            Ok(value) => Self::classify(&value),
            Err(e) if sample.is_truncated() && e.is_eof() => Self::classify_prefix(text),
            Err(_) => return None,
        };
        Some(Detection::new(DatasetFormat::Json, dataset_type))
    }
}

/// Detects delimited text from delimiter statistics.
pub struct DelimitedDetector;

impl FormatDetector for DelimitedDetector {
    fn name(&self) -> &'static str {
        "delimited"
    }

    fn detect(&self, sample: &Sample<'_>) -> Option<Detection> {
        let dialect = sniff_dialect(sample.complete_lines()?)?;
        let format = if dialect.delimiter == b'\t' {
            DatasetFormat::Tsv
        } else {
            DatasetFormat::Csv
        };
        Some(Detection {
            format,
            dataset_type: DatasetType::Tabular,
            dialect: Some(dialect),
        })
    }
}

static PARQUET: MagicDetector = MagicDetector::new(
    "parquet",
    DatasetFormat::Parquet,
    DatasetType::Tabular,
    &[PARQUET_MAGIC],
);
static ARROW_IPC: MagicDetector = MagicDetector::new(
    "arrow_ipc",
    DatasetFormat::ArrowIpc,
    DatasetType::Tabular,
    &[ARROW_MAGIC],
);
static ORC: MagicDetector =
    MagicDetector::new("orc", DatasetFormat::Orc, DatasetType::Tabular, &[ORC_MAGIC]);
static PNG: MagicDetector =
    MagicDetector::new("png", DatasetFormat::Png, DatasetType::Image, &[PNG_SIGNATURE]);
static JPEG: MagicDetector =
    MagicDetector::new("jpeg", DatasetFormat::Jpeg, DatasetType::Image, &[JPEG_SOI]);
static GIF: MagicDetector = MagicDetector::new(
    "gif",
    DatasetFormat::Gif,
    DatasetType::Image,
    &[b"GIF87a", b"GIF89a"],
);

/// Runs the detector chain over an artifact prefix.
pub struct Sniffer {
    detectors: Vec<&'static dyn FormatDetector>,
}

impl Sniffer {
    /// Creates a sniffer with the built-in detectors in priority order.
    pub fn new() -> Self {
        Self {
            detectors: vec![
                &PARQUET,
                &ARROW_IPC,
                &AvroDetector,
                &ORC,
                &PNG,
                &JPEG,
                &GIF,
                &JsonLinesDetector,
                &JsonDetector,
                &DelimitedDetector,
            ],
        }
    }

    /// Detector names in priority order.
    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// Classifies a prefix of an artifact of `total_len` bytes.
    pub fn sniff_bytes(&self, bytes: &[u8], total_len: u64) -> FormatVerdict {
        if total_len == 0 {
            return FormatVerdict::Unrecognized {
                reason: "artifact is empty".to_string(),
            };
        }

        let sample = Sample::new(bytes, total_len);
        for detector in &self.detectors {
            if let Some(detection) = detector.detect(&sample) {
                debug!(
                    detector = detector.name(),
                    format = %detection.format,
                    "format detected"
                );
                return FormatVerdict::Detected(SniffReport {
                    format: detection.format,
                    dataset_type: detection.dataset_type,
                    dialect: detection.dialect,
                    bytes_inspected: bytes.len() as u64,
                });
            }
        }

        let reason = if sample.text().is_none() {
            "no known magic number and content is not text"
        } else {
            "text content matches no known layout"
        };
        FormatVerdict::Unrecognized {
            reason: reason.to_string(),
        }
    }

    /// Reads at most `sniff_bytes` leading bytes of a source and classifies
    /// them.
    pub fn sniff_source(
        &self,
        source: &ArtifactSource,
        sniff_bytes: usize,
        ctx: &InspectionContext,
    ) -> Result<FormatVerdict> {
        ctx.checkpoint()?;
        let prefix = source.prefix(sniff_bytes.max(1))?;
        Ok(self.sniff_bytes(&prefix, source.len()))
    }
}

impl Default for Sniffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sniff(bytes: &[u8]) -> FormatVerdict {
        Sniffer::new().sniff_bytes(bytes, bytes.len() as u64)
    }

    fn detected(bytes: &[u8]) -> SniffReport {
        match sniff(bytes) {
            FormatVerdict::Detected(report) => report,
            other => panic!("expected a detection, got {:?}", other),
        }
    }

    #[test]
    fn test_priority_order() {
        assert_eq!(
            Sniffer::new().detector_names(),
            vec![
                "parquet",
                "arrow_ipc",
                "avro",
                "orc",
                "png",
                "jpeg",
                "gif",
                "json_lines",
                "json",
                "delimited"
            ]
        );
    }

    #[test]
    fn test_empty_is_unrecognized() {
        assert_eq!(
            sniff(b""),
            FormatVerdict::Unrecognized {
                reason: "artifact is empty".to_string()
            }
        );
    }

    #[test]
    fn test_binary_noise_is_unrecognized() {
        let verdict = sniff(&[0x00, 0x13, 0x37, 0x00, 0xfe]);
        assert!(matches!(verdict, FormatVerdict::Unrecognized { .. }));
    }

    #[test]
    fn test_magic_numbers() {
        assert_eq!(detected(b"PAR1....").format, DatasetFormat::Parquet);
        assert_eq!(detected(b"ARROW1\0\0").format, DatasetFormat::ArrowIpc);
        assert_eq!(detected(b"ORC\x00").format, DatasetFormat::Orc);
        assert_eq!(detected(b"GIF89a\x01\x00").dataset_type, DatasetType::Image);
        assert_eq!(detected(&[0xFF, 0xD8, 0xFF, 0xE0]).format, DatasetFormat::Jpeg);
    }

    #[test]
    fn test_avro_with_unreadable_header_is_blob() {
        let report = detected(b"Obj\x01\x7f");
        assert_eq!(report.format, DatasetFormat::Avro);
        assert_eq!(report.dataset_type, DatasetType::Blob);
    }

    #[test]
    fn test_json_lines_tabular_and_document() {
        let flat = detected(b"{\"a\":1,\"b\":\"x\"}\n{\"a\":2,\"b\":\"y\"}\n");
        assert_eq!(flat.format, DatasetFormat::JsonLines);
        assert_eq!(flat.dataset_type, DatasetType::Tabular);

        let nested = detected(b"{\"a\":{\"b\":1}}\n{\"c\":[1,2]}\n");
        assert_eq!(nested.format, DatasetFormat::JsonLines);
        assert_eq!(nested.dataset_type, DatasetType::Document);
    }

    #[test]
    fn test_single_json_line_is_json() {
        let report = detected(b"{\"a\":1}\n");
        assert_eq!(report.format, DatasetFormat::Json);
    }

    #[test]
    fn test_json_classification() {
        let coco = detected(br#"{"images":[{"id":1}],"annotations":[],"categories":[]}"#);
        assert_eq!(coco.dataset_type, DatasetType::Annotations);

        let rows = detected(br#"[{"id":1},{"id":2}]"#);
        assert_eq!(rows.dataset_type, DatasetType::Tabular);

        let doc = detected(br#"{"name":"x","tags":["a"]}"#);
        assert_eq!(doc.dataset_type, DatasetType::Document);
    }

    #[test]
    fn test_truncated_json_prefix() {
        let full = br#"[{"id":1},{"id":2},{"id":3}]"#;
        let verdict = Sniffer::new().sniff_bytes(&full[..12], 10_000);
        assert_eq!(verdict.format(), Some(DatasetFormat::Json));
    }

    #[test]
    fn test_broken_json_is_not_json() {
        assert!(matches!(sniff(b"{ nope"), FormatVerdict::Unrecognized { .. }));
    }

    #[test]
    fn test_csv_and_tsv() {
        let csv = detected(b"id,name,score\n1,ada,0.9\n2,grace,0.8\n");
        assert_eq!(csv.format, DatasetFormat::Csv);
        assert_eq!(
            csv.dialect,
            Some(DelimitedDialect {
                delimiter: b',',
                has_header: true,
                columns: 3
            })
        );

        let tsv = detected(b"id\tname\n1\tada\n2\tgrace\n");
        assert_eq!(tsv.format, DatasetFormat::Tsv);
    }

    #[test]
    fn test_bom_is_skipped() {
        let report = detected("\u{feff}id,name\n1,ada\n".as_bytes());
        assert_eq!(report.format, DatasetFormat::Csv);
    }

    #[test]
    fn test_cut_multibyte_character_is_tolerated() {
        let text = "id,name\n1,zoë\n2,zoë\n".as_bytes();
        // Cut inside the final 'ë'.
        let cut = text.len() - 2;
        let verdict = Sniffer::new().sniff_bytes(&text[..cut], text.len() as u64);
        assert_eq!(verdict.format(), Some(DatasetFormat::Csv));
    }

    #[test]
    fn test_sniffing_is_deterministic() {
        let bytes = b"a;b\n1;2\n";
        assert_eq!(sniff(bytes), sniff(bytes));
    }
}
