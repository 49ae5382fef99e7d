//! Dataset format and content classification.
//!
//! A dataset artifact is described along two independent axes: its physical
//! encoding ([`DatasetFormat`]) and the shape of what it holds
//! ([`DatasetType`]). A JSON Lines file can hold a flat table or nested
//! documents; an Avro file can hold records or opaque bytes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Recognized physical dataset formats.
///
/// The variant order is the detector priority order used by the sniffer:
/// binary formats with a fixed magic number first, then text formats from the
/// most to the least specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetFormat {
    /// Apache Parquet columnar format
    Parquet,
    /// Apache Arrow IPC file format (Feather v2)
    ArrowIpc,
    /// Apache Avro object container file
    Avro,
    /// Apache ORC columnar format
    Orc,
    /// PNG image
    Png,
    /// JPEG image
    Jpeg,
    /// GIF image
    Gif,
    /// Newline-delimited JSON
    JsonLines,
    /// Single JSON document
    Json,
    /// Tab-separated values
    Tsv,
    /// Comma (or `;`/`|`) separated values
    Csv,
}

impl DatasetFormat {
    /// Every format in detector priority order.
    pub const ALL: [DatasetFormat; 11] = [
        DatasetFormat::Parquet,
        DatasetFormat::ArrowIpc,
        DatasetFormat::Avro,
        DatasetFormat::Orc,
        DatasetFormat::Png,
        DatasetFormat::Jpeg,
        DatasetFormat::Gif,
        DatasetFormat::JsonLines,
        DatasetFormat::Json,
        DatasetFormat::Tsv,
        DatasetFormat::Csv,
    ];

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetFormat::Parquet => "parquet",
            DatasetFormat::ArrowIpc => "arrow_ipc",
            DatasetFormat::Avro => "avro",
            DatasetFormat::Orc => "orc",
            DatasetFormat::Png => "png",
            DatasetFormat::Jpeg => "jpeg",
            DatasetFormat::Gif => "gif",
            DatasetFormat::JsonLines => "json_lines",
            DatasetFormat::Json => "json",
            DatasetFormat::Tsv => "tsv",
            DatasetFormat::Csv => "csv",
        }
    }

    /// Conventional file extensions, lowercase, without the dot.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            DatasetFormat::Parquet => &["parquet", "pq"],
            DatasetFormat::ArrowIpc => &["arrow", "feather", "ipc"],
            DatasetFormat::Avro => &["avro"],
            DatasetFormat::Orc => &["orc"],
            DatasetFormat::Png => &["png"],
            DatasetFormat::Jpeg => &["jpg", "jpeg"],
            DatasetFormat::Gif => &["gif"],
            DatasetFormat::JsonLines => &["jsonl", "ndjson"],
            DatasetFormat::Json => &["json"],
            DatasetFormat::Tsv => &["tsv", "tab"],
            DatasetFormat::Csv => &["csv"],
        }
    }

    /// Format conventionally named by a file extension, case-insensitive.
    pub fn from_extension(extension: &str) -> Option<Self> {
        let extension = extension.to_lowercase();
        DatasetFormat::ALL
            .into_iter()
            .find(|format| format.extensions().contains(&extension.as_str()))
    }

    /// Whether the format is a binary encoding.
    pub fn is_binary(&self) -> bool {
        !matches!(
            self,
            DatasetFormat::JsonLines | DatasetFormat::Json | DatasetFormat::Tsv | DatasetFormat::Csv
        )
    }

    /// Whether the format is an image encoding.
    pub fn is_image(&self) -> bool {
        matches!(
            self,
            DatasetFormat::Png | DatasetFormat::Jpeg | DatasetFormat::Gif
        )
    }
}

impl fmt::Display for DatasetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        match normalized.as_str() {
            "parquet" | "pq" => Ok(DatasetFormat::Parquet),
            "arrow_ipc" | "arrow" | "feather" | "ipc" => Ok(DatasetFormat::ArrowIpc),
            "avro" => Ok(DatasetFormat::Avro),
            "orc" => Ok(DatasetFormat::Orc),
            "png" => Ok(DatasetFormat::Png),
            "jpeg" | "jpg" => Ok(DatasetFormat::Jpeg),
            "gif" => Ok(DatasetFormat::Gif),
            "json_lines" | "jsonl" | "ndjson" => Ok(DatasetFormat::JsonLines),
            "json" => Ok(DatasetFormat::Json),
            "tsv" | "tab" => Ok(DatasetFormat::Tsv),
            "csv" => Ok(DatasetFormat::Csv),
            other => Err(format!("unknown dataset format '{}'", other)),
        }
    }
}

/// Classification of dataset content, independent of the physical format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetType {
    /// Records sharing one set of columns
    Tabular,
    /// Nested or heterogeneous structured documents
    Document,
    /// COCO-style annotation document (`images` + `annotations`)
    Annotations,
    /// Raster image
    Image,
    /// Opaque payload without record structure
    Blob,
}

impl DatasetType {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetType::Tabular => "tabular",
            DatasetType::Document => "document",
            DatasetType::Annotations => "annotations",
            DatasetType::Image => "image",
            DatasetType::Blob => "blob",
        }
    }
}

impl fmt::Display for DatasetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dialect of a delimited-text artifact as observed by the sniffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DelimitedDialect {
    /// Field separator byte
    pub delimiter: u8,
    /// Whether the first record looks like a header row
    pub has_header: bool,
    /// Number of fields per record
    pub columns: usize,
}

impl DelimitedDialect {
    /// Default dialect for a delimited format when nothing was sniffed.
    pub fn for_format(format: DatasetFormat) -> Self {
        let delimiter = if format == DatasetFormat::Tsv {
            b'\t'
        } else {
            b','
        };
        Self {
            delimiter,
            has_header: true,
            columns: 0,
        }
    }
}

/// What the sniffer found out about an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SniffReport {
    /// Detected physical format
    pub format: DatasetFormat,
    /// Detected content classification
    pub dataset_type: DatasetType,
    /// Dialect, for delimited text only
    pub dialect: Option<DelimitedDialect>,
    /// Number of bytes the detectors looked at
    pub bytes_inspected: u64,
}
