//! # Datalint Validator
//!
//! Format detection and structural validation for dataset artifacts.
//!
//! This crate provides the synchronous half of the datalint engine:
//!
//! - **Sniffer**: ordered detector chain over a bounded prefix
//! - **Validators**: one per format family (delimited text, JSON, columnar,
//!   Avro, raster images), each reporting diagnostics with byte offsets
//! - **Inspector**: runs a [`datalint_core::DatasetTask`] end to end
//!
//! Everything here is blocking I/O and CPU work. Long passes poll an
//! [`InspectionContext`] so that callers can cancel them.

pub mod artifact;
pub mod avro;
pub mod columnar;
pub mod context;
pub mod delimited;
pub mod engine;
pub mod findings;
pub mod json;
pub mod raster;
pub mod sniffer;

pub use artifact::{ArtifactSource, FileStamp};
pub use avro::AvroValidator;
pub use columnar::{ArrowIpcValidator, OrcValidator, ParquetValidator};
pub use context::{Guarded, InspectionContext};
pub use delimited::{DelimitedValidator, RecordReader};
pub use engine::{Inspect, Inspector};
pub use findings::{Findings, ValidationScope, MAX_ERRORS};
pub use json::{JsonLinesValidator, JsonValidator};
pub use raster::ImageValidator;
pub use sniffer::{Detection, FormatDetector, Sample, Sniffer};
