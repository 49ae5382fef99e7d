//! Python-facing value types.
//!
//! Every class here is frozen: Python code sees immutable snapshots of
//! engine values and never shares mutable state with the engine.

use crate::errors::to_py_result;
use datalint_sdk as sdk;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use std::path::PathBuf;
use std::str::FromStr;

/// Physical dataset format.
#[pyclass(name = "DatasetFormat", module = "datalint_core", eq, eq_int, frozen, hash)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetFormat {
    Parquet,
    ArrowIpc,
    Avro,
    Orc,
    Png,
    Jpeg,
    Gif,
    JsonLines,
    Json,
    Tsv,
    Csv,
}

impl From<sdk::DatasetFormat> for DatasetFormat {
    fn from(format: sdk::DatasetFormat) -> Self {
        match format {
            sdk::DatasetFormat::Parquet => Self::Parquet,
            sdk::DatasetFormat::ArrowIpc => Self::ArrowIpc,
            sdk::DatasetFormat::Avro => Self::Avro,
            sdk::DatasetFormat::Orc => Self::Orc,
            sdk::DatasetFormat::Png => Self::Png,
            sdk::DatasetFormat::Jpeg => Self::Jpeg,
            sdk::DatasetFormat::Gif => Self::Gif,
            sdk::DatasetFormat::JsonLines => Self::JsonLines,
            sdk::DatasetFormat::Json => Self::Json,
            sdk::DatasetFormat::Tsv => Self::Tsv,
            sdk::DatasetFormat::Csv => Self::Csv,
        }
    }
}

impl From<DatasetFormat> for sdk::DatasetFormat {
    fn from(format: DatasetFormat) -> Self {
        match format {
            DatasetFormat::Parquet => Self::Parquet,
            DatasetFormat::ArrowIpc => Self::ArrowIpc,
            DatasetFormat::Avro => Self::Avro,
            DatasetFormat::Orc => Self::Orc,
            DatasetFormat::Png => Self::Png,
            DatasetFormat::Jpeg => Self::Jpeg,
            DatasetFormat::Gif => Self::Gif,
            DatasetFormat::JsonLines => Self::JsonLines,
            DatasetFormat::Json => Self::Json,
            DatasetFormat::Tsv => Self::Tsv,
            DatasetFormat::Csv => Self::Csv,
        }
    }
}

#[pymethods]
impl DatasetFormat {
    /// Parses a format name such as `"csv"`, `"jsonl"` or `"feather"`.
    #[staticmethod]
    fn parse(name: &str) -> PyResult<Self> {
        sdk::DatasetFormat::from_str(name)
            .map(Self::from)
            .map_err(PyValueError::new_err)
    }

    /// Stable lowercase name.
    #[getter]
    fn value(&self) -> &'static str {
        sdk::DatasetFormat::from(*self).as_str()
    }

    /// Conventional file extensions.
    #[getter]
    fn extensions(&self) -> Vec<&'static str> {
        sdk::DatasetFormat::from(*self).extensions().to_vec()
    }

    fn __str__(&self) -> &'static str {
        self.value()
    }
}

/// Shape of dataset content.
#[pyclass(name = "DatasetType", module = "datalint_core", eq, eq_int, frozen, hash)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetType {
    Tabular,
    Document,
    Annotations,
    Image,
    Blob,
}

impl From<sdk::DatasetType> for DatasetType {
    fn from(dataset_type: sdk::DatasetType) -> Self {
        match dataset_type {
            sdk::DatasetType::Tabular => Self::Tabular,
            sdk::DatasetType::Document => Self::Document,
            sdk::DatasetType::Annotations => Self::Annotations,
            sdk::DatasetType::Image => Self::Image,
            sdk::DatasetType::Blob => Self::Blob,
        }
    }
}

#[pymethods]
impl DatasetType {
    fn __str__(&self) -> &'static str {
        match self {
            Self::Tabular => "tabular",
            Self::Document => "document",
            Self::Annotations => "annotations",
            Self::Image => "image",
            Self::Blob => "blob",
        }
    }
}

/// An artifact plus the checks to run on it.
#[pyclass(name = "DatasetTask", module = "datalint_core", frozen)]
#[derive(Debug, Clone)]
pub struct DatasetTask {
    pub(crate) inner: sdk::DatasetTask,
}

#[pymethods]
impl DatasetTask {
    #[new]
    #[pyo3(signature = (path, checks=None, declared_format=None, sample_rows=None, strict=false, timeout_ms=None))]
    fn new(
        path: PathBuf,
        checks: Option<Vec<String>>,
        declared_format: Option<DatasetFormat>,
        sample_rows: Option<usize>,
        strict: bool,
        timeout_ms: Option<u64>,
    ) -> PyResult<Self> {
        let mut options = sdk::InspectionOptions::new().with_strict(strict);
        if let Some(rows) = sample_rows {
            options = options.with_sample_rows(rows);
        }
        if let Some(ms) = timeout_ms {
            options = options.with_timeout(std::time::Duration::from_millis(ms));
        }

        let checks = checks
            .unwrap_or_default()
            .iter()
            .map(|name| sdk::Check::from_str(name).map_err(PyValueError::new_err))
            .collect::<PyResult<Vec<_>>>()?;

        let mut builder = sdk::DatasetTask::builder(sdk::Artifact::path(path))
            .checks(checks)
            .options(options);
        if let Some(format) = declared_format {
            builder = builder.declared_format(format.into());
        }
        Ok(Self {
            inner: builder.build(),
        })
    }

    #[getter]
    fn path(&self) -> String {
        self.inner.artifact().display_name()
    }

    #[getter]
    fn checks(&self) -> Vec<&'static str> {
        self.inner.checks().iter().map(sdk::Check::as_str).collect()
    }

    #[getter]
    fn declared_format(&self) -> Option<DatasetFormat> {
        self.inner.declared_format().map(DatasetFormat::from)
    }

    fn __repr__(&self) -> String {
        format!(
            "DatasetTask(path={:?}, checks={:?})",
            self.path(),
            self.checks()
        )
    }
}

/// Content fingerprint of an artifact.
#[pyclass(name = "Fingerprint", module = "datalint_core", frozen, eq)]
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    pub(crate) inner: sdk::Fingerprint,
}

#[pymethods]
impl Fingerprint {
    #[getter]
    fn algorithm(&self) -> &'static str {
        self.inner.algorithm.as_str()
    }

    #[getter]
    fn digest(&self) -> String {
        self.inner.digest.clone()
    }

    #[getter]
    fn size(&self) -> u64 {
        self.inner.size
    }

    fn __str__(&self) -> String {
        self.inner.to_string()
    }
}

/// Result of validating an artifact against a format.
#[pyclass(name = "ValidationResult", module = "datalint_core", frozen)]
#[derive(Debug, Clone)]
pub struct ValidationResult {
    inner: sdk::ValidationResult,
}

impl From<sdk::ValidationResult> for ValidationResult {
    fn from(inner: sdk::ValidationResult) -> Self {
        Self { inner }
    }
}

#[pymethods]
impl ValidationResult {
    #[getter]
    fn format(&self) -> DatasetFormat {
        self.inner.format.into()
    }

    /// `"valid"`, `"partial"` or `"mismatch"`.
    #[getter]
    fn status(&self) -> &'static str {
        match self.inner.status {
            sdk::ValidationStatus::Valid => "valid",
            sdk::ValidationStatus::Partial { .. } => "partial",
            sdk::ValidationStatus::Mismatch => "mismatch",
        }
    }

    /// Checked share of the artifact, for partial results.
    #[getter]
    fn confidence(&self) -> Option<f64> {
        match self.inner.status {
            sdk::ValidationStatus::Partial { confidence } => Some(confidence),
            _ => None,
        }
    }

    #[getter]
    fn passed(&self) -> bool {
        self.inner.passed()
    }

    #[getter]
    fn errors(&self) -> Vec<String> {
        self.inner.errors().map(ToString::to_string).collect()
    }

    #[getter]
    fn warnings(&self) -> Vec<String> {
        self.inner.warnings().map(ToString::to_string).collect()
    }

    #[getter]
    fn records_checked(&self) -> u64 {
        self.inner.stats.records_checked
    }

    fn to_json(&self) -> PyResult<String> {
        serde_json::to_string(&self.inner)
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    fn __repr__(&self) -> String {
        format!(
            "ValidationResult(format={:?}, status={:?}, diagnostics={})",
            self.inner.format.as_str(),
            self.status(),
            self.inner.diagnostics.len()
        )
    }
}

/// Everything one task produced.
#[pyclass(name = "InspectionOutcome", module = "datalint_core", frozen)]
#[derive(Debug, Clone)]
pub struct InspectionOutcome {
    inner: sdk::InspectionOutcome,
}

impl From<sdk::InspectionOutcome> for InspectionOutcome {
    fn from(inner: sdk::InspectionOutcome) -> Self {
        Self { inner }
    }
}

#[pymethods]
impl InspectionOutcome {
    #[getter]
    fn fingerprint(&self) -> Option<Fingerprint> {
        self.inner.fingerprint.clone().map(|inner| Fingerprint { inner })
    }

    #[getter]
    fn format(&self) -> Option<DatasetFormat> {
        self.inner.format().map(DatasetFormat::from)
    }

    #[getter]
    fn dataset_type(&self) -> Option<DatasetType> {
        match &self.inner.verdict {
            Some(sdk::FormatVerdict::Detected(report)) => Some(report.dataset_type.into()),
            _ => None,
        }
    }

    #[getter]
    fn validation(&self) -> Option<ValidationResult> {
        self.inner.validation.clone().map(ValidationResult::from)
    }

    #[getter]
    fn passed(&self) -> bool {
        self.inner.passed()
    }

    fn to_json(&self) -> PyResult<String> {
        serde_json::to_string(&self.inner)
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }
}

/// Detects the format of a file.
///
/// Raises:
///     OSError: If the file cannot be read
///     ValueError: If no known format matches
#[pyfunction]
pub fn get_dataset_format(py: Python<'_>, path: PathBuf) -> PyResult<DatasetFormat> {
    let format = py.detach(|| sdk::get_dataset_format(&path));
    to_py_result(format).map(DatasetFormat::from)
}

/// Validates a file against a format with the structure and header checks.
///
/// A mismatch is reported in the result, not raised.
#[pyfunction]
pub fn validate_dataset_format(
    py: Python<'_>,
    path: PathBuf,
    format: DatasetFormat,
) -> PyResult<ValidationResult> {
    let result = py.detach(|| sdk::validate_dataset_format(&path, format.into()));
    to_py_result(result).map(ValidationResult::from)
}
