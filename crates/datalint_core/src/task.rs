//! Inspection task descriptors.
//!
//! A [`DatasetTask`] says *what* to check: which artifact, which checks, an
//! optional declared format and the inspection options. It is built once and
//! never mutated; the engine and the cache only read it.

use crate::DatasetFormat;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of records validated before a result becomes partial.
pub const DEFAULT_SAMPLE_ROWS: usize = 10_000;

/// Default number of leading bytes examined by the sniffer.
pub const DEFAULT_SNIFF_BYTES: usize = 64 * 1024;

/// Default timeout for one inspection pass, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// A dataset artifact submitted for inspection.
#[derive(Clone, PartialEq)]
pub enum Artifact {
    /// File on the local filesystem
    Path(PathBuf),
    /// In-memory byte buffer with a display name
    Bytes {
        /// Name used in diagnostics and errors
        name: String,
        /// Artifact content
        data: Bytes,
    },
}

impl Artifact {
    /// Creates a file artifact.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Artifact::Path(path.into())
    }

    /// Creates an in-memory artifact.
    pub fn bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Artifact::Bytes {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Drains a stream into an in-memory artifact.
    pub fn from_reader(name: impl Into<String>, mut reader: impl Read) -> crate::Result<Self> {
        let name = name.into();
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .map_err(|e| crate::DatalintError::read(name.clone(), e))?;
        Ok(Artifact::bytes(name, buf))
    }

    /// Name used in diagnostics and errors.
    pub fn display_name(&self) -> String {
        match self {
            Artifact::Path(path) => path.display().to_string(),
            Artifact::Bytes { name, .. } => name.clone(),
        }
    }

    /// Filesystem path, if the artifact lives on disk.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Artifact::Path(path) => Some(path),
            Artifact::Bytes { .. } => None,
        }
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Artifact::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Artifact::Bytes { name, data } => f
                .debug_struct("Bytes")
                .field("name", name)
                .field("len", &data.len())
                .finish(),
        }
    }
}

impl From<PathBuf> for Artifact {
    fn from(path: PathBuf) -> Self {
        Artifact::Path(path)
    }
}

impl From<&Path> for Artifact {
    fn from(path: &Path) -> Self {
        Artifact::Path(path.to_path_buf())
    }
}

/// A check that can be requested for an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    /// Classify the artifact's format and content type
    DetectFormat,
    /// Magic numbers, trailers, framing and record shape
    Structure,
    /// Headers, schemas and metadata blocks
    Header,
    /// Decode the payload itself
    Content,
}

impl Check {
    /// Checks run when a task does not name any.
    pub const DEFAULT: [Check; 3] = [Check::DetectFormat, Check::Structure, Check::Header];

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Check::DetectFormat => "detect_format",
            Check::Structure => "structure",
            Check::Header => "header",
            Check::Content => "content",
        }
    }
}

impl std::str::FromStr for Check {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "detect_format" | "detect" | "sniff" => Ok(Check::DetectFormat),
            "structure" => Ok(Check::Structure),
            "header" => Ok(Check::Header),
            "content" => Ok(Check::Content),
            other => Err(format!("unknown check '{}'", other)),
        }
    }
}

/// Tuning knobs for one inspection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectionOptions {
    /// Records validated before the result is reported as partial
    pub sample_rows: usize,

    /// Leading bytes examined by the sniffer
    pub sniff_bytes: usize,

    /// Upper bound for one inspection pass, in milliseconds
    pub timeout_ms: u64,

    /// Treat warnings as failures
    pub strict: bool,
}

impl Default for InspectionOptions {
    fn default() -> Self {
        Self {
            sample_rows: DEFAULT_SAMPLE_ROWS,
            sniff_bytes: DEFAULT_SNIFF_BYTES,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            strict: false,
        }
    }
}

impl InspectionOptions {
    /// Creates options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the record sample size.
    pub fn with_sample_rows(mut self, rows: usize) -> Self {
        self.sample_rows = rows;
        self
    }

    /// Sets the sniffer prefix length.
    pub fn with_sniff_bytes(mut self, bytes: usize) -> Self {
        self.sniff_bytes = bytes;
        self
    }

    /// Sets the inspection timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets strict mode.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Inspection timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// The outcome-relevant part of a task, used as half of a cache key.
///
/// Everything that can change an inspection result for the same bytes is in
/// here; the timeout is not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckProfile {
    /// Sorted, de-duplicated checks
    pub checks: Vec<Check>,
    /// Format the caller declared, if any
    pub declared_format: Option<DatasetFormat>,
    /// Record sample size
    pub sample_rows: usize,
    /// Sniffer prefix length
    pub sniff_bytes: usize,
    /// Strict mode
    pub strict: bool,
}

/// A unit of inspection work.
///
/// # Example
///
/// ```rust
/// use datalint_core::{Check, DatasetFormat, DatasetTask};
///
/// let task = DatasetTask::builder("data/events.csv")
///     .check(Check::Structure)
///     .check(Check::Header)
///     .declared_format(DatasetFormat::Csv)
///     .build();
///
/// assert_eq!(task.declared_format(), Some(DatasetFormat::Csv));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetTask {
    artifact: Artifact,
    checks: Vec<Check>,
    declared_format: Option<DatasetFormat>,
    options: InspectionOptions,
}

impl DatasetTask {
    /// Creates a task running the default checks.
    pub fn new(artifact: impl Into<Artifact>) -> Self {
        DatasetTaskBuilder::new(artifact).build()
    }

    /// Creates a builder for a task.
    pub fn builder(artifact: impl Into<Artifact>) -> DatasetTaskBuilder {
        DatasetTaskBuilder::new(artifact)
    }

    /// The artifact to inspect.
    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    /// Requested checks, sorted and de-duplicated.
    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    /// Whether a check was requested.
    pub fn wants(&self, check: Check) -> bool {
        self.checks.contains(&check)
    }

    /// Format declared by the caller.
    pub fn declared_format(&self) -> Option<DatasetFormat> {
        self.declared_format
    }

    /// Inspection options.
    pub fn options(&self) -> &InspectionOptions {
        &self.options
    }

    /// The part of the task that determines the outcome for given bytes.
    pub fn check_profile(&self) -> CheckProfile {
        CheckProfile {
            checks: self.checks.clone(),
            declared_format: self.declared_format,
            sample_rows: self.options.sample_rows,
            sniff_bytes: self.options.sniff_bytes,
            strict: self.options.strict,
        }
    }
}

impl From<&str> for Artifact {
    fn from(path: &str) -> Self {
        Artifact::Path(PathBuf::from(path))
    }
}

/// Builder for [`DatasetTask`].
#[derive(Debug)]
pub struct DatasetTaskBuilder {
    artifact: Artifact,
    checks: Vec<Check>,
    declared_format: Option<DatasetFormat>,
    options: InspectionOptions,
}

impl DatasetTaskBuilder {
    /// Creates a builder for the given artifact.
    pub fn new(artifact: impl Into<Artifact>) -> Self {
        Self {
            artifact: artifact.into(),
            checks: Vec::new(),
            declared_format: None,
            options: InspectionOptions::default(),
        }
    }

    /// Adds a check.
    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    /// Adds several checks.
    pub fn checks(mut self, checks: impl IntoIterator<Item = Check>) -> Self {
        self.checks.extend(checks);
        self
    }

    /// Declares the expected format; validation then uses it instead of the
    /// detected one.
    pub fn declared_format(mut self, format: DatasetFormat) -> Self {
        self.declared_format = Some(format);
        self
    }

    /// Sets the inspection options.
    pub fn options(mut self, options: InspectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the task.
    pub fn build(self) -> DatasetTask {
        let mut checks = if self.checks.is_empty() {
            Check::DEFAULT.to_vec()
        } else {
            self.checks
        };
        checks.sort();
        checks.dedup();

        DatasetTask {
            artifact: self.artifact,
            checks,
            declared_format: self.declared_format,
            options: self.options,
        }
    }
}
