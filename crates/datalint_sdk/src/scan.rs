//! Directory scanning.
//!
//! Walks a dataset root, inspects every regular file and records the outcome
//! per file together with the split (`train`, `val`, `test`) inferred from
//! its directory. Files that cannot be read or recognized are recorded, they
//! never abort the scan. Files with an image extension are fully decoded.

use datalint_cache::Cache;
use datalint_core::{
    Artifact, Check, DatalintError, DatasetFormat, DatasetTask, ImageInfo, InspectionOptions,
    InspectionOutcome, Result,
};
use datalint_validator::{Inspector, InspectionContext};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Number of files inspected at once by [`scan_dataset_cached`].
pub const DEFAULT_SCAN_CONCURRENCY: usize = 8;

/// Dataset split a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    /// Training data
    Train,
    /// Validation data
    Val,
    /// Test data
    Test,
    /// No split, or an ambiguous one
    Unknown,
}

impl Split {
    /// Infers the split from a directory relative to the dataset root.
    ///
    /// The lowercased directory must mention exactly one of `train`, `val`
    /// and `test`; anything else, including the root itself (`""`), is
    /// [`Split::Unknown`].
    pub fn infer(relative_dir: &str) -> Self {
        let lower = relative_dir.to_lowercase();
        let matches: Vec<Split> = [
            ("train", Split::Train),
            ("val", Split::Val),
            ("test", Split::Test),
        ]
        .into_iter()
        .filter(|(needle, _)| lower.contains(needle))
        .map(|(_, split)| split)
        .collect();

        match matches.as_slice() {
            [only] => *only,
            _ => Split::Unknown,
        }
    }

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
            Split::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scan result for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannedFile {
    /// Path relative to the scan root, with `/` separators
    pub relative_path: String,
    /// Inferred split
    pub split: Split,
    /// File size in bytes
    pub size: u64,
    /// Inspection outcome, when the inspection ran
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub outcome: Option<InspectionOutcome>,
    /// Why the inspection did not run
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    /// Decoded geometry, for images
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub image: Option<ImageInfo>,
    /// An image-named file that did not decode
    #[serde(default)]
    pub is_corrupted: bool,
}

impl ScannedFile {
    /// Returns true when the file was inspected and passed.
    pub fn is_valid(&self) -> bool {
        self.error.is_none() && self.outcome.as_ref().is_some_and(InspectionOutcome::passed)
    }
}

/// Result of scanning a dataset directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Scan root as given
    pub root: PathBuf,
    /// Per-file results, sorted by relative path
    pub files: Vec<ScannedFile>,
}

impl ScanReport {
    /// Number of files that failed inspection or validation.
    pub fn invalid_count(&self) -> usize {
        self.files.iter().filter(|f| !f.is_valid()).count()
    }

    /// Returns true when every file passed.
    pub fn is_clean(&self) -> bool {
        self.invalid_count() == 0
    }

    /// File count per split.
    pub fn by_split(&self) -> BTreeMap<Split, usize> {
        let mut counts = BTreeMap::new();
        for file in &self.files {
            *counts.entry(file.split).or_insert(0) += 1;
        }
        counts
    }
}

struct Candidate {
    path: PathBuf,
    relative_path: String,
    size: u64,
}

impl Candidate {
    fn is_image(&self) -> bool {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(DatasetFormat::from_extension)
            .is_some_and(|format| format.is_image())
    }

    fn task(&self, options: &InspectionOptions) -> DatasetTask {
        let mut checks = vec![Check::DetectFormat, Check::Structure, Check::Header];
        if self.is_image() {
            checks.push(Check::Content);
        }
        DatasetTask::builder(Artifact::path(&self.path))
            .checks(checks)
            .options(options.clone())
            .build()
    }

    fn record(self, result: Result<InspectionOutcome>) -> ScannedFile {
        let (outcome, error) = match result {
            Ok(outcome) => (Some(outcome), None),
            Err(e) => {
                debug!(path = %self.relative_path, error = %e, "file not inspected");
                (None, Some(e.to_string()))
            }
        };
        let image = outcome
            .as_ref()
            .and_then(|o| o.validation.as_ref())
            .and_then(|v| v.stats.image);
        let is_corrupted = self.is_image() && image.is_none();
        if is_corrupted {
            debug!(path = %self.relative_path, "image did not decode");
        }
        ScannedFile {
            split: split_of(&self.relative_path),
            relative_path: self.relative_path,
            size: self.size,
            outcome,
            error,
            image,
            is_corrupted,
        }
    }
}

/// Split of a `/`-separated relative file path, judged by its directory only.
fn split_of(relative_path: &str) -> Split {
    let dir = relative_path.rsplit_once('/').map_or("", |(dir, _)| dir);
    Split::infer(dir)
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

fn collect_candidates(root: &Path) -> Result<Vec<Candidate>> {
    let meta = std::fs::metadata(root)
        .map_err(|e| DatalintError::read(root.display().to_string(), e))?;
    if !meta.is_dir() {
        return Err(DatalintError::read(
            root.display().to_string(),
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
        ));
    }

    let mut candidates = Vec::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let relative_path = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        candidates.push(Candidate {
            path: entry.into_path(),
            relative_path,
            size,
        });
    }
    Ok(candidates)
}

fn finish(root: &Path, mut files: Vec<ScannedFile>) -> ScanReport {
    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    let report = ScanReport {
        root: root.to_path_buf(),
        files,
    };
    info!(
        root = %root.display(),
        files = report.files.len(),
        invalid = report.invalid_count(),
        "dataset scan finished"
    );
    report
}

/// Scans a dataset directory, inspecting files in parallel.
///
/// Every file runs format detection plus the structure and header checks
/// with `options`; image files also run the content check. A missing or
/// non-directory root is a [`DatalintError::Read`].
pub fn scan_dataset(root: impl AsRef<Path>, options: &InspectionOptions) -> Result<ScanReport> {
    let root = root.as_ref();
    let candidates = collect_candidates(root)?;
    let inspector = Inspector::new();
    let ctx = InspectionContext::new();

    let files: Vec<ScannedFile> = candidates
        .into_par_iter()
        .map(|candidate| {
            let result = inspector.inspect(&candidate.task(options), &ctx);
            candidate.record(result)
        })
        .collect();

    Ok(finish(root, files))
}

/// Scans a dataset directory through a shared result cache.
///
/// Files with identical bytes are inspected once. At most `concurrency`
/// files are in flight at a time.
pub async fn scan_dataset_cached(
    root: impl AsRef<Path>,
    options: &InspectionOptions,
    cache: Arc<Cache>,
    concurrency: usize,
) -> Result<ScanReport> {
    let root = root.as_ref();
    let candidates = collect_candidates(root)?;
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut set = JoinSet::new();

    for candidate in candidates {
        let cache = Arc::clone(&cache);
        let permits = Arc::clone(&permits);
        let task = candidate.task(options);
        set.spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(_permit) => cache
                    .get_or_compute(&task)
                    .await
                    .map(|outcome| (*outcome).clone()),
                Err(_) => Err(DatalintError::Cancelled),
            };
            candidate.record(result)
        });
    }

    let mut files = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(file) => files.push(file),
            Err(e) => return Err(DatalintError::internal(format!("scan task failed: {}", e))),
        }
    }

    Ok(finish(root, files))
}
