//! On-disk cache snapshots.
//!
//! A snapshot is one JSON document holding the engine version it was written
//! by and the stored entries, oldest first. Snapshots from another engine
//! version are never loaded.

use crate::cache::CacheKey;
use chrono::{DateTime, Utc};
use datalint_core::{DatalintError, InspectionOutcome, Result, ENGINE_VERSION};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SnapshotEntry {
    pub key: CacheKey,
    pub outcome: InspectionOutcome,
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    pub engine_version: String,
    pub saved_at: DateTime<Utc>,
    pub entries: Vec<SnapshotEntry>,
}

impl Snapshot {
    pub fn new(entries: Vec<SnapshotEntry>) -> Self {
        Self {
            engine_version: ENGINE_VERSION.to_string(),
            saved_at: Utc::now(),
            entries,
        }
    }

    pub fn is_current(&self) -> bool {
        self.engine_version == ENGINE_VERSION
    }

    pub fn read(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)
            .map_err(|e| DatalintError::read(path.display().to_string(), e))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Writes next to the target and renames, so a crash never leaves a
    /// half-written snapshot behind.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| snapshot_io(path, e))?;
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = Path::new(&tmp);

        let file = fs::File::create(tmp).map_err(|e| snapshot_io(tmp, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush().map_err(|e| snapshot_io(tmp, e))?;
        drop(writer);

        fs::rename(tmp, path).map_err(|e| snapshot_io(path, e))
    }
}

fn snapshot_io(path: &Path, err: std::io::Error) -> DatalintError {
    DatalintError::snapshot(format!("{}: {}", path.display(), err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        Snapshot::new(Vec::new()).write(&path).unwrap();
        let back = Snapshot::read(&path).unwrap();
        assert!(back.is_current());
        assert!(back.entries.is_empty());
        assert!(!dir.path().join("nested").join("cache.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Snapshot::read(&path),
            Err(DatalintError::Snapshot(_))
        ));
    }

    #[test]
    fn test_other_version_is_not_current() {
        let mut snapshot = Snapshot::new(Vec::new());
        snapshot.engine_version = "0.0.0-old".to_string();
        assert_eq!(snapshot.is_current(), false);
    }
}
