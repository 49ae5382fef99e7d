//! Read access to dataset artifacts.
//!
//! An [`ArtifactSource`] is an opened artifact: it knows its length and hands
//! out bounded reads (prefix, tail, ranges) and streaming readers. It never
//! writes to the artifact.

use datalint_core::{Artifact, DatalintError, Result};
use bytes::Bytes;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Size and modification time of an on-disk artifact.
///
/// Used to detect that a file changed while it was being inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    /// File length in bytes
    pub len: u64,
    /// Last modification time, when the platform reports one
    pub modified: Option<SystemTime>,
}

impl FileStamp {
    /// Reads the stamp of an artifact; in-memory artifacts have none.
    pub fn of(artifact: &Artifact) -> Result<Option<FileStamp>> {
        match artifact {
            Artifact::Path(path) => {
                let meta = std::fs::metadata(path)
                    .map_err(|e| DatalintError::read(path.display().to_string(), e))?;
                Ok(Some(FileStamp {
                    len: meta.len(),
                    modified: meta.modified().ok(),
                }))
            }
            Artifact::Bytes { .. } => Ok(None),
        }
    }
}

#[derive(Debug, Clone)]
enum Backing {
    File(PathBuf),
    Memory(Bytes),
}

/// An opened, read-only artifact.
#[derive(Debug, Clone)]
pub struct ArtifactSource {
    name: String,
    backing: Backing,
    len: u64,
}

impl ArtifactSource {
    /// Opens an artifact.
    ///
    /// Fails with a read error when the path does not exist or is not a
    /// regular file.
    pub fn open(artifact: &Artifact) -> Result<Self> {
        match artifact {
            Artifact::Path(path) => {
                let name = path.display().to_string();
                let meta = std::fs::metadata(path).map_err(|e| DatalintError::read(&name, e))?;
                if !meta.is_file() {
                    return Err(DatalintError::read(
                        &name,
                        io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
                    ));
                }
                Ok(Self {
                    name,
                    backing: Backing::File(path.clone()),
                    len: meta.len(),
                })
            }
            Artifact::Bytes { name, data } => Ok(Self {
                name: name.clone(),
                backing: Backing::Memory(data.clone()),
                len: data.len() as u64,
            }),
        }
    }

    /// Display name of the artifact.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true for zero-byte artifacts.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Filesystem path, for on-disk artifacts.
    pub fn path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::File(path) => Some(path),
            Backing::Memory(_) => None,
        }
    }

    /// In-memory content, for byte-buffer artifacts.
    pub fn memory(&self) -> Option<&Bytes> {
        match &self.backing {
            Backing::File(_) => None,
            Backing::Memory(data) => Some(data),
        }
    }

    fn read_error(&self, err: io::Error) -> DatalintError {
        DatalintError::read(&self.name, err)
    }

    /// Opens the backing file.
    pub fn open_file(&self) -> Result<Option<File>> {
        match &self.backing {
            Backing::File(path) => File::open(path).map(Some).map_err(|e| self.read_error(e)),
            Backing::Memory(_) => Ok(None),
        }
    }

    /// Reads up to `len` bytes starting at `offset`.
    ///
    /// Short reads happen only at the end of the artifact.
    pub fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        if offset >= self.len {
            return Ok(Vec::new());
        }
        let available = usize::try_from(self.len - offset).unwrap_or(usize::MAX);
        let len = len.min(available);

        match &self.backing {
            Backing::Memory(data) => {
                let start = offset as usize;
                Ok(data[start..start + len].to_vec())
            }
            Backing::File(path) => {
                let mut file = File::open(path).map_err(|e| self.read_error(e))?;
                file.seek(SeekFrom::Start(offset))
                    .map_err(|e| self.read_error(e))?;
                let mut buf = Vec::with_capacity(len);
                file.take(len as u64)
                    .read_to_end(&mut buf)
                    .map_err(|e| self.read_error(e))?;
                Ok(buf)
            }
        }
    }

    /// Reads at most `max` leading bytes.
    pub fn prefix(&self, max: usize) -> Result<Vec<u8>> {
        self.read_at(0, max)
    }

    /// Reads at most `max` trailing bytes.
    pub fn tail(&self, max: usize) -> Result<Vec<u8>> {
        let max = max.min(usize::try_from(self.len).unwrap_or(usize::MAX));
        self.read_at(self.len - max as u64, max)
    }

    /// Reads the whole artifact into memory.
    pub fn to_bytes(&self) -> Result<Bytes> {
        match &self.backing {
            Backing::Memory(data) => Ok(data.clone()),
            Backing::File(path) => std::fs::read(path)
                .map(Bytes::from)
                .map_err(|e| self.read_error(e)),
        }
    }

    /// Streaming reader positioned at the start of the artifact.
    pub fn reader(&self) -> Result<Box<dyn BufRead + Send>> {
        match &self.backing {
            Backing::Memory(data) => Ok(Box::new(Cursor::new(data.clone()))),
            Backing::File(path) => {
                let file = File::open(path).map_err(|e| self.read_error(e))?;
                Ok(Box::new(BufReader::with_capacity(64 * 1024, file)))
            }
        }
    }
}
