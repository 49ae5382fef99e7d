//! Content fingerprints.
//!
//! A fingerprint is a streaming hash over the engine version and the artifact
//! bytes, plus the byte count. Identical bytes always produce the same
//! fingerprint, wherever they come from; a new engine version produces new
//! fingerprints, so outcomes computed by an older engine never match.

use datalint_core::{
    Artifact, DatalintError, ENGINE_VERSION, Fingerprint, FingerprintAlgorithm, Result,
};
use datalint_validator::{ArtifactSource, InspectionContext};
use sha2::{Digest, Sha256};
use std::io::Read;
use xxhash_rust::xxh3::Xxh3;

const CHUNK: usize = 64 * 1024;

enum Hasher {
    Xxh3(Box<Xxh3>),
    Sha256(Sha256),
}

impl Hasher {
    /// A hasher already seeded with `version` and a NUL separator.
    fn new(algorithm: FingerprintAlgorithm, version: &str) -> Self {
        let mut hasher = match algorithm {
            FingerprintAlgorithm::Xxh3 => Hasher::Xxh3(Box::new(Xxh3::new())),
            FingerprintAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
        };
        hasher.update(version.as_bytes());
        hasher.update(&[0]);
        hasher
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            Hasher::Xxh3(h) => h.update(bytes),
            Hasher::Sha256(h) => h.update(bytes),
        }
    }

    fn hex_digest(self) -> String {
        match self {
            Hasher::Xxh3(h) => format!("{:032x}", h.digest128()),
            Hasher::Sha256(h) => h
                .finalize()
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect(),
        }
    }
}

/// Hashes a byte slice.
pub fn fingerprint_bytes(bytes: &[u8], algorithm: FingerprintAlgorithm) -> Fingerprint {
    fingerprint_versioned(bytes, algorithm, ENGINE_VERSION)
}

fn fingerprint_versioned(
    bytes: &[u8],
    algorithm: FingerprintAlgorithm,
    version: &str,
) -> Fingerprint {
    let mut hasher = Hasher::new(algorithm, version);
    hasher.update(bytes);
    Fingerprint {
        algorithm,
        digest: hasher.hex_digest(),
        size: bytes.len() as u64,
    }
}

/// Streams an artifact through the hash, checking for cancellation between
/// chunks.
pub fn fingerprint_artifact(
    artifact: &Artifact,
    algorithm: FingerprintAlgorithm,
    ctx: &InspectionContext,
) -> Result<Fingerprint> {
    let source = ArtifactSource::open(artifact)?;
    if let Some(data) = source.memory() {
        return Ok(fingerprint_bytes(data, algorithm));
    }

    let mut reader = ctx.guard(source.reader()?);
    let mut hasher = Hasher::new(algorithm, ENGINE_VERSION);
    let mut buf = vec![0u8; CHUNK];
    let mut size = 0u64;
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| ctx.io_error(source.name(), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }

    if size != source.len() {
        return Err(DatalintError::read(
            source.name(),
            std::io::Error::other("file changed while it was being fingerprinted"),
        ));
    }

    Ok(Fingerprint {
        algorithm,
        digest: hasher.hex_digest(),
        size,
    })
}
