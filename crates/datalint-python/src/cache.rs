//! Python handle for the result cache.

use crate::errors::to_py_result;
use crate::types::{DatasetTask, Fingerprint, InspectionOutcome};
use datalint_sdk as sdk;
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Memoizing result cache.
///
/// Each handle owns a small tokio runtime; calls block the calling thread
/// with the GIL released.
#[pyclass(name = "Cache", module = "datalint_core", frozen)]
pub struct Cache {
    runtime: tokio::runtime::Runtime,
    inner: Arc<sdk::Cache>,
}

#[pymethods]
impl Cache {
    /// Returns the cached outcome for a task, computing it on a miss.
    fn get_or_compute(
        &self,
        py: Python<'_>,
        task: PyRef<'_, DatasetTask>,
    ) -> PyResult<InspectionOutcome> {
        let task = task.inner.clone();
        let outcome = py.detach(|| self.runtime.block_on(self.inner.get_or_compute(&task)));
        to_py_result(outcome).map(|outcome| InspectionOutcome::from((*outcome).clone()))
    }

    /// Drops every entry for a fingerprint. Returns the number removed.
    fn invalidate(&self, fingerprint: PyRef<'_, Fingerprint>) -> usize {
        self.inner.invalidate(&fingerprint.inner)
    }

    fn clear(&self) {
        self.inner.clear();
    }

    /// Writes a snapshot to the configured persist path.
    fn persist(&self, py: Python<'_>) -> PyResult<usize> {
        to_py_result(py.detach(|| self.inner.persist()))
    }

    fn stats(&self) -> HashMap<&'static str, u64> {
        let stats = self.inner.stats();
        HashMap::from([
            ("hits", stats.hits),
            ("misses", stats.misses),
            ("computations", stats.computations),
            ("coalesced", stats.coalesced),
            ("evictions", stats.evictions),
            ("expirations", stats.expirations),
            ("bypasses", stats.bypasses),
        ])
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }
}

/// Creates a result cache.
///
/// Raises:
///     ValueError: If the configuration is invalid
#[pyfunction]
#[pyo3(signature = (capacity=sdk::DEFAULT_CAPACITY, eviction_policy="lru", ttl_ms=None, fingerprint_algorithm="xxh3", persist_path=None))]
pub fn create_cache(
    py: Python<'_>,
    capacity: usize,
    eviction_policy: &str,
    ttl_ms: Option<u64>,
    fingerprint_algorithm: &str,
    persist_path: Option<PathBuf>,
) -> PyResult<Cache> {
    let algorithm =
        sdk::FingerprintAlgorithm::from_str(fingerprint_algorithm).map_err(PyValueError::new_err)?;

    let mut builder = sdk::CacheConfig::builder()
        .capacity(capacity)
        .fingerprint_algorithm(algorithm);
    builder = match (eviction_policy.to_lowercase().as_str(), ttl_ms) {
        ("lru", None) => builder.lru(),
        ("lru", Some(_)) => {
            return Err(PyValueError::new_err("ttl_ms requires eviction_policy='ttl'"));
        }
        ("ttl", Some(ms)) => builder.ttl(Duration::from_millis(ms)),
        ("ttl", None) => {
            return Err(PyValueError::new_err("eviction_policy='ttl' requires ttl_ms"));
        }
        (other, _) => {
            return Err(PyValueError::new_err(format!(
                "unknown eviction policy '{}'",
                other
            )));
        }
    };
    if let Some(path) = persist_path {
        builder = builder.persist_path(path);
    }
    let config = to_py_result(builder.build())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .map_err(|e| PyRuntimeError::new_err(format!("failed to start runtime: {}", e)))?;
    let inner = to_py_result(py.detach(|| sdk::create_cache(config)))?;

    Ok(Cache {
        runtime,
        inner: Arc::new(inner),
    })
}
