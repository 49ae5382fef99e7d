//! Python bindings for the datalint engine.
//!
//! This crate only marshals values; every decision is made by the engine
//! crates.

use pyo3::prelude::*;

mod cache;
mod errors;
mod types;

use cache::{create_cache, Cache};
use types::{
    get_dataset_format, validate_dataset_format, DatasetFormat, DatasetTask, DatasetType,
    Fingerprint, InspectionOutcome, ValidationResult,
};

/// Datalint Core Python module
#[pymodule]
#[pyo3(name = "_datalint_core")]
fn datalint_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Add version information
    m.add("__version__", datalint_sdk::VERSION)?;

    // Add functions
    m.add_function(wrap_pyfunction!(create_cache, m)?)?;
    m.add_function(wrap_pyfunction!(get_dataset_format, m)?)?;
    m.add_function(wrap_pyfunction!(validate_dataset_format, m)?)?;

    // Add classes
    m.add_class::<DatasetTask>()?;
    m.add_class::<DatasetType>()?;
    m.add_class::<DatasetFormat>()?;
    m.add_class::<Cache>()?;
    m.add_class::<Fingerprint>()?;
    m.add_class::<InspectionOutcome>()?;
    m.add_class::<ValidationResult>()?;

    Ok(())
}
