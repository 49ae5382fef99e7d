//! Error conversion between the engine and Python exceptions.

use datalint_sdk::DatalintError;
use pyo3::exceptions::{PyOSError, PyRuntimeError, PyTimeoutError, PyValueError};
use pyo3::prelude::*;

/// Extension trait to convert engine errors to Python exceptions
pub trait IntoPyErr {
    fn into_py_err(self) -> PyErr;
}

impl IntoPyErr for DatalintError {
    fn into_py_err(self) -> PyErr {
        let message = self.to_string();
        match self {
            DatalintError::Read { .. } => PyOSError::new_err(message),
            DatalintError::UnrecognizedFormat { .. } | DatalintError::CacheConfig(_) => {
                PyValueError::new_err(message)
            }
            DatalintError::Timeout { .. } => PyTimeoutError::new_err(message),
            DatalintError::Cancelled
            | DatalintError::Snapshot(_)
            | DatalintError::Internal(_) => PyRuntimeError::new_err(message),
        }
    }
}

/// Helper to convert engine results to Python
pub fn to_py_result<T>(result: datalint_sdk::Result<T>) -> PyResult<T> {
    result.map_err(IntoPyErr::into_py_err)
}
