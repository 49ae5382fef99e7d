//! # Datalint Core
//!
//! Core value types for the datalint dataset inspection engine.
//!
//! Every type here is a plain immutable value (closed enums and records) so
//! that a host runtime can marshal it without reflection.
//!
//! ## Key Concepts
//!
//! - **DatasetFormat**: physical encoding of an artifact (Parquet, CSV, PNG, ...)
//! - **DatasetType**: shape of the content (tabular, document, image, ...)
//! - **DatasetTask**: an artifact plus the checks requested for it
//! - **ValidationResult**: verdict and diagnostics of a format validation
//! - **CacheConfig**: capacity, eviction and fingerprint settings of a result cache
//!
//! ## Example
//!
//! ```rust
//! use datalint_core::{Artifact, Check, DatasetTask, InspectionOptions};
//!
//! let task = DatasetTask::builder(Artifact::bytes("inline.csv", "id,name\n1,ada\n"))
//!     .checks([Check::DetectFormat, Check::Structure])
//!     .options(InspectionOptions::new().with_sample_rows(100))
//!     .build();
//!
//! assert_eq!(task.checks().len(), 2);
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod report;
pub mod task;

pub use config::*;
pub use error::*;
pub use format::*;
pub use report::*;
pub use task::*;

/// Version of the inspection engine. Seeds every content fingerprint and is
/// recorded in cache snapshots.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
