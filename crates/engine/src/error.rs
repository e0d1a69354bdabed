//! Error types for up-to-date classification.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while classifying a task as up-to-date or needing a run.
#[derive(Error, Debug)]
pub enum Error {
    /// A `file_dep` could not be found while checking it for changes.
    #[error("task '{task}': dependency file not found: {}", path.display())]
    MissingFileDep {
        /// Task being classified.
        task: String,
        /// The missing path.
        path: PathBuf,
    },

    /// I/O failure while statting or hashing a `file_dep`.
    #[error("I/O error checking file dependency: {0}")]
    Io(#[from] std::io::Error),

    /// Propagated from the dependency store.
    #[error(transparent)]
    Store(#[from] kiln_store::Error),
}

/// Result alias for classification.
pub type Result<T> = std::result::Result<T, Error>;
