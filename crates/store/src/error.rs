//! Error types for the dependency store.

use thiserror::Error;
use std::path::PathBuf;

/// Errors raised by a [`crate::DependencyStore`] backend.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O failure reading or writing the backing store.
    #[error("dependency store I/O failed at {}: {source}", path.display())]
    Io {
        /// Path that caused the error.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The store's on-disk format could not be recognised, surfaced with
    /// the offending path so the user can delete and rebuild the store.
    #[error(
        "the dependency store at {} is corrupted or was created by an incompatible version; \
         delete it and re-run to rebuild", path.display()
    )]
    Corrupted {
        /// Path to the corrupted store.
        path: PathBuf,
    },

    /// A record failed to (de)serialize.
    #[error("dependency store serialization error: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },

    /// The embedded database backend reported an error.
    #[error("dependency store backend error: {0}")]
    Backend(#[from] sled::Error),

    /// Tried to stat a `file_dep` that no longer exists.
    #[error("dependency file not found: {}", path.display())]
    MissingFileDep {
        /// The missing path.
        path: PathBuf,
    },
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;
