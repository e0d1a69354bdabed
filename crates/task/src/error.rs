//! Error taxonomy for the task data model.
//!
//! Mirrors the error kinds named in the design's error-handling section:
//! malformed task definitions are rejected here, before a graph or
//! dispatcher ever sees them.

use thiserror::Error;

/// Errors raised while constructing or validating a [`crate::Task`].
#[derive(Error, Debug)]
pub enum Error {
    /// A task referenced a dependency target that does not resolve to a
    /// known task name (checked by the graph, surfaced here for the shared
    /// error type).
    #[error("task '{task}': dependency '{dependency}' does not exist")]
    InvalidTask {
        /// Task that declared the bad dependency.
        task: String,
        /// Name that failed to resolve.
        dependency: String,
    },

    /// Two tasks declared the same name, or the same target path.
    #[error("invalid task set: {message}")]
    InvalidTaskSet {
        /// Human-readable description of the duplicate.
        message: String,
    },

    /// A `getargs` entry could not be resolved at selection time.
    #[error("task '{task}': getargs parameter '{param}' references unknown task.key '{reference}'")]
    InvalidGetArgs {
        /// Task declaring the `getargs` entry.
        task: String,
        /// Parameter name being supplied.
        param: String,
        /// The `"other-task.key"` reference that failed to resolve.
        reference: String,
    },
}

/// Result alias for task-model operations.
pub type Result<T> = std::result::Result<T, Error>;
