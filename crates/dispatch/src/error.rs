//! Error types for dependency resolution during dispatch.

use thiserror::Error;

/// Errors raised while walking the dependency graph at dispatch time.
#[derive(Error, Debug)]
pub enum Error {
    /// Following `task_dep`/`calc_dep` edges from a root selection led
    /// back to a task already on the path, i.e. a cycle not caught by the
    /// graph's own proactive check (for instance, one introduced by a
    /// `calc_dep` result at run time).
    #[error("cyclic task dependency: {}", path.join(" -> "))]
    CycleDetected {
        /// Full cycle path, in traversal order.
        path: Vec<String>,
    },

    /// A `task_dep`, `calc_dep`, or `setup_tasks` entry named a task that
    /// does not exist in the task set handed to the dispatcher.
    #[error("unknown task '{0}' referenced as a dependency")]
    UnknownTask(String),

    /// The caller reported a status or outcome for a node that was not
    /// awaiting one (e.g. calling `report_outcome` before `next` yielded
    /// `Action::Execute` for that task).
    #[error("protocol violation: {message}")]
    ProtocolViolation {
        /// Description of the unexpected call.
        message: String,
    },
}

/// Result alias for dispatch operations.
pub type Result<T> = std::result::Result<T, Error>;
