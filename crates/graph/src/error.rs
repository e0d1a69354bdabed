//! Error taxonomy for graph construction and selection.

use thiserror::Error;

/// Errors raised while constructing a [`crate::TaskGraph`] or resolving a
/// selection against it. All of these correspond to the design's
/// `InvalidTask`/`InvalidDodoFile`/`InvalidCommand` kinds — fatal before
/// any task runs.
#[derive(Error, Debug)]
pub enum Error {
    /// A `task_dep` or `setup_tasks` entry names a task that does not
    /// exist.
    #[error("invalid task set: {} missing dependenc{}: {}",
        missing.len(),
        if missing.len() == 1 { "y" } else { "ies" },
        missing.iter().map(|(t, d)| format!("{t} -> {d}")).collect::<Vec<_>>().join(", "))]
    MissingDependencies {
        /// `(task, missing dependency name)` pairs.
        missing: Vec<(String, String)>,
    },

    /// Two tasks declared the same target path.
    #[error("target '{target}' is produced by both '{first}' and '{second}'")]
    DuplicateTarget {
        /// The shared target path.
        target: String,
        /// The task that claimed it first.
        first: String,
        /// The task that claimed it second.
        second: String,
    },

    /// A selection token did not resolve to a task name, a target, or a
    /// glob matching at least the token itself.
    #[error("invalid selection: '{token}' is not a task or target")]
    UnknownSelection {
        /// The offending token.
        token: String,
    },

    /// The effective dependency graph (task_dep edges, setup edges
    /// excluded) contains a cycle.
    #[error("cyclic task dependency: {}", path.join(" -> "))]
    CycleDetected {
        /// Full cycle path, in traversal order.
        path: Vec<String>,
    },

    /// Propagated from task-set construction (duplicate names).
    #[error(transparent)]
    Task(#[from] kiln_task::Error),
}

/// Result alias for graph operations.
pub type Result<T> = std::result::Result<T, Error>;
