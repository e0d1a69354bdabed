//! Error types for the runner crate. Wraps the lower layers' own error
//! types and adds the runner-level dependency preconditions from the
//! design's getargs/`result_dep` notes.

use thiserror::Error;

/// Errors raised while running a selection of tasks.
#[derive(Error, Debug)]
pub enum Error {
    /// A cycle, unknown task, or protocol violation surfaced while
    /// dispatching tasks.
    #[error(transparent)]
    Dispatch(#[from] kiln_dispatch::Error),

    /// Graph construction rejected the task set (missing dependency or
    /// duplicate target) before dispatch ever started.
    #[error(transparent)]
    Graph(#[from] kiln_graph::Error),

    /// Classifying a task failed (typically a missing `file_dep`).
    #[error(transparent)]
    Engine(#[from] kiln_engine::Error),

    /// The dependency store could not be read or written.
    #[error(transparent)]
    Store(#[from] kiln_store::Error),

    /// A `getargs` entry references a task whose value is not yet
    /// available and is not a declared dependency, caught as a
    /// selection-time precondition rather than at execution.
    #[error(
        "task '{task}' getargs parameter '{param}' reads '{other_task}.{key}', \
         but '{other_task}' is neither a dependency nor has a prior recorded value"
    )]
    MissingGetArg {
        /// The task whose `getargs` entry could not be resolved.
        task: String,
        /// The parameter name.
        param: String,
        /// The task referenced by the `getargs` entry.
        other_task: String,
        /// The key read from `other_task`'s persisted values.
        key: String,
    },

    /// An `uptodate` predicate (e.g. `result_dep`) registered a
    /// dependency on a task that is neither declared as a dependency nor
    /// has a prior recorded result.
    #[error(
        "task '{task}' has an uptodate predicate referencing '{other_task}', \
         which is neither a dependency nor has a prior recorded result"
    )]
    UnsatisfiedPredicateDependency {
        /// The task whose predicate could not be satisfied.
        task: String,
        /// The task the predicate reads from.
        other_task: String,
    },

    /// The dispatcher reported no ready task while nothing was in
    /// flight. The single-worker runner has no outstanding work that
    /// could complete and unblock it, so this is a scheduling bug.
    #[error("dispatcher is not progressing: nothing ready and nothing in flight")]
    SchedulingStalled,
}

/// Result alias for runner operations.
pub type Result<T> = std::result::Result<T, Error>;
