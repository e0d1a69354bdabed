//! Tagged union for `uptodate` entries, per the design's note on dynamic
//! predicate objects: an entry is either a constant, a plain predicate, or
//! a calculator that needs a handle into the store and the task set.

use std::sync::Arc;

/// A callback an up-to-date predicate registers to persist a value on
/// successful classification-or-run. Invoked by the runner after a
/// successful execution (or, for predicates that are satisfied without a
/// run, immediately).
pub type ValueSaver = Box<dyn Fn() -> serde_json::Map<String, serde_json::Value> + Send + Sync>;

/// Read-only view into the dependency store that predicates needing
/// cross-task state (`result_dep`) are evaluated against.
pub trait UptodateStoreView: Send + Sync {
    /// Fetch a previously persisted value for `(task, key)`.
    fn get(&self, task: &str, key: &str) -> Option<serde_json::Value>;
}

/// Read-only view into the task set, used by predicates that need to
/// know about group/sub-task structure (`result_dep` on a group task).
pub trait TaskSetView: Send + Sync {
    /// Names of the sub-tasks of `task`, if it is a group task.
    fn subtask_names(&self, task: &str) -> Vec<String>;
}

/// Everything a predicate needs to decide and to register side effects.
pub struct UptodateContext<'a> {
    /// Name of the task being classified.
    pub task_name: &'a str,
    /// The task's previously persisted `values`.
    pub values: &'a serde_json::Map<String, serde_json::Value>,
    /// Value-saver callbacks accumulated during this classification.
    pub value_savers: &'a mut Vec<ValueSaver>,
    /// Additional `task_dep` entries this predicate wants to register
    /// (e.g. `result_dep`'s implicit dependency on the other task).
    pub extra_task_dep: &'a mut Vec<String>,
    /// Store accessor, for predicates that consult other tasks' records.
    pub store: &'a dyn UptodateStoreView,
    /// Task-set accessor, for predicates that need group/sub-task info.
    pub tasks: &'a dyn TaskSetView,
}

/// A callable up-to-date predicate.
///
/// Returns `None` to abstain (the entry is skipped), `Some(true)` to vote
/// up-to-date, `Some(false)` to force a run.
pub trait UptodatePredicate: Send + Sync {
    /// Evaluate the predicate, possibly registering value savers or extra
    /// task deps on `ctx`.
    fn check(&self, ctx: &mut UptodateContext<'_>) -> Option<bool>;
}

/// One entry of a task's `uptodate` list.
#[derive(Clone)]
pub enum Uptodate {
    /// A constant, fixed at task-construction time. `None` abstains.
    Constant(Option<bool>),
    /// A stateful or parameterised predicate.
    Predicate(Arc<dyn UptodatePredicate>),
}

impl Uptodate {
    /// Evaluate this entry against `ctx`.
    pub fn check(&self, ctx: &mut UptodateContext<'_>) -> Option<bool> {
        match self {
            Uptodate::Constant(b) => *b,
            Uptodate::Predicate(p) => p.check(ctx),
        }
    }
}

impl std::fmt::Debug for Uptodate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Uptodate::Constant(b) => write!(f, "Uptodate::Constant({b:?})"),
            Uptodate::Predicate(_) => write!(f, "Uptodate::Predicate(..)"),
        }
    }
}
