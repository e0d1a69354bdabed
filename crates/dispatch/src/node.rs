//! A node's resolution state as it moves through dependency expansion,
//! classification and (conditionally) execution.

use std::collections::HashSet;

/// Where a node is in its resolution sequence. Mirrors the reference
/// coroutine's internal progress through expanding dependencies, yielding
/// for a status decision, gating on setup tasks, and yielding again for
/// execution — expressed here as an explicit cursor instead of a
/// suspended generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// `calc_dep` and `task_dep` are being expanded into nodes; not yet
    /// known whether they are all finished.
    ExpandingDeps,
    /// Dependencies are satisfied; the caller still needs to classify
    /// this task (up to date or must run).
    AwaitingClassification,
    /// Classified as `Run` with non-empty `setup_tasks`; waiting for
    /// those to finish before execution.
    AwaitingSetup,
    /// Ready for the caller to execute this task's actions.
    AwaitingExecution,
    /// Finished (up to date, ran successfully, failed, or errored).
    Finished,
}

/// The final disposition of a finished node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Classified up to date; no actions ran.
    UpToDate,
    /// Actions ran and all succeeded.
    Success,
    /// An action reported expected failure.
    Failure,
    /// An action raised an unexpected error.
    Error,
}

impl RunStatus {
    /// Whether a node with this status should be treated as finished for
    /// the purpose of satisfying other nodes' `task_dep`/`calc_dep`.
    #[must_use]
    pub fn is_terminal_ok(self) -> bool {
        matches!(self, RunStatus::UpToDate | RunStatus::Success)
    }
}

/// One task's position in the dependency graph during a single dispatch
/// run.
#[derive(Debug)]
pub struct ExecNode {
    /// Task name.
    pub name: String,
    /// Path from a root selection down to this node, used to detect
    /// cycles encountered while expanding dependencies (distinct from the
    /// graph's own proactive acyclicity check: this one only catches
    /// cycles reachable from the current selection).
    pub ancestors: Vec<String>,
    /// `task_dep` names not yet finished.
    pub task_dep_remaining: HashSet<String>,
    /// `calc_dep` names not yet finished.
    pub calc_dep_remaining: HashSet<String>,
    /// `setup_tasks` names not yet finished (populated only once this
    /// node is classified `Run`).
    pub setup_remaining: HashSet<String>,
    /// Names of nodes parked waiting on this one.
    pub waiting_me: HashSet<String>,
    /// Current phase.
    pub phase: Phase,
    /// Set once this node finishes.
    pub run_status: Option<RunStatus>,
    /// Dependencies that finished with `Failure` or `Error`, propagated
    /// from an ancestor so this node is skipped rather than run.
    pub bad_deps: Vec<String>,
    /// Dependencies that were ignored, tracked separately from `bad_deps`
    /// so a run summary can distinguish "skipped because a dependency
    /// failed" from "skipped because a dependency is ignored".
    pub ignored_deps: Vec<String>,
}

impl ExecNode {
    /// A fresh node with the given ancestor path.
    #[must_use]
    pub fn new(name: String, ancestors: Vec<String>) -> Self {
        Self {
            name,
            ancestors,
            task_dep_remaining: HashSet::new(),
            calc_dep_remaining: HashSet::new(),
            setup_remaining: HashSet::new(),
            waiting_me: HashSet::new(),
            phase: Phase::ExpandingDeps,
            run_status: None,
            bad_deps: Vec::new(),
            ignored_deps: Vec::new(),
        }
    }

    /// Whether every dependency this node is waiting on has finished.
    #[must_use]
    pub fn deps_satisfied(&self) -> bool {
        self.task_dep_remaining.is_empty() && self.calc_dep_remaining.is_empty()
    }

    /// Whether every setup task has finished.
    #[must_use]
    pub fn setup_satisfied(&self) -> bool {
        self.setup_remaining.is_empty()
    }
}
