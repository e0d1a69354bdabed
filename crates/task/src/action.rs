//! The action contract: what a task's side-effecting steps look like to
//! the core. Actions are deliberately opaque — the core never inspects
//! what an action does, only what it reports.

use std::io::Write;

/// What an action returns when it finishes.
///
/// This mirrors the action contract: success carries no value, a task
/// failure carries a human-readable reason, and an error carries an
/// unexpected-exception-equivalent message.
#[derive(Debug)]
pub enum ActionOutcome {
    /// The action completed normally.
    Success,
    /// The action reported a declarative failure (`TaskFailed`).
    Failed(String),
    /// The action raised unexpectedly (`TaskError`).
    Error(String),
}

/// Mutable state an action may touch while it runs: output sinks, the
/// task's persisted `values`, and its `result`.
pub struct ActionContext<'a> {
    /// Sink for the action's stdout.
    pub stdout: &'a mut dyn Write,
    /// Sink for the action's stderr.
    pub stderr: &'a mut dyn Write,
    /// Persisted per-task values; an action may add entries here.
    pub values: &'a mut serde_json::Map<String, serde_json::Value>,
    /// Result of this action; the last action's result becomes the task's.
    pub result: &'a mut Option<crate::TaskResultValue>,
    /// Parameters resolved via `getargs`, keyed by parameter name.
    pub getargs: &'a std::collections::BTreeMap<String, serde_json::Value>,
}

/// A single side-effecting step of a task.
///
/// Implement this for whatever the surrounding tool's action types are
/// (shell commands, embedded scripts, callables); the core only ever
/// calls `run` and inspects the [`ActionOutcome`].
pub trait Action: Send + Sync {
    /// Execute the action, returning its outcome.
    fn run(&self, ctx: &mut ActionContext<'_>) -> ActionOutcome;
}

impl<F> Action for F
where
    F: Fn(&mut ActionContext<'_>) -> ActionOutcome + Send + Sync,
{
    fn run(&self, ctx: &mut ActionContext<'_>) -> ActionOutcome {
        self(ctx)
    }
}
