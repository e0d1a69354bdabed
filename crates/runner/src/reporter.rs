//! The reporter seam: how a run's progress is surfaced to whatever is
//! driving it (a CLI, a test harness). Default methods are no-ops so a
//! caller only overrides what it cares about, the same shape as the
//! teacher's event-emission points but as a trait instead of macros.

use crate::result::RunResult;

/// Observes a run's progress. All methods have a no-op default.
pub trait Reporter {
    /// A task was selected and is about to be classified.
    fn task_start(&mut self, _task: &str) {}
    /// A task was classified as needing to run and its actions are
    /// starting.
    fn task_execute(&mut self, _task: &str) {}
    /// A task was classified as up to date and will not run.
    fn task_up_to_date(&mut self, _task: &str) {}
    /// A task is marked ignored and is being skipped.
    fn task_ignore(&mut self, _task: &str) {}
    /// A task's actions all succeeded.
    fn task_success(&mut self, _task: &str) {}
    /// A task's actions reported an expected failure.
    fn task_failure(&mut self, _task: &str, _reason: &str) {}
    /// A task's actions raised an unexpected error.
    fn task_error(&mut self, _task: &str, _message: &str) {}
    /// A teardown action ran (or failed) after the run completed.
    fn teardown(&mut self, _task: &str, _error: Option<&str>) {}
    /// The run finished with this aggregate result.
    fn run_complete(&mut self, _result: RunResult) {}
}

/// A [`Reporter`] that emits everything through `tracing`, matching the
/// structured logging the rest of this workspace uses.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn task_start(&mut self, task: &str) {
        tracing::info!(task, "starting");
    }

    fn task_execute(&mut self, task: &str) {
        tracing::info!(task, "executing");
    }

    fn task_up_to_date(&mut self, task: &str) {
        tracing::debug!(task, "up to date");
    }

    fn task_ignore(&mut self, task: &str) {
        tracing::debug!(task, "ignored");
    }

    fn task_success(&mut self, task: &str) {
        tracing::info!(task, "success");
    }

    fn task_failure(&mut self, task: &str, reason: &str) {
        tracing::warn!(task, reason, "failed");
    }

    fn task_error(&mut self, task: &str, message: &str) {
        tracing::error!(task, message, "errored");
    }

    fn teardown(&mut self, task: &str, error: Option<&str>) {
        match error {
            Some(message) => tracing::warn!(task, message, "teardown failed"),
            None => tracing::debug!(task, "teardown ran"),
        }
    }

    fn run_complete(&mut self, result: RunResult) {
        tracing::info!(?result, "run complete");
    }
}
