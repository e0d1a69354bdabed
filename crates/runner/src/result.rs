//! Run-wide result, promoted across every task's outcome as the run
//! progresses. Mirrors the exit-code ladder: up to date/success never
//! demotes a worse outcome already recorded, and error always wins.

/// The aggregate outcome of a run, used to pick the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunResult {
    /// Every selected task was up to date or ran successfully.
    #[default]
    Success,
    /// At least one task reported an expected failure, and nothing worse
    /// happened.
    Failure,
    /// At least one task raised an unexpected error, or the run itself
    /// could not proceed.
    Error,
}

impl RunResult {
    /// Fold in another task's outcome, keeping the worse of the two. Never
    /// demotes: once `Error` is recorded it stays `Error` regardless of
    /// what runs afterward.
    #[must_use]
    pub fn promote(self, other: RunResult) -> RunResult {
        use RunResult::{Error, Failure, Success};
        match (self, other) {
            (Error, _) | (_, Error) => Error,
            (Failure, _) | (_, Failure) => Failure,
            (Success, Success) => Success,
        }
    }

    /// The process exit code this result maps to: `0` clean, `1` a task
    /// failure, `2` an unexpected task error or internal scheduling
    /// problem.
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            RunResult::Success => 0,
            RunResult::Failure => 1,
            RunResult::Error => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_dominates_once_recorded() {
        let r = RunResult::Success.promote(RunResult::Error);
        assert_eq!(r.promote(RunResult::Success), RunResult::Error);
    }

    #[test]
    fn failure_beats_success_but_not_error() {
        let r = RunResult::Success.promote(RunResult::Failure);
        assert_eq!(r, RunResult::Failure);
        assert_eq!(r.promote(RunResult::Error), RunResult::Error);
    }

    #[test]
    fn exit_codes_match_the_ladder() {
        assert_eq!(RunResult::Success.exit_code(), 0);
        assert_eq!(RunResult::Failure.exit_code(), 1);
        assert_eq!(RunResult::Error.exit_code(), 2);
    }
}
