//! Up-to-date engine: the six-step classification algorithm and the five
//! built-in `uptodate` predicates.

mod classify;
mod error;
mod predicates;

pub use classify::{classify, Classification, Status};
pub use error::{Error, Result};
pub use predicates::{CheckTimestampUnchanged, CompareOp, ConfigChanged, ResultDep, RunOnce, TimeField, Timeout};
