//! The runner: drives a [`kiln_dispatch::Dispatcher`] to completion against
//! a [`kiln_store::DependencyStore`], classifying and executing tasks one
//! at a time and reporting progress through a [`Reporter`].

mod config;
mod error;
mod reporter;
mod result;
mod run;

pub use config::{RunnerConfig, StoreBackend};
pub use error::{Error, Result};
pub use reporter::{Reporter, TracingReporter};
pub use result::RunResult;
pub use run::run;
