//! Runner configuration: storage backend, concurrency, and run-wide
//! policy knobs, narrowed to what a single run of this core actually
//! needs.

use std::path::PathBuf;

/// Which [`kiln_store::DependencyStore`] backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Single JSON file, load-all/dump-all.
    Json,
    /// Embedded sled database.
    Sled,
}

/// Configuration for a single run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RunnerConfig {
    /// Which backend [`kiln_store::DependencyStore`] should open.
    pub store_backend: StoreBackend,
    /// Path to the dependency file (a JSON file or a sled directory,
    /// depending on `store_backend`).
    pub dependency_file: PathBuf,
    /// Number of worker threads. `0` means the single-worker, serial
    /// runner.
    pub max_parallel: usize,
    /// Keep running sibling tasks after a failure instead of stopping the
    /// whole run at the first one.
    pub continue_on_error: bool,
    /// Skip classification and run every selected task unconditionally,
    /// and always run `setup_tasks` regardless of whether their owner
    /// would otherwise need to.
    pub force_run: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            store_backend: StoreBackend::Sled,
            dependency_file: PathBuf::from(".kiln.db"),
            max_parallel: 0,
            continue_on_error: false,
            force_run: false,
        }
    }
}
