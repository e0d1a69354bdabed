//! Dependency store: persisted per-task records backing the up-to-date
//! engine's classification and the runner's `save_success` step.
//!
//! Two backends share one [`Backend`] trait: [`JsonBackend`] (a single
//! text file, load-all/dump-all) and [`SledBackend`] (an embedded
//! key-value store, lazily decoded per task).

mod backend;
mod error;
mod fingerprint;
mod record;
mod store;

pub use backend::{Backend, JsonBackend, SledBackend};
pub use error::{Error, Result};
pub use fingerprint::{compute_fingerprint, has_changed, md5_hex, md5_hex_of_bytes};
pub use record::{CONFIG_CHANGED_KEY, DependencyRecord, IGNORE_KEY, RESULT_KEY, VALUES_KEY};
pub use store::DependencyStore;
