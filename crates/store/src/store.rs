//! The dependency store: the persisted record of what ran, what it
//! produced, and what its `file_dep` entries looked like, used by the
//! up-to-date engine to classify tasks and by the runner to save results.

use crate::backend::Backend;
use crate::error::Result;
use crate::fingerprint::compute_fingerprint;
use crate::record::DependencyRecord;
use kiln_task::{Task, TaskResultValue, UptodateStoreView};
use std::cell::RefCell;
use tracing::{debug, info};

/// Wraps a storage [`Backend`] with the per-task record operations the
/// engine and runner need. Interior mutability (`RefCell`) lets this type
/// implement [`UptodateStoreView`]'s `&self` lookup while still caching
/// lazily-decoded records underneath, mirroring the reference
/// implementation's single-process, single-threaded access pattern.
pub struct DependencyStore {
    backend: RefCell<Box<dyn Backend>>,
    closed: RefCell<bool>,
}

impl DependencyStore {
    /// Wrap an already-open backend.
    #[must_use]
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Self {
            backend: RefCell::new(backend),
            closed: RefCell::new(false),
        }
    }

    /// Open the JSON single-file backend at `path`.
    pub fn open_json(path: impl Into<std::path::PathBuf>) -> Result<Self> {
        Ok(Self::new(Box::new(crate::backend::JsonBackend::open(path)?)))
    }

    /// Open the sled-backed backend at `path`.
    pub fn open_sled(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Ok(Self::new(Box::new(crate::backend::SledBackend::open(path)?)))
    }

    /// Raw record lookup.
    pub fn load(&self, task: &str) -> Result<DependencyRecord> {
        self.backend.borrow_mut().load(task)
    }

    /// Raw record assignment.
    pub fn store(&self, task: &str, record: DependencyRecord) -> Result<()> {
        self.backend.borrow_mut().save(task, record)
    }

    /// A single field of a task's record.
    pub fn get(&self, task: &str, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.load(task)?.get(key).cloned())
    }

    /// Set a single field of a task's record.
    pub fn set(&self, task: &str, key: &str, value: serde_json::Value) -> Result<()> {
        let mut record = self.load(task)?;
        record.set(key, value);
        self.store(task, record)
    }

    /// Whether a task's record has `key` set.
    pub fn contains(&self, task: &str, key: &str) -> Result<bool> {
        Ok(self.load(task)?.get(key).is_some())
    }

    /// Drop a single task's record (the `forget` operation).
    pub fn forget(&self, task: &str) -> Result<()> {
        self.backend.borrow_mut().remove(task)
    }

    /// Drop every task's record.
    pub fn forget_all(&self) -> Result<()> {
        self.backend.borrow_mut().remove_all()
    }

    /// A value previously saved under a task's `values` mapping.
    #[must_use]
    pub fn get_value(&self, task: &str, key: &str) -> Option<serde_json::Value> {
        self.load(task).ok()?.value(key)
    }

    /// The full `values` mapping persisted for a task.
    #[must_use]
    pub fn get_values(&self, task: &str) -> serde_json::Map<String, serde_json::Value> {
        self.load(task)
            .ok()
            .and_then(|r| r.values().cloned())
            .unwrap_or_default()
    }

    /// The result persisted for a task's last successful run.
    #[must_use]
    pub fn get_result(&self, task: &str) -> Option<serde_json::Value> {
        self.load(task).ok()?.result().cloned()
    }

    /// Whether a task is marked ignored.
    #[must_use]
    pub fn is_ignored(&self, task: &str) -> bool {
        self.load(task).map(|r| r.is_ignored()).unwrap_or(false)
    }

    /// Mark or unmark a task as ignored (the `ignore` command).
    pub fn set_ignored(&self, task: &str, ignored: bool) -> Result<()> {
        let mut record = self.load(task)?;
        record.set_ignored(ignored);
        self.store(task, record)
    }

    /// Persist a task's successful run: its accumulated `values`, its
    /// `result` (digested if it is text, stored verbatim if it is a
    /// mapping), and a fresh `(mtime, size, md5)` fingerprint for every
    /// `file_dep`, skipping the md5 recompute when the stored mtime still
    /// matches the file's current mtime.
    ///
    /// # Errors
    ///
    /// Returns an error if a `file_dep` is missing or unreadable.
    pub fn save_success(
        &self,
        task: &Task,
        extra_values: serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let mut record = self.load(&task.name)?;
        record.merge_values(task.values.clone());
        record.merge_values(extra_values);

        if let Some(result) = &task.result {
            let digested = match result {
                TaskResultValue::Mapping(map) => serde_json::Value::Object(map.clone()),
                TaskResultValue::Text(text) => {
                    serde_json::Value::String(crate::fingerprint::md5_hex_of_bytes(text.as_bytes()))
                }
            };
            record.set_result(digested);
        }

        for file_dep in &task.file_dep {
            let key = file_dep.display().to_string();
            let stored = record.file_fingerprint(&key);
            let metadata = std::fs::metadata(file_dep).map_err(|source| crate::error::Error::Io {
                path: file_dep.clone(),
                source,
            })?;
            let current_mtime = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map_or(0.0, |d| d.as_secs_f64());

            let fp = match &stored {
                Some(prev) if prev.mtime_matches(current_mtime) => {
                    debug!(task = %task.name, file = %key, "mtime unchanged, skipping md5 recompute");
                    *prev
                }
                _ => compute_fingerprint(file_dep)?,
            };
            record.set_file_fingerprint(&key, &fp);
        }

        self.store(&task.name, record)?;
        info!(task = %task.name, "saved dependency state");
        Ok(())
    }

    /// Flush buffered writes. Safe to call more than once.
    pub fn close(&self) -> Result<()> {
        if *self.closed.borrow() {
            return Ok(());
        }
        self.backend.borrow_mut().dump()?;
        *self.closed.borrow_mut() = true;
        Ok(())
    }
}

impl UptodateStoreView for DependencyStore {
    fn get(&self, task: &str, key: &str) -> Option<serde_json::Value> {
        DependencyStore::get(self, task, key).ok().flatten()
    }
}
