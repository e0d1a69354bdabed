//! Storage backends: a single-file JSON backend and a sled-backed
//! key-per-task backend, unified behind one [`Backend`] trait so
//! [`crate::DependencyStore`] need not know which is in use.

use crate::error::{Error, Result};
use crate::record::DependencyRecord;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A storage backend for per-task dependency records.
pub trait Backend: Send {
    /// Load a task's record, or an empty one if it has never been saved.
    fn load(&mut self, task: &str) -> Result<DependencyRecord>;

    /// Persist a task's record.
    fn save(&mut self, task: &str, record: DependencyRecord) -> Result<()>;

    /// Drop a single task's record.
    fn remove(&mut self, task: &str) -> Result<()>;

    /// Drop every task's record.
    fn remove_all(&mut self) -> Result<()>;

    /// Flush any buffered writes to durable storage. Idempotent.
    fn dump(&mut self) -> Result<()>;
}

/// Single JSON text file holding every task's record, loaded in full up
/// front and rewritten in full on [`JsonBackend::dump`] — mirroring the
/// reference `JsonDB`'s load-all/dump-all model.
pub struct JsonBackend {
    path: PathBuf,
    records: HashMap<String, DependencyRecord>,
    dirty: bool,
}

impl JsonBackend {
    /// Open (or create) the JSON store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = if path.exists() {
            let text = std::fs::read_to_string(&path).map_err(|source| Error::Io {
                path: path.clone(),
                source,
            })?;
            if text.trim().is_empty() {
                HashMap::new()
            } else {
                let raw: HashMap<String, serde_json::Map<String, serde_json::Value>> =
                    serde_json::from_str(&text).map_err(|_| Error::Corrupted { path: path.clone() })?;
                raw.into_iter().map(|(k, v)| (k, DependencyRecord::from_map(v))).collect()
            }
        } else {
            HashMap::new()
        };
        debug!(path = %path.display(), tasks = records.len(), "loaded json dependency store");
        Ok(Self {
            path,
            records,
            dirty: false,
        })
    }
}

impl Backend for JsonBackend {
    fn load(&mut self, task: &str) -> Result<DependencyRecord> {
        Ok(self.records.get(task).cloned().unwrap_or_default())
    }

    fn save(&mut self, task: &str, record: DependencyRecord) -> Result<()> {
        self.records.insert(task.to_string(), record);
        self.dirty = true;
        Ok(())
    }

    fn remove(&mut self, task: &str) -> Result<()> {
        self.records.remove(task);
        self.dirty = true;
        Ok(())
    }

    fn remove_all(&mut self) -> Result<()> {
        self.records.clear();
        self.dirty = true;
        Ok(())
    }

    fn dump(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let raw: HashMap<&String, serde_json::Map<String, serde_json::Value>> = self
            .records
            .iter()
            .map(|(k, v)| (k, v.clone().into_map()))
            .collect();
        let text = serde_json::to_string_pretty(&raw).map_err(|e| Error::Serialization {
            message: e.to_string(),
        })?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| Error::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&self.path, text).map_err(|source| Error::Io {
            path: self.path.clone(),
            source,
        })?;
        self.dirty = false;
        Ok(())
    }
}

/// sled-backed store: one key per task, decoded lazily and cached; only
/// tasks touched this run are re-encoded on [`SledBackend::dump`].
pub struct SledBackend {
    db: sled::Db,
    cache: HashMap<String, DependencyRecord>,
    dirty: HashSet<String>,
}

impl SledBackend {
    /// Open (or create) the sled store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(|_| Error::Corrupted {
            path: path.to_path_buf(),
        })?;
        debug!(path = %path.display(), "opened sled dependency store");
        Ok(Self {
            db,
            cache: HashMap::new(),
            dirty: HashSet::new(),
        })
    }

    fn decode(&self, task: &str) -> Result<DependencyRecord> {
        match self.db.get(task.as_bytes())? {
            Some(bytes) => {
                let map: serde_json::Map<String, serde_json::Value> =
                    serde_json::from_slice(&bytes).map_err(|e| Error::Serialization {
                        message: format!("task '{task}': {e}"),
                    })?;
                Ok(DependencyRecord::from_map(map))
            }
            None => Ok(DependencyRecord::new()),
        }
    }
}

impl Backend for SledBackend {
    fn load(&mut self, task: &str) -> Result<DependencyRecord> {
        if let Some(record) = self.cache.get(task) {
            return Ok(record.clone());
        }
        let record = self.decode(task)?;
        self.cache.insert(task.to_string(), record.clone());
        Ok(record)
    }

    fn save(&mut self, task: &str, record: DependencyRecord) -> Result<()> {
        self.cache.insert(task.to_string(), record);
        self.dirty.insert(task.to_string());
        Ok(())
    }

    fn remove(&mut self, task: &str) -> Result<()> {
        self.cache.remove(task);
        self.db.remove(task.as_bytes())?;
        self.dirty.remove(task);
        Ok(())
    }

    fn remove_all(&mut self) -> Result<()> {
        self.cache.clear();
        self.dirty.clear();
        self.db.clear()?;
        Ok(())
    }

    fn dump(&mut self) -> Result<()> {
        for task in self.dirty.drain().collect::<Vec<_>>() {
            let Some(record) = self.cache.get(&task) else {
                continue;
            };
            let bytes = serde_json::to_vec(&record.clone().into_map()).map_err(|e| Error::Serialization {
                message: e.to_string(),
            })?;
            self.db.insert(task.as_bytes(), bytes)?;
        }
        if let Err(err) = self.db.flush() {
            warn!(error = %err, "sled flush failed");
            return Err(Error::Backend(err));
        }
        Ok(())
    }
}
