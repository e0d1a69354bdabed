//! Per-task record layout: the reserved keys a [`crate::DependencyStore`]
//! persists alongside arbitrary value-saver entries.

use kiln_task::FileFingerprint;
use serde_json::{Map, Value};

/// Key under which a task's `values` mapping is stored.
pub const VALUES_KEY: &str = "_values_:";
/// Key under which a task's last `result` is stored.
pub const RESULT_KEY: &str = "result:";
/// Key marking a task as ignored (skip regardless of up-to-date status).
pub const IGNORE_KEY: &str = "ignore:";
/// Key under which `config_changed`'s digest is stored.
pub const CONFIG_CHANGED_KEY: &str = "_config_changed";

/// A task's persisted record: everything the engine and runner need to
/// decide whether the task is up to date and to answer `getargs`/`result_dep`
/// queries about it. Unrecognised keys (file paths, predicate-specific
/// value-saver entries such as `success-time` or `<path>.mtime`) live
/// alongside the reserved ones in the same flat map, one per task.
#[derive(Debug, Clone, Default)]
pub struct DependencyRecord {
    fields: Map<String, Value>,
}

impl DependencyRecord {
    /// An empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an already-decoded map (used when loading from a backend).
    #[must_use]
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Consume into the raw map (used when persisting to a backend).
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.fields
    }

    /// Raw field access by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Raw field assignment.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    /// Raw field removal.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// The persisted `values` mapping, if any entry has been saved.
    #[must_use]
    pub fn values(&self) -> Option<&Map<String, Value>> {
        self.fields.get(VALUES_KEY).and_then(Value::as_object)
    }

    /// Merge new entries into the persisted `values` mapping.
    pub fn merge_values(&mut self, new_values: Map<String, Value>) {
        let entry = self
            .fields
            .entry(VALUES_KEY)
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(obj) = entry.as_object_mut() {
            for (k, v) in new_values {
                obj.insert(k, v);
            }
        }
    }

    /// A single value from the persisted `values` mapping.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<Value> {
        self.values().and_then(|v| v.get(key)).cloned()
    }

    /// The persisted task result, as stored by `save_success`.
    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        self.fields.get(RESULT_KEY)
    }

    /// Set the persisted task result.
    pub fn set_result(&mut self, result: Value) {
        self.fields.insert(RESULT_KEY.to_string(), result);
    }

    /// Whether this task is marked ignored.
    #[must_use]
    pub fn is_ignored(&self) -> bool {
        self.fields.get(IGNORE_KEY).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Mark or unmark this task as ignored.
    pub fn set_ignored(&mut self, ignored: bool) {
        if ignored {
            self.fields.insert(IGNORE_KEY.to_string(), Value::Bool(true));
        } else {
            self.fields.remove(IGNORE_KEY);
        }
    }

    /// The fingerprint previously recorded for a `file_dep` path.
    #[must_use]
    pub fn file_fingerprint(&self, path: &str) -> Option<FileFingerprint> {
        let v = self.fields.get(path)?;
        serde_json::from_value(v.clone()).ok()
    }

    /// Record a fingerprint for a `file_dep` path.
    pub fn set_file_fingerprint(&mut self, path: &str, fp: &FileFingerprint) {
        if let Ok(v) = serde_json::to_value(fp) {
            self.fields.insert(path.to_string(), v);
        }
    }

    /// Clear all persisted state for this task (used by `forget`).
    pub fn clear(&mut self) {
        self.fields.clear();
    }
}
