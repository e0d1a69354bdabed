//! The five built-in `uptodate` predicates.

use kiln_task::{UptodateContext, UptodatePredicate};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const RUN_ONCE_KEY: &str = "run-once";
const TIMEOUT_KEY: &str = "success-time";

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Satisfied once it has run once and never needs to run again, unless
/// its persisted state is lost (e.g. the store is cleared).
#[derive(Debug, Default)]
pub struct RunOnce;

impl UptodatePredicate for RunOnce {
    fn check(&self, ctx: &mut UptodateContext<'_>) -> Option<bool> {
        ctx.value_savers.push(Box::new(|| {
            let mut m = Map::new();
            m.insert(RUN_ONCE_KEY.to_string(), Value::Bool(true));
            m
        }));
        Some(ctx.values.get(RUN_ONCE_KEY).and_then(Value::as_bool).unwrap_or(false))
    }
}

/// Up to date only while another task's persisted result matches what it
/// was the last time this task ran. Registers an implicit `task_dep` on
/// the tracked task so the dispatcher always resolves it first.
#[derive(Debug)]
pub struct ResultDep {
    dep_task_name: String,
}

impl ResultDep {
    /// Track the result of `dep_task_name`.
    #[must_use]
    pub fn new(dep_task_name: impl Into<String>) -> Self {
        Self {
            dep_task_name: dep_task_name.into(),
        }
    }
}

impl UptodatePredicate for ResultDep {
    fn check(&self, ctx: &mut UptodateContext<'_>) -> Option<bool> {
        ctx.extra_task_dep.push(self.dep_task_name.clone());

        let result_key = format!("_result:{}", self.dep_task_name);
        let subtasks = ctx.tasks.subtask_names(&self.dep_task_name);
        let dep_result = if subtasks.is_empty() {
            ctx.store
                .get(&self.dep_task_name, kiln_store::RESULT_KEY)
                .unwrap_or(Value::Null)
        } else {
            let mut group = Map::new();
            for sub in &subtasks {
                if let Some(v) = ctx.store.get(sub, kiln_store::RESULT_KEY) {
                    group.insert(sub.clone(), v);
                }
            }
            Value::Object(group)
        };

        let saved_result = dep_result.clone();
        let saved_key = result_key.clone();
        ctx.value_savers.push(Box::new(move || {
            let mut m = Map::new();
            m.insert(saved_key.clone(), saved_result.clone());
            m
        }));

        match ctx.values.get(&result_key) {
            None => Some(false),
            Some(prev) => Some(*prev == dep_result),
        }
    }
}

/// Up to date while a configuration value is unchanged across runs. A
/// string config is compared verbatim; any other JSON value is digested
/// deterministically (sorted keys for objects).
#[derive(Debug)]
pub struct ConfigChanged {
    digest: String,
}

impl ConfigChanged {
    /// Track a raw string configuration value, compared verbatim.
    #[must_use]
    pub fn from_string(config: impl Into<String>) -> Self {
        Self { digest: config.into() }
    }

    /// Track an arbitrary JSON configuration value, digested.
    #[must_use]
    pub fn from_value(config: &Value) -> Self {
        Self {
            digest: calc_digest(config),
        }
    }
}

fn calc_digest(config: &Value) -> String {
    match config {
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut buf = String::new();
            for key in keys {
                buf.push_str(key);
                buf.push_str(&map[key].to_string());
            }
            kiln_store::md5_hex_of_bytes(buf.as_bytes())
        }
        other => kiln_store::md5_hex_of_bytes(other.to_string().as_bytes()),
    }
}

impl UptodatePredicate for ConfigChanged {
    fn check(&self, ctx: &mut UptodateContext<'_>) -> Option<bool> {
        let digest = self.digest.clone();
        ctx.value_savers.push(Box::new(move || {
            let mut m = Map::new();
            m.insert(kiln_store::CONFIG_CHANGED_KEY.to_string(), Value::String(digest.clone()));
            m
        }));
        match ctx.values.get(kiln_store::CONFIG_CHANGED_KEY) {
            None => Some(false),
            Some(Value::String(prev)) => Some(*prev == self.digest),
            Some(_) => Some(false),
        }
    }
}

/// Up to date while less than `limit` wall-clock time has passed since
/// the task's last successful run.
#[derive(Debug)]
pub struct Timeout {
    limit_secs: f64,
}

impl Timeout {
    /// Construct from a duration.
    #[must_use]
    pub fn new(limit: Duration) -> Self {
        Self {
            limit_secs: limit.as_secs_f64(),
        }
    }
}

impl UptodatePredicate for Timeout {
    fn check(&self, ctx: &mut UptodateContext<'_>) -> Option<bool> {
        let now = now_secs();
        ctx.value_savers.push(Box::new(move || {
            let mut m = Map::new();
            m.insert(TIMEOUT_KEY.to_string(), Value::from(now));
            m
        }));
        match ctx.values.get(TIMEOUT_KEY).and_then(Value::as_f64) {
            None => Some(false),
            Some(prev) => Some(now - prev < self.limit_secs),
        }
    }
}

/// Which `stat` timestamp field [`CheckTimestampUnchanged`] compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeField {
    /// Last access time.
    Atime,
    /// Last inode-change time (metadata change, unix only).
    Ctime,
    /// Last modification time.
    Mtime,
}

/// How [`CheckTimestampUnchanged`] compares the stored and current
/// timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// Stored value equals current value (the default).
    Eq,
    /// Stored value differs from current value.
    Ne,
    /// Stored value is less than current value.
    Lt,
    /// Stored value is less than or equal to current value.
    Le,
    /// Stored value is greater than current value.
    Gt,
    /// Stored value is greater than or equal to current value.
    Ge,
}

impl CompareOp {
    fn apply(self, stored: f64, current: f64) -> bool {
        match self {
            CompareOp::Eq => stored == current,
            CompareOp::Ne => stored != current,
            CompareOp::Lt => stored < current,
            CompareOp::Le => stored <= current,
            CompareOp::Gt => stored > current,
            CompareOp::Ge => stored >= current,
        }
    }
}

/// Up to date while a file's chosen timestamp field still satisfies
/// `cmp_op` against the value recorded the last time this predicate ran.
/// Abstains (returns `None`) if the file cannot be statted.
#[derive(Debug)]
pub struct CheckTimestampUnchanged {
    path: PathBuf,
    field: TimeField,
    op: CompareOp,
}

impl CheckTimestampUnchanged {
    /// Compare `path`'s `field` timestamp with `op`, default `Eq`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, field: TimeField, op: CompareOp) -> Self {
        Self {
            path: path.into(),
            field,
            op,
        }
    }

    fn key(&self) -> String {
        let attr = match self.field {
            TimeField::Atime => "atime",
            TimeField::Ctime => "ctime",
            TimeField::Mtime => "mtime",
        };
        format!("{}.{attr}", self.path.display())
    }

    fn stat_time(&self) -> Option<f64> {
        let metadata = std::fs::metadata(&self.path).ok()?;
        match self.field {
            TimeField::Mtime => metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs_f64()),
            #[cfg(unix)]
            TimeField::Atime => {
                use std::os::unix::fs::MetadataExt;
                Some(metadata.atime() as f64 + metadata.atime_nsec() as f64 / 1e9)
            }
            #[cfg(unix)]
            TimeField::Ctime => {
                use std::os::unix::fs::MetadataExt;
                Some(metadata.ctime() as f64 + metadata.ctime_nsec() as f64 / 1e9)
            }
            #[cfg(not(unix))]
            _ => None,
        }
    }
}

impl UptodatePredicate for CheckTimestampUnchanged {
    fn check(&self, ctx: &mut UptodateContext<'_>) -> Option<bool> {
        let current = self.stat_time()?;
        let key = self.key();
        let op = self.op;
        let saved_key = key.clone();
        ctx.value_savers.push(Box::new(move || {
            let mut m = Map::new();
            m.insert(saved_key.clone(), Value::from(current));
            m
        }));
        match ctx.values.get(&key).and_then(Value::as_f64) {
            None => Some(false),
            Some(prev) => Some(op.apply(prev, current)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_task::{TaskSetView, UptodateStoreView};

    struct NoStore;
    impl UptodateStoreView for NoStore {
        fn get(&self, _task: &str, _key: &str) -> Option<Value> {
            None
        }
    }
    struct NoTasks;
    impl TaskSetView for NoTasks {
        fn subtask_names(&self, _task: &str) -> Vec<String> {
            Vec::new()
        }
    }

    fn fresh_ctx<'a>(
        values: &'a Map<String, Value>,
        value_savers: &'a mut Vec<kiln_task::ValueSaver>,
        extra_task_dep: &'a mut Vec<String>,
        store: &'a NoStore,
        tasks: &'a NoTasks,
    ) -> UptodateContext<'a> {
        UptodateContext {
            task_name: "t",
            values,
            value_savers,
            extra_task_dep,
            store,
            tasks,
        }
    }

    #[test]
    fn run_once_is_false_before_first_save() {
        let values = Map::new();
        let mut savers = Vec::new();
        let mut extra = Vec::new();
        let store = NoStore;
        let tasks = NoTasks;
        let mut ctx = fresh_ctx(&values, &mut savers, &mut extra, &store, &tasks);
        assert_eq!(RunOnce.check(&mut ctx), Some(false));
        assert_eq!(savers.len(), 1);
        assert_eq!(savers[0]().get(RUN_ONCE_KEY), Some(&Value::Bool(true)));
    }

    #[test]
    fn run_once_is_true_once_recorded() {
        let mut values = Map::new();
        values.insert(RUN_ONCE_KEY.to_string(), Value::Bool(true));
        let mut savers = Vec::new();
        let mut extra = Vec::new();
        let store = NoStore;
        let tasks = NoTasks;
        let mut ctx = fresh_ctx(&values, &mut savers, &mut extra, &store, &tasks);
        assert_eq!(RunOnce.check(&mut ctx), Some(true));
    }

    #[test]
    fn config_changed_digest_is_stable_for_same_object() {
        let a = ConfigChanged::from_value(&serde_json::json!({"b": 1, "a": 2}));
        let b = ConfigChanged::from_value(&serde_json::json!({"a": 2, "b": 1}));
        assert_eq!(a.digest, b.digest);
    }

    #[test]
    fn config_changed_false_on_first_run_then_true_when_matching() {
        let values = Map::new();
        let mut savers = Vec::new();
        let mut extra = Vec::new();
        let store = NoStore;
        let tasks = NoTasks;
        let predicate = ConfigChanged::from_string("v1");
        let mut ctx = fresh_ctx(&values, &mut savers, &mut extra, &store, &tasks);
        assert_eq!(predicate.check(&mut ctx), Some(false));

        let mut values = Map::new();
        values.insert(kiln_store::CONFIG_CHANGED_KEY.to_string(), Value::String("v1".to_string()));
        let mut savers = Vec::new();
        let mut ctx = fresh_ctx(&values, &mut savers, &mut extra, &store, &tasks);
        assert_eq!(predicate.check(&mut ctx), Some(true));
    }

    #[test]
    fn result_dep_registers_implicit_task_dep() {
        let values = Map::new();
        let mut savers = Vec::new();
        let mut extra = Vec::new();
        let store = NoStore;
        let tasks = NoTasks;
        let predicate = ResultDep::new("producer");
        let mut ctx = fresh_ctx(&values, &mut savers, &mut extra, &store, &tasks);
        predicate.check(&mut ctx);
        assert_eq!(extra, vec!["producer".to_string()]);
    }

    #[test]
    fn timeout_is_false_with_no_prior_record() {
        let values = Map::new();
        let mut savers = Vec::new();
        let mut extra = Vec::new();
        let store = NoStore;
        let tasks = NoTasks;
        let predicate = Timeout::new(Duration::from_secs(60));
        let mut ctx = fresh_ctx(&values, &mut savers, &mut extra, &store, &tasks);
        assert_eq!(predicate.check(&mut ctx), Some(false));
    }

    #[test]
    fn check_timestamp_unchanged_abstains_on_missing_file() {
        let predicate = CheckTimestampUnchanged::new("/no/such/file", TimeField::Mtime, CompareOp::Eq);
        let values = Map::new();
        let mut savers = Vec::new();
        let mut extra = Vec::new();
        let store = NoStore;
        let tasks = NoTasks;
        let mut ctx = fresh_ctx(&values, &mut savers, &mut extra, &store, &tasks);
        assert_eq!(predicate.check(&mut ctx), None);
    }
}
