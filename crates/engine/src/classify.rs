//! The up-to-date classification algorithm: six steps deciding whether a
//! task must run.

use crate::error::{Error, Result};
use kiln_task::{FileFingerprint, Task, TaskSetView, UptodateContext, UptodateStoreView, ValueSaver};
use std::path::PathBuf;
use tracing::{debug, trace};

/// Outcome of classifying a task.
#[derive(Debug)]
pub enum Status {
    /// Every up-to-date check passed; the task can be skipped.
    UpToDate,
    /// The task must run. `changed_file_deps` lists the `file_dep`
    /// entries that triggered the decision (empty when a predicate or a
    /// missing target was the cause rather than a file change).
    Run { changed_file_deps: Vec<PathBuf> },
}

/// Result of a classification pass: the status, plus the side effects a
/// successful run (or a predicate satisfied without running) should
/// persist.
pub struct Classification {
    /// Whether the task is up to date or must run.
    pub status: Status,
    /// Value-saver callbacks registered by `uptodate` predicates during
    /// this pass. The runner invokes these and merges their output into
    /// the task's persisted `values` after a successful run.
    pub value_savers: Vec<ValueSaver>,
    /// Extra `task_dep` entries predicates asked for (e.g. `result_dep`'s
    /// implicit dependency on the task it tracks).
    pub extra_task_dep: Vec<String>,
}

impl Classification {
    /// Shorthand for a clean bill of health with no side effects.
    fn up_to_date() -> Self {
        Self {
            status: Status::UpToDate,
            value_savers: Vec::new(),
            extra_task_dep: Vec::new(),
        }
    }

    fn run(changed_file_deps: Vec<PathBuf>, value_savers: Vec<ValueSaver>, extra_task_dep: Vec<String>) -> Self {
        Self {
            status: Status::Run { changed_file_deps },
            value_savers,
            extra_task_dep,
        }
    }
}

/// Classify `task` against its persisted state.
///
/// Six steps, in order: the `ignore` flag; `uptodate` predicates (abstain
/// on `None`, force a run on the first `Some(false)`); "no file_dep and
/// nothing voted up-to-date" forces a run; a missing target forces a run;
/// a changed `file_dep` forces a run; otherwise the task is up to date.
///
/// # Errors
///
/// Returns an error if a `file_dep` cannot be statted or hashed.
pub fn classify(
    task: &Task,
    store: &dyn UptodateStoreView,
    tasks: &dyn TaskSetView,
) -> Result<Classification> {
    // Step 1: ignore flag.
    if store.get(&task.name, kiln_store::IGNORE_KEY) == Some(serde_json::Value::Bool(true)) {
        debug!(task = %task.name, "ignored, treating as up to date");
        return Ok(Classification::up_to_date());
    }

    let values = store.get(&task.name, kiln_store::VALUES_KEY)
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();

    // Step 2: uptodate predicates.
    let mut value_savers = Vec::new();
    let mut extra_task_dep = Vec::new();
    let mut checked_uptodate = false;
    for entry in &task.uptodate {
        let mut ctx = UptodateContext {
            task_name: &task.name,
            values: &values,
            value_savers: &mut value_savers,
            extra_task_dep: &mut extra_task_dep,
            store,
            tasks,
        };
        match entry.check(&mut ctx) {
            None => {
                trace!(task = %task.name, "uptodate entry abstained");
            }
            Some(false) => {
                debug!(task = %task.name, "uptodate predicate forced a run");
                return Ok(Classification::run(Vec::new(), value_savers, extra_task_dep));
            }
            Some(true) => {
                checked_uptodate = true;
            }
        }
    }

    // Step 3: no file_dep and nothing vouched for up-to-date-ness.
    if task.file_dep.is_empty() && !checked_uptodate {
        debug!(task = %task.name, "no file_dep and no uptodate check passed, running");
        return Ok(Classification::run(Vec::new(), value_savers, extra_task_dep));
    }

    // Step 4: missing target.
    for target in &task.targets {
        if !target.exists() {
            debug!(task = %task.name, target = %target.display(), "target missing, running");
            return Ok(Classification::run(task.file_dep.clone(), value_savers, extra_task_dep));
        }
    }

    // Step 5: file fingerprint comparison.
    let mut changed = Vec::new();
    for file_dep in &task.file_dep {
        if let Err(err) = std::fs::metadata(file_dep) {
            if err.kind() == std::io::ErrorKind::NotFound {
                return Err(Error::MissingFileDep {
                    task: task.name.clone(),
                    path: file_dep.clone(),
                });
            }
            return Err(Error::Io(err));
        }

        let key = file_dep.display().to_string();
        let stored: Option<FileFingerprint> = store
            .get(&task.name, &key)
            .and_then(|v| serde_json::from_value(v).ok());

        let file_changed = match stored {
            Some(fp) => kiln_store::has_changed(&fp, file_dep)?,
            None => true,
        };
        if file_changed {
            changed.push(file_dep.clone());
        }
    }

    if !changed.is_empty() {
        debug!(task = %task.name, changed = changed.len(), "file_dep changed, running");
        return Ok(Classification::run(changed, value_savers, extra_task_dep));
    }

    // Step 6: up to date.
    Ok(Classification {
        status: Status::UpToDate,
        value_savers,
        extra_task_dep,
    })
}
