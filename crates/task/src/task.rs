//! The task data model.

use crate::action::Action;
use crate::uptodate::{TaskSetView, Uptodate};
use crate::value::TaskResultValue;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// A `getargs` entry: supply `param` to this task's actions from another
/// task's persisted `values[key]`.
#[derive(Debug, Clone)]
pub struct GetArg {
    /// Parameter name as seen by this task's actions.
    pub param: String,
    /// Name of the task whose persisted values are read.
    pub other_task: String,
    /// Key within that task's `values` mapping.
    pub key: String,
}

/// The unit of work. See the data model: a task with no `actions` is a
/// *group task*, purely an ordering container.
#[derive(Clone)]
pub struct Task {
    /// Stable identifier, unique per run. May contain `:` to denote a
    /// sub-task of a group (e.g. `gen:item1`).
    pub name: String,
    /// Ordered side-effecting steps. Empty for a group task.
    pub actions: Vec<Arc<dyn Action>>,
    /// Files this task reads.
    pub file_dep: Vec<PathBuf>,
    /// Files this task produces.
    pub targets: Vec<PathBuf>,
    /// Tasks that must run (or be confirmed up-to-date) before this one.
    pub task_dep: Vec<String>,
    /// Tasks that must run before this one executes, but only when this
    /// task itself is classified must-run.
    pub setup_tasks: Vec<String>,
    /// Tasks whose results extend this task's own dependencies once they
    /// finish.
    pub calc_dep: Vec<String>,
    /// Up-to-date predicate entries, evaluated in order.
    pub uptodate: Vec<Uptodate>,
    /// Glob patterns over task names, expanded at graph construction into
    /// `task_dep`.
    pub wild_dep: Vec<String>,
    /// `values` to persist across runs, supplied by the task definition
    /// before any action has run (actions may add more).
    pub values: serde_json::Map<String, serde_json::Value>,
    /// Parameters sourced from other tasks' persisted values.
    pub getargs: Vec<GetArg>,
    /// Actions to run after the whole run completes, if this task ran.
    pub teardown: Vec<Arc<dyn Action>>,
    /// Result of the last action that ran, if any.
    pub result: Option<TaskResultValue>,
}

impl Task {
    /// A bare group task: no actions, just a name.
    #[must_use]
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
            file_dep: Vec::new(),
            targets: Vec::new(),
            task_dep: Vec::new(),
            setup_tasks: Vec::new(),
            calc_dep: Vec::new(),
            uptodate: Vec::new(),
            wild_dep: Vec::new(),
            values: serde_json::Map::new(),
            getargs: Vec::new(),
            teardown: Vec::new(),
            result: None,
        }
    }

    /// Whether this is a group task (no actions of its own).
    #[must_use]
    pub fn is_group(&self) -> bool {
        self.actions.is_empty()
    }

    /// Resolve `getargs` into a map ready to hand to the action context,
    /// given an accessor over persisted per-task values. Returns the
    /// missing `(param, "other.key")` reference on the first failure, per
    /// the selection-time precondition in the design notes.
    pub fn resolve_getargs<F>(&self, mut get_value: F) -> Result<BTreeMap<String, serde_json::Value>, &GetArg>
    where
        F: FnMut(&str, &str) -> Option<serde_json::Value>,
    {
        let mut resolved = BTreeMap::new();
        for arg in &self.getargs {
            match get_value(&arg.other_task, &arg.key) {
                Some(v) => {
                    resolved.insert(arg.param.clone(), v);
                }
                None => return Err(arg),
            }
        }
        Ok(resolved)
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("actions", &self.actions.len())
            .field("file_dep", &self.file_dep)
            .field("targets", &self.targets)
            .field("task_dep", &self.task_dep)
            .field("setup_tasks", &self.setup_tasks)
            .field("calc_dep", &self.calc_dep)
            .field("wild_dep", &self.wild_dep)
            .finish_non_exhaustive()
    }
}

/// Lightweight, cloneable view of a task's dependency edges, used by the
/// graph. Kept separate from [`Task`] because the graph clones nodes
/// freely while a task's actions (trait objects) should not need to be.
#[derive(Debug, Clone, Default)]
pub struct TaskDeps {
    /// `task_dep` names (explicit + implicit-from-targets + wild_dep
    /// expansions), excluding `setup_tasks` which are gated separately.
    pub task_dep: Vec<String>,
}

impl TaskDeps {
    /// Build from a task's current `task_dep` list.
    #[must_use]
    pub fn from_task(task: &Task) -> Self {
        Self {
            task_dep: task.task_dep.clone(),
        }
    }

    /// Dependency names as seen by the graph.
    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.task_dep.iter().map(String::as_str)
    }

    /// Record a new dependency (used when applying group-level deps to
    /// leaf tasks).
    pub fn add_dependency(&mut self, dep: String) {
        if !self.task_dep.contains(&dep) {
            self.task_dep.push(dep);
        }
    }
}

/// An ordered, named collection of tasks: the external loader's output and
/// the core's only view of "all tasks this run knows about".
#[derive(Debug, Clone, Default)]
pub struct Tasks {
    order: Vec<String>,
    by_name: std::collections::HashMap<String, Task>,
}

impl Tasks {
    /// An empty task set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task, preserving first-seen definition order.
    pub fn insert(&mut self, task: Task) {
        let name = task.name.clone();
        if !self.by_name.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.by_name.insert(name, task);
    }

    /// Build a task set from the external loader's output, rejecting
    /// duplicate task names up front (the uniqueness check from the
    /// graph-construction sequence).
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidTaskSet`] if two tasks share a name.
    pub fn from_list(list: Vec<Task>) -> crate::Result<Self> {
        let mut tasks = Self::new();
        for task in list {
            if tasks.by_name.contains_key(&task.name) {
                return Err(crate::Error::InvalidTaskSet {
                    message: format!("task names must be unique: '{}' is duplicated", task.name),
                });
            }
            tasks.insert(task);
        }
        Ok(tasks)
    }

    /// Mutable access to a task by name (used by the graph to append
    /// wildcard-expanded and implicit dependencies).
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Task> {
        self.by_name.get_mut(name)
    }

    /// Look up a task by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Task> {
        self.by_name.get(name)
    }

    /// All task names in definition order.
    #[must_use]
    pub fn definition_order(&self) -> &[String] {
        &self.order
    }

    /// Number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterate tasks in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(move |n| self.by_name.get(n))
    }

    /// Names of sub-tasks of a group, i.e. tasks named `"{prefix}:*"`.
    #[must_use]
    pub fn subtask_names(&self, prefix: &str) -> Vec<String> {
        let pattern = format!("{prefix}:");
        self.order
            .iter()
            .filter(|n| n.starts_with(&pattern))
            .cloned()
            .collect()
    }
}

impl TaskSetView for Tasks {
    fn subtask_names(&self, task: &str) -> Vec<String> {
        Tasks::subtask_names(self, task)
    }
}
