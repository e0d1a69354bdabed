//! The dispatcher: a cooperative, single-threaded scheduler that hands
//! one task at a time to the caller for classification and, if
//! necessary, execution — resolving dependencies lazily and round-robin
//! over a ready queue, a waiting set and a root stack.

use crate::error::{Error, Result};
use crate::node::{ExecNode, Phase, RunStatus};
use kiln_task::Tasks;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use tracing::{debug, trace};

/// A snapshot of one task's dependency lists at dispatcher construction
/// time. `task_dep` may grow later via the `calc_dep` effect.
#[derive(Debug, Clone, Default)]
struct DepsSnapshot {
    task_dep: Vec<String>,
    calc_dep: Vec<String>,
    setup_tasks: Vec<String>,
}

/// What the caller must do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Classify this task (up to date or must run) and report back with
    /// [`Dispatcher::report_status`].
    Classify(String),
    /// Run this task's actions (classification already decided `Run`,
    /// and any `setup_tasks` have finished) and report back with
    /// [`Dispatcher::report_outcome`].
    Execute(String),
    /// Nothing is ready right now, but other tasks are still in flight.
    /// A single-worker caller should treat this as "nothing to do until
    /// something else finishes" — in a cooperative loop this cannot
    /// actually happen since completions are reported synchronously, but
    /// it is exposed for multi-worker callers that dispatch executions to
    /// other threads.
    Wait,
    /// Every selected task (and its transitive dependencies) has
    /// finished.
    Done,
}

/// The result of classifying a task, as reported back to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyResult {
    /// The task is up to date; no need to run it.
    UpToDate,
    /// The task must run.
    Run,
}

/// The result of executing a task's actions, as reported back to the
/// dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Every action succeeded.
    Success,
    /// An action reported expected failure.
    Failure,
    /// An action raised an unexpected error.
    Error,
}

/// Cooperative dispatcher over a task set and a root selection.
pub struct Dispatcher {
    nodes: HashMap<String, ExecNode>,
    deps: HashMap<String, DepsSnapshot>,
    ready: VecDeque<String>,
    waiting: HashSet<String>,
    root_stack: Vec<String>,
    include_setup: bool,
    targets: HashMap<PathBuf, String>,
}

impl Dispatcher {
    /// Build a dispatcher over `selection` (already resolved task names,
    /// in the order they should be considered as roots). `include_setup`
    /// distinguishes a normal run (setup tasks only run when their owner
    /// must run) from a forced run that always executes setup tasks.
    /// `targets` is the graph's target -> producing-task index, used to
    /// re-run implicit task_dep injection against `file_dep` entries a
    /// `calc_dep` effect adds at run time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTask`] if `selection` names a task absent
    /// from `tasks`.
    pub fn new(tasks: &Tasks, selection: &[String], include_setup: bool, targets: HashMap<PathBuf, String>) -> Result<Self> {
        let mut deps = HashMap::new();
        for task in tasks.iter() {
            deps.insert(
                task.name.clone(),
                DepsSnapshot {
                    task_dep: task.task_dep.clone(),
                    calc_dep: task.calc_dep.clone(),
                    setup_tasks: task.setup_tasks.clone(),
                },
            );
        }

        let mut root_stack = Vec::with_capacity(selection.len());
        for name in selection {
            if !deps.contains_key(name) {
                return Err(Error::UnknownTask(name.clone()));
            }
            root_stack.push(name.clone());
        }
        root_stack.reverse();

        Ok(Self {
            nodes: HashMap::new(),
            deps,
            ready: VecDeque::new(),
            waiting: HashSet::new(),
            root_stack,
            include_setup,
            targets,
        })
    }

    /// Ensure a node exists for `name`, creating (and scheduling) it if
    /// this is the first time it has been reached. Returns whether a new
    /// node was created.
    fn get_or_create_node(&mut self, name: &str, ancestors: &[String]) -> Result<bool> {
        // Checked before the existing-node short-circuit: a dependency
        // edge back to an ancestor is a cycle regardless of whether that
        // ancestor's node happens to already exist from another path.
        if ancestors.iter().any(|a| a == name) {
            let mut path = ancestors.to_vec();
            path.push(name.to_string());
            return Err(Error::CycleDetected { path });
        }
        if self.nodes.contains_key(name) {
            return Ok(false);
        }
        if !self.deps.contains_key(name) {
            return Err(Error::UnknownTask(name.to_string()));
        }
        let mut node_ancestors = ancestors.to_vec();
        node_ancestors.push(name.to_string());
        self.nodes.insert(name.to_string(), ExecNode::new(name.to_string(), node_ancestors));
        Ok(true)
    }

    /// Pull the next action from the dispatcher. Call repeatedly, feeding
    /// back [`Dispatcher::report_status`] or [`Dispatcher::report_outcome`]
    /// as appropriate, until it returns [`Action::Done`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::CycleDetected`] if dependency expansion (possibly
    /// widened by a `calc_dep` result) discovers a cycle, or
    /// [`Error::UnknownTask`] if a dependency name does not resolve.
    pub fn next(&mut self) -> Result<Action> {
        loop {
            let name = if let Some(n) = self.ready.pop_front() {
                n
            } else if let Some(n) = self.root_stack.pop() {
                self.get_or_create_node(&n, &[])?;
                n
            } else if !self.waiting.is_empty() {
                return Ok(Action::Wait);
            } else {
                return Ok(Action::Done);
            };

            let phase = self.nodes.get(&name).map(|n| n.phase).unwrap_or(Phase::Finished);
            match phase {
                Phase::ExpandingDeps => {
                    if self.expand_deps(&name)? {
                        self.nodes.get_mut(&name).unwrap().phase = Phase::AwaitingClassification;
                        self.ready.push_front(name);
                    }
                    // else: parked in `waiting` by expand_deps.
                }
                Phase::AwaitingClassification => {
                    trace!(task = %name, "yielding for classification");
                    return Ok(Action::Classify(name));
                }
                Phase::AwaitingSetup => {
                    if self.setup_ready(&name)? {
                        self.nodes.get_mut(&name).unwrap().phase = Phase::AwaitingExecution;
                        self.ready.push_front(name);
                    }
                }
                Phase::AwaitingExecution => {
                    trace!(task = %name, "yielding for execution");
                    return Ok(Action::Execute(name));
                }
                Phase::Finished => {
                    // Already resolved (can happen if a node was queued
                    // twice); nothing to do.
                }
            }
        }
    }

    /// Expand `task_dep`/`calc_dep` into nodes; return `true` once every
    /// dependency has finished, parking this node in `waiting` (and
    /// registering it on each unfinished dependency's `waiting_me`)
    /// otherwise.
    fn expand_deps(&mut self, name: &str) -> Result<bool> {
        let snapshot = self.deps.get(name).cloned().unwrap_or_default();
        let ancestors = self.nodes.get(name).map(|n| n.ancestors.clone()).unwrap_or_default();

        let mut task_dep_remaining = HashSet::new();
        for dep in &snapshot.task_dep {
            if self.get_or_create_node(dep, &ancestors)? {
                self.ready.push_back(dep.clone());
            }
            if !self.is_finished(dep) {
                task_dep_remaining.insert(dep.clone());
            }
        }
        let mut calc_dep_remaining = HashSet::new();
        for dep in &snapshot.calc_dep {
            if self.get_or_create_node(dep, &ancestors)? {
                self.ready.push_back(dep.clone());
            }
            if !self.is_finished(dep) {
                calc_dep_remaining.insert(dep.clone());
            }
        }

        let satisfied = task_dep_remaining.is_empty() && calc_dep_remaining.is_empty();

        let node = self.nodes.get_mut(name).expect("node created by caller");
        node.task_dep_remaining = task_dep_remaining.clone();
        node.calc_dep_remaining = calc_dep_remaining.clone();

        if !satisfied {
            self.waiting.insert(name.to_string());
            for dep in task_dep_remaining.iter().chain(calc_dep_remaining.iter()) {
                self.nodes.get_mut(dep).expect("just created").waiting_me.insert(name.to_string());
            }
        }
        Ok(satisfied)
    }

    fn setup_ready(&mut self, name: &str) -> Result<bool> {
        let snapshot = self.deps.get(name).cloned().unwrap_or_default();
        let ancestors = self.nodes.get(name).map(|n| n.ancestors.clone()).unwrap_or_default();

        let mut remaining = HashSet::new();
        for dep in &snapshot.setup_tasks {
            if self.get_or_create_node(dep, &ancestors)? {
                self.ready.push_back(dep.clone());
            }
            if !self.is_finished(dep) {
                remaining.insert(dep.clone());
            }
        }
        let satisfied = remaining.is_empty();
        let node = self.nodes.get_mut(name).expect("node exists");
        node.setup_remaining = remaining.clone();

        if !satisfied {
            self.waiting.insert(name.to_string());
            for dep in &remaining {
                self.nodes.get_mut(dep).expect("just created").waiting_me.insert(name.to_string());
            }
        } else if self.include_setup {
            // Forced run: requeue setup tasks even if they'd otherwise be
            // considered already satisfied.
            for dep in &snapshot.setup_tasks {
                if self.nodes.get(dep).is_some_and(|n| n.phase != Phase::Finished) {
                    self.ready.push_back(dep.clone());
                }
            }
        }
        Ok(satisfied)
    }

    fn is_finished(&self, name: &str) -> bool {
        self.nodes.get(name).is_some_and(|n| n.run_status.is_some())
    }

    /// Report the classification of a task that was yielded via
    /// [`Action::Classify`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolViolation`] if `name` was not awaiting
    /// classification.
    pub fn report_status(&mut self, name: &str, result: ClassifyResult) -> Result<()> {
        let phase = self.nodes.get(name).map(|n| n.phase);
        if phase != Some(Phase::AwaitingClassification) {
            return Err(Error::ProtocolViolation {
                message: format!("'{name}' is not awaiting classification"),
            });
        }

        match result {
            ClassifyResult::UpToDate => {
                self.finish(name, RunStatus::UpToDate);
            }
            ClassifyResult::Run => {
                let has_setup = self.deps.get(name).is_some_and(|d| !d.setup_tasks.is_empty());
                if has_setup || self.include_setup {
                    self.nodes.get_mut(name).unwrap().phase = Phase::AwaitingSetup;
                    self.ready.push_back(name.to_string());
                } else {
                    self.nodes.get_mut(name).unwrap().phase = Phase::AwaitingExecution;
                    self.ready.push_back(name.to_string());
                }
            }
        }
        Ok(())
    }

    /// Report the outcome of executing a task that was yielded via
    /// [`Action::Execute`]. `tasks` is mutated with any `calc_dep` effect
    /// this outcome triggers: a finished `calc_dep` task's persisted
    /// `values` (`{"task_dep": [...], "file_dep": [...]}`) is merged into
    /// every node waiting on it as a `calc_dep`, re-deriving that node's
    /// dependencies once the calculator finishes. Any new `file_dep` that
    /// resolves to another task's target is also injected as an implicit
    /// `task_dep`, exactly as the graph's own construction-time injection
    /// does for `file_dep` declared up front.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolViolation`] if `name` was not awaiting
    /// execution.
    pub fn report_outcome(&mut self, name: &str, outcome: ExecutionOutcome, tasks: &mut Tasks) -> Result<()> {
        let phase = self.nodes.get(name).map(|n| n.phase);
        if phase != Some(Phase::AwaitingExecution) {
            return Err(Error::ProtocolViolation {
                message: format!("'{name}' is not awaiting execution"),
            });
        }

        let status = match outcome {
            ExecutionOutcome::Success => RunStatus::Success,
            ExecutionOutcome::Failure => RunStatus::Failure,
            ExecutionOutcome::Error => RunStatus::Error,
        };
        if status.is_terminal_ok() {
            self.apply_calc_dep_effect(name, tasks);
        }
        self.finish(name, status);
        Ok(())
    }

    fn apply_calc_dep_effect(&mut self, finished: &str, tasks: &mut Tasks) {
        let Some(values) = tasks.get(finished).map(|t| t.values.clone()) else {
            return;
        };
        let extra_task_dep: Vec<String> = values
            .get("task_dep")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let extra_file_dep: Vec<String> = values
            .get("file_dep")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        if extra_task_dep.is_empty() && extra_file_dep.is_empty() {
            return;
        }

        // A new file_dep that matches another task's target gets that
        // task injected as an implicit task_dep, same as construction-time
        // injection over the declared file_dep list.
        let mut implicit_task_dep = Vec::new();
        for file in &extra_file_dep {
            if let Some(producer) = self.targets.get(&PathBuf::from(file)) {
                if !extra_task_dep.contains(producer) && !implicit_task_dep.contains(producer) {
                    implicit_task_dep.push(producer.clone());
                }
            }
        }

        let waiting_on_calc: Vec<String> = self
            .nodes
            .get(finished)
            .into_iter()
            .flat_map(|n| n.waiting_me.iter().cloned())
            .filter(|waiter| {
                self.nodes
                    .get(waiter)
                    .is_some_and(|w| w.calc_dep_remaining.contains(finished))
            })
            .collect();

        for waiter in waiting_on_calc {
            if let Some(snapshot) = self.deps.get_mut(&waiter) {
                for dep in extra_task_dep.iter().chain(implicit_task_dep.iter()) {
                    if !snapshot.task_dep.contains(dep) {
                        snapshot.task_dep.push(dep.clone());
                    }
                }
            }
            if let Some(task) = tasks.get_mut(&waiter) {
                for dep in extra_task_dep.iter().chain(implicit_task_dep.iter()) {
                    if !task.task_dep.contains(dep) {
                        task.task_dep.push(dep.clone());
                    }
                }
                for file in &extra_file_dep {
                    let path = PathBuf::from(file);
                    if !task.file_dep.contains(&path) {
                        task.file_dep.push(path);
                    }
                }
            }
            debug!(task = %waiter, calc_source = %finished, "applied calc_dep effect");
        }
    }

    fn finish(&mut self, name: &str, status: RunStatus) {
        if let Some(node) = self.nodes.get_mut(name) {
            node.run_status = Some(status);
            node.phase = Phase::Finished;
        }
        self.waiting.remove(name);

        let waiting_me: Vec<String> = self.nodes.get(name).map(|n| n.waiting_me.iter().cloned().collect()).unwrap_or_default();
        for waiter_name in waiting_me {
            let mut became_ready = false;
            if let Some(waiter) = self.nodes.get_mut(&waiter_name) {
                waiter.task_dep_remaining.remove(name);
                waiter.calc_dep_remaining.remove(name);
                waiter.setup_remaining.remove(name);
                if !status.is_terminal_ok() {
                    waiter.bad_deps.push(name.to_string());
                }
                let deps_done = waiter.task_dep_remaining.is_empty() && waiter.calc_dep_remaining.is_empty();
                let setup_done = waiter.setup_remaining.is_empty();
                let still_waiting_anything = !deps_done
                    || (waiter.phase == Phase::AwaitingSetup && !setup_done);
                if !still_waiting_anything {
                    became_ready = true;
                }
            }
            if became_ready && self.waiting.remove(&waiter_name) {
                self.ready.push_back(waiter_name);
            }
        }
    }

    /// Finish a node directly with `status`, without classifying or
    /// executing it: used both when `bad_deps` is already non-empty (a
    /// derived failure from a failed ancestor) and when a classification
    /// itself cannot proceed (a dependency error discovered while
    /// evaluating `uptodate` predicates or resolving `getargs`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolViolation`] if `name` was not awaiting
    /// classification.
    pub fn finish_without_running(&mut self, name: &str, status: RunStatus) -> Result<()> {
        let phase = self.nodes.get(name).map(|n| n.phase);
        if phase != Some(Phase::AwaitingClassification) {
            return Err(Error::ProtocolViolation {
                message: format!("'{name}' is not awaiting classification"),
            });
        }
        self.finish(name, status);
        Ok(())
    }

    /// Whether any node has recorded a failed or errored dependency.
    #[must_use]
    pub fn bad_deps(&self, name: &str) -> &[String] {
        self.nodes.get(name).map(|n| n.bad_deps.as_slice()).unwrap_or(&[])
    }

    /// A node's final status, once finished.
    #[must_use]
    pub fn run_status(&self, name: &str) -> Option<RunStatus> {
        self.nodes.get(name).and_then(|n| n.run_status)
    }
}
