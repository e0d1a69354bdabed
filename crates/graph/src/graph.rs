//! Task graph construction: uniqueness, wildcard expansion, target
//! indexing, implicit dependency injection, and selection resolution.
//!
//! Grounded on the five-step construction sequence from the component
//! design: (a) uniqueness is enforced by `Tasks::from_list` before this
//! type ever sees the task set; (b)-(e) happen in [`TaskGraph::build`].

use crate::error::{Error, Result};
use kiln_task::{Task, Tasks};
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

/// A validated, indexed view of a task set: target index, wildcard
/// expansion and implicit task-dep injection already applied.
pub struct TaskGraph {
    graph: DiGraph<String, ()>,
    name_to_node: HashMap<String, NodeIndex>,
    targets: HashMap<PathBuf, String>,
    order: Vec<String>,
}

impl TaskGraph {
    /// Construct a graph from a task set, mutating `tasks` in place to
    /// append wildcard-expanded and implicit dependencies (mirroring the
    /// reference construction, which mutates `task.task_dep` directly).
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingDependencies`] if a `task_dep` or
    /// `setup_tasks` entry names an unknown task, or
    /// [`Error::DuplicateTarget`] if two tasks share a target path.
    pub fn build(tasks: &mut Tasks) -> Result<Self> {
        let order: Vec<String> = tasks.definition_order().to_vec();

        // (b) expand wild_dep patterns against known task names.
        for name in &order {
            let wild = tasks.get(name).map(|t| t.wild_dep.clone()).unwrap_or_default();
            if wild.is_empty() {
                continue;
            }
            let mut matches = Vec::new();
            for pattern in &wild {
                let Ok(pat) = glob::Pattern::new(pattern) else {
                    continue;
                };
                for candidate in &order {
                    if candidate != name && pat.matches(candidate) {
                        matches.push(candidate.clone());
                    }
                }
            }
            if let Some(task) = tasks.get_mut(name) {
                for m in matches {
                    if !task.task_dep.contains(&m) {
                        task.task_dep.push(m);
                    }
                }
            }
        }
        debug!("expanded wild_dep for {} tasks", order.len());

        // (c) validate task_dep / setup_tasks resolve to known tasks.
        let mut missing = Vec::new();
        for name in &order {
            let task = tasks.get(name).expect("name came from definition_order");
            for dep in task.task_dep.iter().chain(task.setup_tasks.iter()).chain(task.calc_dep.iter()) {
                if !order.iter().any(|n| n == dep) {
                    missing.push((name.clone(), dep.clone()));
                }
            }
        }
        if !missing.is_empty() {
            return Err(Error::MissingDependencies { missing });
        }

        // (d) target -> task-name index with duplicate detection.
        let mut target_index: HashMap<PathBuf, String> = HashMap::new();
        for name in &order {
            let task = tasks.get(name).expect("name came from definition_order");
            for target in &task.targets {
                if let Some(existing) = target_index.get(target) {
                    return Err(Error::DuplicateTarget {
                        target: target.display().to_string(),
                        first: existing.clone(),
                        second: name.clone(),
                    });
                }
                target_index.insert(target.clone(), name.clone());
            }
        }
        debug!("indexed {} targets", target_index.len());

        // (e) implicit task_dep injection: file_dep matching another
        // task's target appends the producer to task_dep.
        for name in &order {
            let file_dep = tasks.get(name).map(|t| t.file_dep.clone()).unwrap_or_default();
            let mut to_add = Vec::new();
            for dep in &file_dep {
                if let Some(producer) = target_index.get(dep) {
                    if producer != name {
                        to_add.push(producer.clone());
                    }
                }
            }
            if let Some(task) = tasks.get_mut(name) {
                for producer in to_add {
                    if !task.task_dep.contains(&producer) {
                        task.task_dep.push(producer);
                    }
                }
            }
        }

        // Build the structural petgraph view over the (now final)
        // task_dep edges, excluding setup edges per the invariant that
        // the effective dependency graph is setup-free.
        let mut graph = DiGraph::new();
        let mut name_to_node = HashMap::new();
        for name in &order {
            name_to_node.insert(name.clone(), graph.add_node(name.clone()));
        }
        for name in &order {
            let task = tasks.get(name).expect("name came from definition_order");
            let &consumer = name_to_node.get(name).expect("node added above");
            for dep in &task.task_dep {
                let &producer = name_to_node.get(dep).expect("validated above");
                graph.add_edge(producer, consumer, ());
            }
        }

        Ok(Self {
            graph,
            name_to_node,
            targets: target_index,
            order,
        })
    }

    /// Whether the effective dependency graph contains a cycle.
    #[must_use]
    pub fn has_cycles(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Run the pre-flight acyclicity check, returning the full cycle path
    /// (as task names, joined by the caller) if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CycleDetected`] naming every task on one cycle.
    pub fn validate_acyclic(&self) -> Result<()> {
        if let Some(path) = self.find_cycle() {
            return Err(Error::CycleDetected { path });
        }
        Ok(())
    }

    /// Task names in dependency order (every task after all of its
    /// `task_dep`). Used by callers that want a single-threaded execution
    /// order without going through the dispatcher's cooperative protocol.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CycleDetected`] if the graph is not a DAG.
    pub fn topological_sort(&self) -> Result<Vec<String>> {
        toposort(&self.graph, None)
            .map(|nodes| nodes.into_iter().map(|n| self.graph[n].clone()).collect())
            .map_err(|cycle| {
                let path = self
                    .find_cycle()
                    .unwrap_or_else(|| vec![self.graph[cycle.node_id()].clone()]);
                Error::CycleDetected { path }
            })
    }

    fn find_cycle(&self) -> Option<Vec<String>> {
        if !self.has_cycles() {
            return None;
        }
        // DFS with an explicit stack, recording the path; the first back
        // edge we hit closes the cycle.
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            InProgress,
            Done,
        }
        let mut marks: HashMap<NodeIndex, Mark> = HashMap::new();
        let mut stack: Vec<NodeIndex> = Vec::new();

        fn visit(
            graph: &DiGraph<String, ()>,
            node: NodeIndex,
            marks: &mut HashMap<NodeIndex, Mark>,
            stack: &mut Vec<NodeIndex>,
        ) -> Option<Vec<NodeIndex>> {
            if let Some(pos) = stack.iter().position(|n| *n == node) {
                return Some(stack[pos..].to_vec());
            }
            if marks.get(&node) == Some(&Mark::Done) {
                return None;
            }
            stack.push(node);
            for neighbor in graph.neighbors(node) {
                if let Some(cycle) = visit(graph, neighbor, marks, stack) {
                    return Some(cycle);
                }
            }
            stack.pop();
            marks.insert(node, Mark::Done);
            None
        }

        for &start in self.name_to_node.values() {
            if let Some(cycle) = visit(&self.graph, start, &mut marks, &mut stack) {
                let mut path: Vec<String> = cycle.iter().map(|&n| self.graph[n].clone()).collect();
                if let Some(first) = path.first().cloned() {
                    path.push(first);
                }
                return Some(path);
            }
        }
        None
    }

    /// Resolve a user selection (task names, target paths, globs over
    /// task names) into an ordered list of task names. An empty selection
    /// means "all tasks in definition order".
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownSelection`] for a token that matches
    /// neither a task, a target, nor any task name by glob.
    pub fn filter(&self, selection: &[String]) -> Result<Vec<String>> {
        if selection.is_empty() {
            return Ok(self.order.clone());
        }
        let mut result = Vec::new();
        for token in selection {
            if self.name_to_node.contains_key(token) {
                result.push(token.clone());
                continue;
            }
            if let Some(producer) = self.targets.get(&PathBuf::from(token)) {
                result.push(producer.clone());
                continue;
            }
            if let Ok(pat) = glob::Pattern::new(token) {
                if pat.as_str().contains(['*', '?', '[']) {
                    let matches: Vec<String> =
                        self.order.iter().filter(|n| pat.matches(n)).cloned().collect();
                    if !matches.is_empty() {
                        result.extend(matches);
                        continue;
                    }
                }
            }
            return Err(Error::UnknownSelection { token: token.clone() });
        }
        Ok(result)
    }

    /// Look up the task data for a resolved name.
    #[must_use]
    pub fn task<'a>(&self, tasks: &'a Tasks, name: &str) -> Option<&'a Task> {
        tasks.get(name)
    }

    /// Task names in definition order.
    #[must_use]
    pub fn definition_order(&self) -> &[String] {
        &self.order
    }

    /// Whether a name is known to the graph.
    #[must_use]
    pub fn contains_task(&self, name: &str) -> bool {
        self.name_to_node.contains_key(name)
    }

    /// Number of tasks in the graph.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.order.len()
    }

    /// The target -> producing-task index, for callers (e.g. the
    /// dispatcher) that need to re-run implicit injection against
    /// calc-dep-produced `file_dep` entries.
    #[must_use]
    pub fn targets(&self) -> &HashMap<PathBuf, String> {
        &self.targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_task::Task;

    fn group(name: &str, deps: &[&str]) -> Task {
        let mut t = Task::group(name);
        t.task_dep = deps.iter().map(|s| s.to_string()).collect();
        t
    }

    #[test]
    fn build_rejects_missing_dependency() {
        let mut tasks = Tasks::from_list(vec![group("a", &["ghost"])]).unwrap();
        let err = TaskGraph::build(&mut tasks).unwrap_err();
        assert!(matches!(err, Error::MissingDependencies { .. }));
    }

    #[test]
    fn build_rejects_duplicate_targets() {
        let mut a = Task::group("a");
        a.targets = vec![PathBuf::from("out.txt")];
        let mut b = Task::group("b");
        b.targets = vec![PathBuf::from("out.txt")];
        let mut tasks = Tasks::from_list(vec![a, b]).unwrap();
        let err = TaskGraph::build(&mut tasks).unwrap_err();
        assert!(matches!(err, Error::DuplicateTarget { .. }));
    }

    #[test]
    fn implicit_task_dep_via_target() {
        let mut a = Task::group("a");
        a.targets = vec![PathBuf::from("t")];
        let mut b = Task::group("b");
        b.file_dep = vec![PathBuf::from("t")];
        let mut tasks = Tasks::from_list(vec![a, b]).unwrap();
        TaskGraph::build(&mut tasks).unwrap();
        assert!(tasks.get("b").unwrap().task_dep.contains(&"a".to_string()));
    }

    #[test]
    fn wildcard_expands_to_matching_task_names() {
        let mut root = Task::group("root");
        root.wild_dep = vec!["gen:*".to_string()];
        let tasks_list = vec![root, group("gen:item1", &[]), group("gen:item2", &[])];
        let mut tasks = Tasks::from_list(tasks_list).unwrap();
        TaskGraph::build(&mut tasks).unwrap();
        let deps = &tasks.get("root").unwrap().task_dep;
        assert!(deps.contains(&"gen:item1".to_string()));
        assert!(deps.contains(&"gen:item2".to_string()));
    }

    #[test]
    fn detects_cycle() {
        let mut tasks = Tasks::from_list(vec![group("a", &["b"]), group("b", &["a"])]).unwrap();
        let graph = TaskGraph::build(&mut tasks).unwrap();
        assert!(graph.has_cycles());
        let err = graph.validate_acyclic().unwrap_err();
        assert!(matches!(err, Error::CycleDetected { .. }));
    }

    #[test]
    fn filter_empty_selection_is_definition_order() {
        let mut tasks = Tasks::from_list(vec![group("a", &[]), group("b", &[])]).unwrap();
        let graph = TaskGraph::build(&mut tasks).unwrap();
        assert_eq!(graph.filter(&[]).unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn filter_by_target_resolves_to_producing_task() {
        let mut a = Task::group("a");
        a.targets = vec![PathBuf::from("out.bin")];
        let mut tasks = Tasks::from_list(vec![a]).unwrap();
        let graph = TaskGraph::build(&mut tasks).unwrap();
        let resolved = graph.filter(&["out.bin".to_string()]).unwrap();
        assert_eq!(resolved, vec!["a".to_string()]);
    }

    #[test]
    fn filter_unknown_token_fails_whole_selection() {
        let mut tasks = Tasks::from_list(vec![group("a", &[])]).unwrap();
        let graph = TaskGraph::build(&mut tasks).unwrap();
        let err = graph.filter(&["nonexistent".to_string()]).unwrap_err();
        assert!(matches!(err, Error::UnknownSelection { .. }));
    }
}
