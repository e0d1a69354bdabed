//! Dispatcher: a cooperative, single-threaded scheduler over a task
//! set's dependency graph. Hands the caller one task name at a time to
//! classify or execute, resolving `task_dep`/`calc_dep`/`setup_tasks`
//! lazily via a ready queue, a waiting set and a root stack.

mod dispatcher;
mod error;
mod node;

pub use dispatcher::{Action, ClassifyResult, Dispatcher, ExecutionOutcome};
pub use error::{Error, Result};
pub use node::RunStatus;

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_task::{Task, Tasks};
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn group(name: &str, task_dep: &[&str]) -> Task {
        let mut t = Task::group(name);
        t.task_dep = task_dep.iter().map(|s| s.to_string()).collect();
        t
    }

    fn no_targets() -> HashMap<PathBuf, String> {
        HashMap::new()
    }

    #[test]
    fn single_task_classified_and_finishes_up_to_date() {
        let tasks = Tasks::from_list(vec![group("a", &[])]).unwrap();
        let mut dispatcher = Dispatcher::new(&tasks, &["a".to_string()], false, no_targets()).unwrap();
        assert_eq!(dispatcher.next().unwrap(), Action::Classify("a".to_string()));
        dispatcher.report_status("a", ClassifyResult::UpToDate).unwrap();
        assert_eq!(dispatcher.next().unwrap(), Action::Done);
        assert_eq!(dispatcher.run_status("a"), Some(RunStatus::UpToDate));
    }

    #[test]
    fn dependency_is_classified_before_dependent() {
        let tasks = Tasks::from_list(vec![group("a", &["b"]), group("b", &[])]).unwrap();
        let mut dispatcher = Dispatcher::new(&tasks, &["a".to_string()], false, no_targets()).unwrap();
        assert_eq!(dispatcher.next().unwrap(), Action::Classify("b".to_string()));
        dispatcher.report_status("b", ClassifyResult::UpToDate).unwrap();
        assert_eq!(dispatcher.next().unwrap(), Action::Classify("a".to_string()));
        dispatcher.report_status("a", ClassifyResult::UpToDate).unwrap();
        assert_eq!(dispatcher.next().unwrap(), Action::Done);
    }

    #[test]
    fn run_classification_yields_execute_before_finishing() {
        let tasks = Tasks::from_list(vec![group("a", &[])]).unwrap();
        let mut dispatcher = Dispatcher::new(&tasks, &["a".to_string()], false, no_targets()).unwrap();
        assert_eq!(dispatcher.next().unwrap(), Action::Classify("a".to_string()));
        dispatcher.report_status("a", ClassifyResult::Run).unwrap();
        assert_eq!(dispatcher.next().unwrap(), Action::Execute("a".to_string()));
        let mut tasks = tasks;
        dispatcher.report_outcome("a", ExecutionOutcome::Success, &mut tasks).unwrap();
        assert_eq!(dispatcher.next().unwrap(), Action::Done);
        assert_eq!(dispatcher.run_status("a"), Some(RunStatus::Success));
    }

    #[test]
    fn setup_tasks_run_before_execution_only_when_owner_must_run() {
        let mut owner = group("build", &[]);
        owner.setup_tasks = vec!["prepare".to_string()];
        let tasks = Tasks::from_list(vec![owner, group("prepare", &[])]).unwrap();
        let mut dispatcher = Dispatcher::new(&tasks, &["build".to_string()], false, no_targets()).unwrap();

        assert_eq!(dispatcher.next().unwrap(), Action::Classify("build".to_string()));
        dispatcher.report_status("build", ClassifyResult::Run).unwrap();
        // setup_tasks only gate once classified Run.
        assert_eq!(dispatcher.next().unwrap(), Action::Classify("prepare".to_string()));
        dispatcher.report_status("prepare", ClassifyResult::UpToDate).unwrap();
        assert_eq!(dispatcher.next().unwrap(), Action::Execute("build".to_string()));
    }

    #[test]
    fn failed_dependency_is_recorded_as_a_bad_dep() {
        let tasks = Tasks::from_list(vec![group("a", &["b"]), group("b", &[])]).unwrap();
        let mut dispatcher = Dispatcher::new(&tasks, &["a".to_string()], false, no_targets()).unwrap();
        assert_eq!(dispatcher.next().unwrap(), Action::Classify("b".to_string()));
        dispatcher.report_status("b", ClassifyResult::Run).unwrap();
        assert_eq!(dispatcher.next().unwrap(), Action::Execute("b".to_string()));
        let mut tasks = tasks;
        dispatcher.report_outcome("b", ExecutionOutcome::Failure, &mut tasks).unwrap();
        assert_eq!(dispatcher.next().unwrap(), Action::Classify("a".to_string()));
        assert_eq!(dispatcher.bad_deps("a"), &["b".to_string()]);
    }

    #[test]
    fn cycle_among_selected_tasks_is_detected() {
        let tasks = Tasks::from_list(vec![group("a", &["b"]), group("b", &["a"])]).unwrap();
        let mut dispatcher = Dispatcher::new(&tasks, &["a".to_string()], false, no_targets()).unwrap();
        let err = dispatcher.next().unwrap_err();
        assert!(matches!(err, Error::CycleDetected { .. }));
    }

    #[test]
    fn unknown_root_selection_is_rejected_up_front() {
        let tasks = Tasks::from_list(vec![group("a", &[])]).unwrap();
        let err = Dispatcher::new(&tasks, &["ghost".to_string()], false, no_targets()).unwrap_err();
        assert!(matches!(err, Error::UnknownTask(_)));
    }

    #[test]
    fn reporting_outcome_out_of_turn_is_a_protocol_violation() {
        let tasks = Tasks::from_list(vec![group("a", &[])]).unwrap();
        let mut dispatcher = Dispatcher::new(&tasks, &["a".to_string()], false, no_targets()).unwrap();
        let mut tasks = tasks;
        let err = dispatcher.report_outcome("a", ExecutionOutcome::Success, &mut tasks).unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation { .. }));
    }

    #[test]
    fn calc_dep_result_extends_waiting_tasks_dependencies() {
        let mut consumer = group("consumer", &[]);
        consumer.calc_dep = vec!["deriver".to_string()];
        let tasks = Tasks::from_list(vec![consumer, group("deriver", &[]), group("extra", &[])]).unwrap();
        let mut tasks = tasks;
        let mut dispatcher = Dispatcher::new(&tasks, &["consumer".to_string()], false, no_targets()).unwrap();

        assert_eq!(dispatcher.next().unwrap(), Action::Classify("deriver".to_string()));
        dispatcher.report_status("deriver", ClassifyResult::Run).unwrap();
        assert_eq!(dispatcher.next().unwrap(), Action::Execute("deriver".to_string()));

        tasks
            .get_mut("deriver")
            .unwrap()
            .values
            .insert("task_dep".to_string(), serde_json::json!(["extra"]));
        dispatcher.report_outcome("deriver", ExecutionOutcome::Success, &mut tasks).unwrap();

        assert_eq!(dispatcher.next().unwrap(), Action::Classify("extra".to_string()));
        dispatcher.report_status("extra", ClassifyResult::UpToDate).unwrap();
        assert_eq!(dispatcher.next().unwrap(), Action::Classify("consumer".to_string()));
        assert!(tasks.get("consumer").unwrap().task_dep.contains(&"extra".to_string()));
    }

    #[test]
    fn calc_dep_file_dep_injects_implicit_task_dep_via_targets() {
        let mut consumer = group("consumer", &[]);
        consumer.calc_dep = vec!["deriver".to_string()];
        let mut extra = group("extra", &[]);
        extra.targets = vec![PathBuf::from("extra.out")];
        let tasks = Tasks::from_list(vec![consumer, group("deriver", &[]), extra]).unwrap();
        let mut tasks = tasks;
        let mut targets = no_targets();
        targets.insert(PathBuf::from("extra.out"), "extra".to_string());
        let mut dispatcher = Dispatcher::new(&tasks, &["consumer".to_string()], false, targets).unwrap();

        assert_eq!(dispatcher.next().unwrap(), Action::Classify("deriver".to_string()));
        dispatcher.report_status("deriver", ClassifyResult::Run).unwrap();
        assert_eq!(dispatcher.next().unwrap(), Action::Execute("deriver".to_string()));

        tasks
            .get_mut("deriver")
            .unwrap()
            .values
            .insert("file_dep".to_string(), serde_json::json!(["extra.out"]));
        dispatcher.report_outcome("deriver", ExecutionOutcome::Success, &mut tasks).unwrap();

        assert_eq!(dispatcher.next().unwrap(), Action::Classify("extra".to_string()));
        dispatcher.report_status("extra", ClassifyResult::UpToDate).unwrap();
        assert_eq!(dispatcher.next().unwrap(), Action::Classify("consumer".to_string()));
        assert!(tasks.get("consumer").unwrap().task_dep.contains(&"extra".to_string()));
        assert!(tasks.get("consumer").unwrap().file_dep.contains(&PathBuf::from("extra.out")));
    }

    #[test]
    fn node_with_bad_dep_finishes_without_classification() {
        let tasks = Tasks::from_list(vec![group("a", &["b"]), group("b", &[])]).unwrap();
        let mut dispatcher = Dispatcher::new(&tasks, &["a".to_string()], false, no_targets()).unwrap();
        assert_eq!(dispatcher.next().unwrap(), Action::Classify("b".to_string()));
        dispatcher.report_status("b", ClassifyResult::Run).unwrap();
        assert_eq!(dispatcher.next().unwrap(), Action::Execute("b".to_string()));
        let mut tasks = tasks;
        dispatcher.report_outcome("b", ExecutionOutcome::Failure, &mut tasks).unwrap();
        assert_eq!(dispatcher.next().unwrap(), Action::Classify("a".to_string()));
        dispatcher.finish_without_running("a", RunStatus::Failure).unwrap();
        assert_eq!(dispatcher.next().unwrap(), Action::Done);
        assert_eq!(dispatcher.run_status("a"), Some(RunStatus::Failure));
    }
}
