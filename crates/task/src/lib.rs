//! Task data model: the `Task` type, its action contract, and the
//! up-to-date predicate tagged union shared by the graph, engine and
//! runner crates.

mod action;
mod error;
mod task;
mod uptodate;
mod value;

pub use action::{Action, ActionContext, ActionOutcome};
pub use error::{Error, Result};
pub use task::{GetArg, Task, TaskDeps, Tasks};
pub use uptodate::{TaskSetView, Uptodate, UptodateContext, UptodatePredicate, UptodateStoreView, ValueSaver};
pub use value::{FileFingerprint, TaskResultValue};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_task_has_no_actions() {
        let t = Task::group("build");
        assert!(t.is_group());
        assert_eq!(t.name, "build");
    }

    #[test]
    fn tasks_preserve_definition_order() {
        let mut tasks = Tasks::new();
        tasks.insert(Task::group("b"));
        tasks.insert(Task::group("a"));
        tasks.insert(Task::group("c"));
        assert_eq!(tasks.definition_order(), ["b", "a", "c"]);
    }

    #[test]
    fn subtask_names_match_colon_prefix() {
        let mut tasks = Tasks::new();
        tasks.insert(Task::group("gen"));
        tasks.insert(Task::group("gen:item1"));
        tasks.insert(Task::group("gen:item2"));
        tasks.insert(Task::group("other"));
        let mut subs = tasks.subtask_names("gen");
        subs.sort();
        assert_eq!(subs, ["gen:item1", "gen:item2"]);
    }

    #[test]
    fn resolve_getargs_fails_on_missing_reference() {
        let mut t = Task::group("consumer");
        t.getargs.push(GetArg {
            param: "x".into(),
            other_task: "producer".into(),
            key: "out".into(),
        });
        let result = t.resolve_getargs(|_task, _key| None);
        assert!(result.is_err());
    }

    #[test]
    fn resolve_getargs_succeeds_when_value_present() {
        let mut t = Task::group("consumer");
        t.getargs.push(GetArg {
            param: "x".into(),
            other_task: "producer".into(),
            key: "out".into(),
        });
        let result = t
            .resolve_getargs(|_task, _key| Some(serde_json::json!("value")))
            .unwrap();
        assert_eq!(result.get("x").unwrap(), "value");
    }
}
