//! The runner: pulls actions from a [`Dispatcher`] and drives them to
//! completion, either serially (one task at a time, `max_parallel == 0`)
//! or across a fixed pool of worker threads that execute tasks
//! concurrently while classification stays on the controlling thread.

use crate::config::{RunnerConfig, StoreBackend};
use crate::error::{Error, Result};
use crate::reporter::Reporter;
use crate::result::RunResult;
use kiln_dispatch::{Action as DispatchAction, ClassifyResult, Dispatcher, ExecutionOutcome, RunStatus};
use kiln_engine::Status;
use kiln_store::DependencyStore;
use kiln_task::{Action, ActionContext, ActionOutcome, TaskResultValue, Tasks, ValueSaver};
use std::collections::{BTreeMap, HashMap};
use std::sync::{mpsc, Arc, Mutex};

enum ActionRunOutcome {
    Success,
    Failed(String),
    Error(String),
}

/// Run `selection` (and its transitive dependencies) from `tasks` to
/// completion, reporting progress through `reporter`. Dispatches across
/// `config.max_parallel` worker threads, or runs serially on the calling
/// thread when it is `0`.
///
/// # Errors
///
/// Returns an error if graph construction rejects the task set, if the
/// dispatcher detects a cycle or unknown task, if classification cannot
/// stat a `file_dep`, if the store cannot be opened or written, or if
/// the dispatcher ever yields [`DispatchAction::Wait`] with no work in
/// flight to unblock it (a scheduling bug).
pub fn run(tasks: &mut Tasks, selection: &[String], config: &RunnerConfig, reporter: &mut dyn Reporter) -> Result<RunResult> {
    let graph = kiln_graph::TaskGraph::build(tasks)?;
    let targets = graph.targets().clone();
    drop(graph);

    if config.max_parallel == 0 {
        run_single(tasks, selection, config, targets, reporter)
    } else {
        run_multi(tasks, selection, config, targets, reporter, config.max_parallel)
    }
}

fn run_single(
    tasks: &mut Tasks,
    selection: &[String],
    config: &RunnerConfig,
    targets: HashMap<std::path::PathBuf, String>,
    reporter: &mut dyn Reporter,
) -> Result<RunResult> {
    let store = open_store(config)?;
    let mut dispatcher = Dispatcher::new(tasks, selection, config.force_run, targets)?;
    let mut run_result = RunResult::default();
    let mut pending_value_savers: HashMap<String, Vec<ValueSaver>> = HashMap::new();
    let mut teardown_stack: Vec<String> = Vec::new();
    // Once set, no task unrelated to an already-recorded failure is run;
    // tasks already downstream of one (caught by `bad_deps` below) still
    // drain so the dispatcher can reach `Done`.
    let mut stop = false;

    loop {
        match dispatcher.next()? {
            DispatchAction::Classify(name) => {
                classify_task(
                    &name,
                    tasks,
                    &store,
                    &mut dispatcher,
                    reporter,
                    &mut run_result,
                    &mut pending_value_savers,
                    &mut stop,
                    config.continue_on_error,
                )?;
            }

            DispatchAction::Execute(name) => {
                reporter.task_execute(&name);
                let getargs = resolve_getargs(tasks, &store, &name)?;
                let outcome = execute_actions(tasks, &name, &getargs);
                finish_execution(
                    &name,
                    outcome,
                    tasks,
                    &store,
                    &mut dispatcher,
                    reporter,
                    &mut run_result,
                    &mut pending_value_savers,
                    &mut teardown_stack,
                    &mut stop,
                    config.continue_on_error,
                )?;
            }

            // A single-worker run has nothing else in flight that could
            // unblock it, so this would indicate a scheduling bug.
            DispatchAction::Wait => return Err(Error::SchedulingStalled),
            DispatchAction::Done => break,
        }
    }

    run_teardown(tasks, &teardown_stack, reporter);
    store.close()?;
    reporter.run_complete(run_result);
    Ok(run_result)
}

struct WorkItem {
    name: String,
    actions: Vec<Arc<dyn Action>>,
    values: serde_json::Map<String, serde_json::Value>,
    result: Option<TaskResultValue>,
    getargs: BTreeMap<String, serde_json::Value>,
}

struct WorkResult {
    name: String,
    outcome: ActionRunOutcome,
    values: serde_json::Map<String, serde_json::Value>,
    result: Option<TaskResultValue>,
}

#[allow(clippy::too_many_lines)]
fn run_multi(
    tasks: &mut Tasks,
    selection: &[String],
    config: &RunnerConfig,
    targets: HashMap<std::path::PathBuf, String>,
    reporter: &mut dyn Reporter,
    workers: usize,
) -> Result<RunResult> {
    let store = open_store(config)?;
    let mut dispatcher = Dispatcher::new(tasks, selection, config.force_run, targets)?;
    let mut run_result = RunResult::default();
    let mut pending_value_savers: HashMap<String, Vec<ValueSaver>> = HashMap::new();
    let mut teardown_stack: Vec<String> = Vec::new();
    let mut stop = false;
    let mut in_flight = 0usize;

    // `None` is the shutdown pill: one is sent per worker once the control
    // loop below has no more work to hand out, so the workers' `recv`
    // loops end and `thread::scope` can join them without depending on
    // the `Sender` being dropped (it outlives the scope).
    let (work_tx, work_rx) = mpsc::channel::<Option<WorkItem>>();
    let work_rx = Arc::new(Mutex::new(work_rx));
    let (result_tx, result_rx) = mpsc::channel::<WorkResult>();

    let loop_result = std::thread::scope(|scope| -> Result<()> {
        for _ in 0..workers {
            let work_rx = Arc::clone(&work_rx);
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                loop {
                    let item = {
                        let rx = work_rx.lock().expect("worker channel poisoned");
                        rx.recv()
                    };
                    let Ok(Some(item)) = item else { break };
                    let mut values = item.values;
                    let mut result = item.result;
                    let outcome = execute_actions_owned(&item.actions, &mut values, &mut result, &item.getargs);
                    if result_tx
                        .send(WorkResult {
                            name: item.name,
                            outcome,
                            values,
                            result,
                        })
                        .is_err()
                    {
                        break;
                    }
                }
            });
        }

        // Run the control loop in its own closure so that any `?` early
        // return still falls through to the shutdown-pill loop below —
        // otherwise an error here would leave the workers blocked on
        // `recv` forever and `thread::scope` would never join them.
        let outcome = (|| -> Result<()> {
        loop {
            let action = dispatcher.next()?;
            match action {
                DispatchAction::Classify(name) => {
                    classify_task(
                        &name,
                        tasks,
                        &store,
                        &mut dispatcher,
                        reporter,
                        &mut run_result,
                        &mut pending_value_savers,
                        &mut stop,
                        config.continue_on_error,
                    )?;
                }
                DispatchAction::Execute(name) => {
                    while in_flight >= workers {
                        let result = result_rx.recv().expect("a worker is in flight");
                        apply_work_result(
                            result,
                            tasks,
                            &store,
                            &mut dispatcher,
                            reporter,
                            &mut run_result,
                            &mut pending_value_savers,
                            &mut teardown_stack,
                            &mut stop,
                            config.continue_on_error,
                        )?;
                        in_flight -= 1;
                    }
                    reporter.task_execute(&name);
                    let getargs = resolve_getargs(tasks, &store, &name)?;
                    let task = tasks.get(&name).expect("dispatcher only yields known tasks");
                    let work = WorkItem {
                        name: name.clone(),
                        actions: task.actions.clone(),
                        values: task.values.clone(),
                        result: task.result.clone(),
                        getargs,
                    };
                    work_tx.send(Some(work)).expect("worker pool outlives the control loop");
                    in_flight += 1;
                }
                DispatchAction::Wait => {
                    if in_flight == 0 {
                        return Err(Error::SchedulingStalled);
                    }
                    let result = result_rx.recv().expect("a worker is in flight");
                    apply_work_result(
                        result,
                        tasks,
                        &store,
                        &mut dispatcher,
                        reporter,
                        &mut run_result,
                        &mut pending_value_savers,
                        &mut teardown_stack,
                        &mut stop,
                        config.continue_on_error,
                    )?;
                    in_flight -= 1;
                }
                DispatchAction::Done => {
                    if in_flight == 0 {
                        break;
                    }
                    let result = result_rx.recv().expect("a worker is in flight");
                    apply_work_result(
                        result,
                        tasks,
                        &store,
                        &mut dispatcher,
                        reporter,
                        &mut run_result,
                        &mut pending_value_savers,
                        &mut teardown_stack,
                        &mut stop,
                        config.continue_on_error,
                    )?;
                    in_flight -= 1;
                }
            }
        }
        Ok(())
        })();

        for _ in 0..workers {
            let _ = work_tx.send(None);
        }
        outcome
    });
    loop_result?;

    run_teardown(tasks, &teardown_stack, reporter);
    store.close()?;
    reporter.run_complete(run_result);
    Ok(run_result)
}

#[allow(clippy::too_many_arguments)]
fn apply_work_result(
    result: WorkResult,
    tasks: &mut Tasks,
    store: &DependencyStore,
    dispatcher: &mut Dispatcher,
    reporter: &mut dyn Reporter,
    run_result: &mut RunResult,
    pending_value_savers: &mut HashMap<String, Vec<ValueSaver>>,
    teardown_stack: &mut Vec<String>,
    stop: &mut bool,
    continue_on_error: bool,
) -> Result<()> {
    if let Some(task) = tasks.get_mut(&result.name) {
        task.values = result.values;
        task.result = result.result;
    }
    finish_execution(
        &result.name,
        result.outcome,
        tasks,
        store,
        dispatcher,
        reporter,
        run_result,
        pending_value_savers,
        teardown_stack,
        stop,
        continue_on_error,
    )
}

#[allow(clippy::too_many_arguments)]
fn classify_task(
    name: &str,
    tasks: &Tasks,
    store: &DependencyStore,
    dispatcher: &mut Dispatcher,
    reporter: &mut dyn Reporter,
    run_result: &mut RunResult,
    pending_value_savers: &mut HashMap<String, Vec<ValueSaver>>,
    stop: &mut bool,
    continue_on_error: bool,
) -> Result<()> {
    reporter.task_start(name);

    let bad_deps = dispatcher.bad_deps(name).to_vec();
    if !bad_deps.is_empty() {
        *run_result = run_result.promote(RunResult::Failure);
        reporter.task_failure(name, &format!("dependency failed: {}", bad_deps.join(", ")));
        dispatcher.finish_without_running(name, RunStatus::Failure)?;
        return Ok(());
    }
    if *stop {
        *run_result = run_result.promote(RunResult::Failure);
        reporter.task_failure(name, "skipped: run stopped after an earlier failure");
        dispatcher.finish_without_running(name, RunStatus::Failure)?;
        return Ok(());
    }

    let task = tasks.get(name).expect("dispatcher only yields known tasks");
    let classification = kiln_engine::classify(task, store, tasks)?;

    let mut unmet: Option<&String> = None;
    for dep in &classification.extra_task_dep {
        let satisfied = task.task_dep.contains(dep) || task.calc_dep.contains(dep) || store.get_result(dep).is_some();
        if !satisfied {
            unmet = Some(dep);
            break;
        }
    }
    if let Some(dep) = unmet {
        let unsatisfied = Error::UnsatisfiedPredicateDependency {
            task: name.to_string(),
            other_task: dep.clone(),
        };
        *run_result = run_result.promote(RunResult::Error);
        reporter.task_error(name, &unsatisfied.to_string());
        dispatcher.finish_without_running(name, RunStatus::Error)?;
        if !continue_on_error {
            *stop = true;
        }
        return Ok(());
    }

    match classification.status {
        Status::UpToDate => {
            reporter.task_up_to_date(name);
            dispatcher.report_status(name, ClassifyResult::UpToDate)?;
        }
        Status::Run { .. } => {
            if let Err(arg) = task.resolve_getargs(|other, key| store.get_value(other, key)) {
                let missing = Error::MissingGetArg {
                    task: name.to_string(),
                    param: arg.param.clone(),
                    other_task: arg.other_task.clone(),
                    key: arg.key.clone(),
                };
                *run_result = run_result.promote(RunResult::Error);
                reporter.task_error(name, &missing.to_string());
                dispatcher.finish_without_running(name, RunStatus::Error)?;
                if !continue_on_error {
                    *stop = true;
                }
                return Ok(());
            }
            pending_value_savers.insert(name.to_string(), classification.value_savers);
            dispatcher.report_status(name, ClassifyResult::Run)?;
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn finish_execution(
    name: &str,
    outcome: ActionRunOutcome,
    tasks: &mut Tasks,
    store: &DependencyStore,
    dispatcher: &mut Dispatcher,
    reporter: &mut dyn Reporter,
    run_result: &mut RunResult,
    pending_value_savers: &mut HashMap<String, Vec<ValueSaver>>,
    teardown_stack: &mut Vec<String>,
    stop: &mut bool,
    continue_on_error: bool,
) -> Result<()> {
    match outcome {
        ActionRunOutcome::Success => {
            let savers = pending_value_savers.remove(name).unwrap_or_default();
            let mut extra_values = serde_json::Map::new();
            for saver in &savers {
                extra_values.extend(saver());
            }
            let task = tasks.get(name).expect("dispatcher only yields known tasks");
            store.save_success(task, extra_values)?;
            teardown_stack.push(name.to_string());
            reporter.task_success(name);
            dispatcher.report_outcome(name, ExecutionOutcome::Success, tasks)?;
        }
        ActionRunOutcome::Failed(reason) => {
            store.forget(name)?;
            *run_result = run_result.promote(RunResult::Failure);
            reporter.task_failure(name, &reason);
            dispatcher.report_outcome(name, ExecutionOutcome::Failure, tasks)?;
            if !continue_on_error {
                *stop = true;
            }
        }
        ActionRunOutcome::Error(message) => {
            *run_result = run_result.promote(RunResult::Error);
            reporter.task_error(name, &message);
            dispatcher.report_outcome(name, ExecutionOutcome::Error, tasks)?;
            if !continue_on_error {
                *stop = true;
            }
        }
    }
    Ok(())
}

fn resolve_getargs(tasks: &Tasks, store: &DependencyStore, name: &str) -> Result<BTreeMap<String, serde_json::Value>> {
    let task = tasks.get(name).expect("dispatcher only yields known tasks");
    task.resolve_getargs(|other, key| store.get_value(other, key))
        .map_err(|arg| Error::MissingGetArg {
            task: name.to_string(),
            param: arg.param.clone(),
            other_task: arg.other_task.clone(),
            key: arg.key.clone(),
        })
}

fn open_store(config: &RunnerConfig) -> Result<DependencyStore> {
    match config.store_backend {
        StoreBackend::Json => Ok(DependencyStore::open_json(&config.dependency_file)?),
        StoreBackend::Sled => Ok(DependencyStore::open_sled(&config.dependency_file)?),
    }
}

fn execute_actions(tasks: &mut Tasks, name: &str, getargs: &BTreeMap<String, serde_json::Value>) -> ActionRunOutcome {
    let actions = tasks.get(name).expect("dispatcher only yields known tasks").actions.clone();
    let task = tasks.get_mut(name).expect("dispatcher only yields known tasks");
    execute_actions_owned(&actions, &mut task.values, &mut task.result, getargs)
}

fn execute_actions_owned(
    actions: &[Arc<dyn Action>],
    values: &mut serde_json::Map<String, serde_json::Value>,
    result: &mut Option<TaskResultValue>,
    getargs: &BTreeMap<String, serde_json::Value>,
) -> ActionRunOutcome {
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();

    for action in actions {
        let mut ctx = ActionContext {
            stdout: &mut stdout,
            stderr: &mut stderr,
            values,
            result,
            getargs,
        };
        match action.run(&mut ctx) {
            ActionOutcome::Success => {}
            ActionOutcome::Failed(reason) => return ActionRunOutcome::Failed(reason),
            ActionOutcome::Error(message) => return ActionRunOutcome::Error(message),
        }
    }
    ActionRunOutcome::Success
}

fn run_teardown(tasks: &mut Tasks, teardown_stack: &[String], reporter: &mut dyn Reporter) {
    let empty_getargs = BTreeMap::new();
    for name in teardown_stack.iter().rev() {
        let actions = match tasks.get(name) {
            Some(task) => task.teardown.clone(),
            None => continue,
        };
        if actions.is_empty() {
            continue;
        }
        let task = tasks.get_mut(name).expect("task present in teardown_stack");
        let mut stdout = std::io::stdout();
        let mut stderr = std::io::stderr();
        for action in &actions {
            let mut ctx = ActionContext {
                stdout: &mut stdout,
                stderr: &mut stderr,
                values: &mut task.values,
                result: &mut task.result,
                getargs: &empty_getargs,
            };
            match action.run(&mut ctx) {
                ActionOutcome::Success => reporter.teardown(name, None),
                ActionOutcome::Failed(reason) => reporter.teardown(name, Some(&reason)),
                ActionOutcome::Error(message) => reporter.teardown(name, Some(&message)),
            }
        }
    }
}

