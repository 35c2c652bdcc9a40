// tests/groups.rs

use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use opgraph::{
    ExecutionHooks, ExecutionOptions, GroupOutcome, OperationError, OperationExecutionManager,
    OperationGroupRecord, OperationStatus,
};
use opgraph::graph::Operation;
use opgraph_test_utils::builders::OperationBuilder;
use opgraph_test_utils::fake_runner::TestRunner;
use opgraph_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[derive(Default)]
struct RecordingHooks {
    group_starts: AtomicUsize,
    group_finishes: Mutex<Vec<(String, GroupOutcome)>>,
    failures: Mutex<Vec<(String, OperationError)>>,
}

impl ExecutionHooks for RecordingHooks {
    fn on_operation_failed(&self, operation: &Arc<Operation>, error: &OperationError) {
        self.failures
            .lock()
            .unwrap()
            .push((operation.name().to_string(), error.clone()));
    }

    fn on_group_started(&self, _group: &Arc<OperationGroupRecord>) {
        self.group_starts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_group_finished(&self, group: &Arc<OperationGroupRecord>, outcome: GroupOutcome) {
        self.group_finishes
            .lock()
            .unwrap()
            .push((group.name().to_string(), outcome));
    }
}

fn options_with_hooks(parallelism: usize) -> (ExecutionOptions, Arc<RecordingHooks>) {
    let hooks = Arc::new(RecordingHooks::default());
    let mut options = ExecutionOptions::new(parallelism);
    options.hooks = Arc::clone(&hooks) as Arc<dyn ExecutionHooks>;
    (options, hooks)
}

#[tokio::test]
async fn group_lifecycle_hooks_fire_once() -> TestResult {
    init_tracing();

    let group = Arc::new(OperationGroupRecord::new("build"));
    let a = OperationBuilder::new("a")
        .runner(TestRunner::succeeding("a"))
        .group(&group)
        .build();
    let b = OperationBuilder::new("b")
        .runner(TestRunner::succeeding("b"))
        .group(&group)
        .depends_on(&a)
        .build();
    let loner = OperationBuilder::new("loner")
        .runner(TestRunner::succeeding("loner"))
        .build();

    let manager = OperationExecutionManager::new([a, b, loner])?;
    let (options, hooks) = options_with_hooks(2);

    let status = with_timeout(manager.execute(&options)).await;
    assert_eq!(status, OperationStatus::Success);

    assert_eq!(hooks.group_starts.load(Ordering::SeqCst), 1);
    assert_eq!(
        hooks.group_finishes.lock().unwrap().clone(),
        vec![("build".to_string(), GroupOutcome::Finished)]
    );
    assert!(group.finished());
    assert!(!group.has_failures());

    // The group stopwatch ran from the first start to the last completion
    // and is frozen now that the group is finished.
    let duration = group.duration();
    assert!(duration > std::time::Duration::ZERO);
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    assert_eq!(group.duration(), duration);
    Ok(())
}

#[tokio::test]
async fn failed_member_marks_the_group() -> TestResult {
    init_tracing();

    let group = Arc::new(OperationGroupRecord::new("compile"));
    let ok = OperationBuilder::new("ok")
        .runner(TestRunner::succeeding("ok"))
        .group(&group)
        .build();
    let bad = OperationBuilder::new("bad")
        .runner(TestRunner::failing("bad", "type errors"))
        .group(&group)
        .build();

    let manager = OperationExecutionManager::new([ok, bad])?;
    let (options, hooks) = options_with_hooks(2);

    let status = with_timeout(manager.execute(&options)).await;
    assert_eq!(status, OperationStatus::Failure);

    assert_eq!(group.outcome(), GroupOutcome::EncounteredError);
    assert_eq!(
        hooks.group_finishes.lock().unwrap().clone(),
        vec![("compile".to_string(), GroupOutcome::EncounteredError)]
    );

    let failures = hooks.failures.lock().unwrap().clone();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "bad");
    assert_eq!(failures[0].1.message, "type errors");
    Ok(())
}

#[tokio::test]
async fn group_state_resets_between_passes() -> TestResult {
    init_tracing();

    let group = Arc::new(OperationGroupRecord::new("lint"));
    let op = OperationBuilder::new("op")
        .runner(TestRunner::succeeding("op"))
        .group(&group)
        .build();

    let manager = OperationExecutionManager::new([op])?;
    let (options, hooks) = options_with_hooks(1);

    with_timeout(manager.execute(&options)).await;
    with_timeout(manager.execute(&options)).await;

    // One start and one finish per pass.
    assert_eq!(hooks.group_starts.load(Ordering::SeqCst), 2);
    assert_eq!(hooks.group_finishes.lock().unwrap().len(), 2);
    assert!(group.finished());
    Ok(())
}

#[test]
fn group_outcome_labels() {
    init_tracing();

    let group = OperationGroupRecord::new("mixed");
    group.add_operation("x");
    group.add_operation("y");
    group.reset();

    assert_eq!(group.outcome(), GroupOutcome::Finished);
    assert_eq!(format!("{}", GroupOutcome::Cancelled), "cancelled");
    assert_eq!(
        format!("{}", GroupOutcome::EncounteredError),
        "encountered an error"
    );
}
