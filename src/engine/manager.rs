// src/engine/manager.rs

//! Top-level orchestration of one execution pass over the operation graph.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::work_queue::WorkQueue;
use crate::errors::{GraphError, OperationError};
use crate::graph::critical_path::calculate_critical_path_lengths;
use crate::graph::group::{GroupOutcome, OperationGroupRecord};
use crate::graph::operation::{Operation, RequestRunCallback};
use crate::runner::BoxFuture;
use crate::status::OperationStatus;

/// Observer seams invoked around operation and group lifecycle events.
///
/// These are where surrounding code plugs in terminal output, log file
/// writers, cache bookkeeping, and similar concerns. All methods default to
/// no-ops.
pub trait ExecutionHooks: Send + Sync {
    /// Invoked after an operation obtains a concurrency slot, immediately
    /// before its runner starts.
    fn before_execute<'a>(&'a self, _operation: &'a Arc<Operation>) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    /// Invoked after an operation's runner has settled (including the
    /// in-place rerun loop) and its stopwatch has stopped.
    fn after_execute<'a>(&'a self, _operation: &'a Arc<Operation>) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    /// Invoked synchronously when an operation settles as `Failure` with a
    /// captured error. Independent branches of the graph keep running.
    fn on_operation_failed(&self, _operation: &Arc<Operation>, _error: &OperationError) {}

    /// Invoked once per run when the first member of a group starts.
    fn on_group_started(&self, _group: &Arc<OperationGroupRecord>) {}

    /// Invoked once per run when the last member of a group completes.
    fn on_group_finished(&self, _group: &Arc<OperationGroupRecord>, _outcome: GroupOutcome) {}
}

/// Hooks implementation that does nothing.
pub struct NoopHooks;

impl ExecutionHooks for NoopHooks {}

/// Options for a single [`OperationExecutionManager::execute`] pass.
#[derive(Clone)]
pub struct ExecutionOptions {
    /// Cooperative cancellation for the whole pass. Abort never interrupts a
    /// runner mid-flight; it prevents new work from starting and settles
    /// not-yet-started operations as `Aborted`.
    pub abort_signal: CancellationToken,

    /// Maximum number of operations concurrently inside their runners.
    pub parallelism: usize,

    /// Lifecycle observers (logging and friends).
    pub hooks: Arc<dyn ExecutionHooks>,

    /// Watch-mode escalation: invoked when an operation requests a rerun
    /// after it has already settled, meaning a whole new pass is needed.
    pub request_run: Option<RequestRunCallback>,
}

impl ExecutionOptions {
    pub fn new(parallelism: usize) -> Self {
        Self {
            abort_signal: CancellationToken::new(),
            parallelism,
            hooks: Arc::new(NoopHooks),
            request_run: None,
        }
    }
}

/// Shared state for one execution pass, threaded through every operation.
pub(crate) struct ExecutionContext {
    pub(crate) abort_signal: CancellationToken,
    pub(crate) request_run: Option<RequestRunCallback>,
    queue: Arc<WorkQueue>,
    hooks: Arc<dyn ExecutionHooks>,
}

impl ExecutionContext {
    /// Obtain a concurrency slot for `work` at the given priority, then run
    /// it to completion.
    pub(crate) async fn queue_work<F>(&self, work: F, priority: u64) -> OperationStatus
    where
        F: Future<Output = OperationStatus> + Send + 'static,
    {
        self.queue.push(work, priority).await
    }

    /// Group-start stitching plus the user's before hook.
    pub(crate) async fn before_execute(&self, operation: &Arc<Operation>) {
        if let Some(group) = operation.group() {
            if group.mark_started() {
                info!(group = %group.name(), "group started");
                self.hooks.on_group_started(group);
            }
        }
        self.hooks.before_execute(operation).await;
    }

    /// The user's after hook, failure reporting, and group-finish stitching.
    pub(crate) async fn after_execute(&self, operation: &Arc<Operation>) {
        self.hooks.after_execute(operation).await;

        let status = operation.status().unwrap_or(OperationStatus::Failure);
        if status == OperationStatus::Failure {
            if let Some(operation_error) = operation.error() {
                error!(operation = %operation.name(), error = %operation_error, "operation failed");
                self.hooks.on_operation_failed(operation, &operation_error);
            }
        }

        if let Some(group) = operation.group() {
            group.mark_operation_complete(operation.name(), status);
            if group.finished() && group.mark_finish_reported() {
                let outcome = group.outcome();
                info!(
                    group = %group.name(),
                    outcome = %outcome,
                    duration_secs = group.duration().as_secs_f64(),
                    "group {outcome}"
                );
                self.hooks.on_group_finished(group, outcome);
            }
        }
    }
}

/// Schedules and runs a set of interdependent operations with bounded
/// concurrency and critical-path priority ordering.
///
/// Construction validates the graph (membership of every dependency, absence
/// of cycles) and eagerly memoizes critical path lengths; `execute` may then
/// be called repeatedly over the same graph (watch mode).
pub struct OperationExecutionManager {
    operations: Vec<Arc<Operation>>,
    groups: Vec<Arc<OperationGroupRecord>>,
    /// Operations whose runner is not silent (a missing runner counts as
    /// tracked). An all-silent or empty graph aggregates to `NoOp`.
    tracked_operations: usize,
}

impl OperationExecutionManager {
    pub fn new(
        operations: impl IntoIterator<Item = Arc<Operation>>,
    ) -> Result<Self, GraphError> {
        // Deduplicate by name, preserving insertion order.
        let mut seen: HashSet<String> = HashSet::new();
        let mut unique: Vec<Arc<Operation>> = Vec::new();
        for operation in operations {
            if seen.insert(operation.name().to_string()) {
                unique.push(operation);
            }
        }

        // A dependency outside the set can never resolve; fail fast.
        for operation in &unique {
            for dependency in operation.dependencies() {
                if !seen.contains(dependency.name()) {
                    return Err(GraphError::MissingDependency {
                        consumer: operation.name().to_string(),
                        dependency: dependency.name().to_string(),
                    });
                }
            }
        }

        calculate_critical_path_lengths(&unique)?;

        let tracked_operations = unique
            .iter()
            .filter(|operation| {
                operation
                    .runner()
                    .is_none_or(|runner| !runner.silent())
            })
            .count();

        let mut group_names: HashSet<String> = HashSet::new();
        let mut groups: Vec<Arc<OperationGroupRecord>> = Vec::new();
        for operation in &unique {
            if let Some(group) = operation.group() {
                if group_names.insert(group.name().to_string()) {
                    groups.push(Arc::clone(group));
                }
            }
        }

        Ok(Self {
            operations: unique,
            groups,
            tracked_operations,
        })
    }

    pub fn operations(&self) -> &[Arc<Operation>] {
        &self.operations
    }

    /// Run every operation to completion and return the aggregate status.
    ///
    /// Graph errors were ruled out at construction; everything that can go
    /// wrong during a pass is reported through statuses and hooks, never as
    /// an `Err`.
    pub async fn execute(&self, options: &ExecutionOptions) -> OperationStatus {
        if options.abort_signal.is_cancelled() {
            return OperationStatus::Aborted;
        }

        for group in &self.groups {
            group.reset();
        }
        for operation in &self.operations {
            operation.reset();
        }

        let max_parallelism = if self.operations.is_empty() {
            0
        } else {
            options.parallelism.min(self.operations.len()).max(1)
        };
        debug!(
            operations = self.operations.len(),
            tracked = self.tracked_operations,
            max_parallelism,
            "starting execution pass"
        );

        // The queue aborts when the external signal fires (child token), and
        // again once all operations have settled, to shut the workers down.
        let queue_signal = options.abort_signal.child_token();
        let queue = Arc::new(WorkQueue::new(queue_signal.clone()));

        let context = Arc::new(ExecutionContext {
            abort_signal: options.abort_signal.clone(),
            request_run: options.request_run.clone(),
            queue: Arc::clone(&queue),
            hooks: Arc::clone(&options.hooks),
        });

        let mut workers = JoinSet::new();
        for _ in 0..max_parallelism {
            let queue = Arc::clone(&queue);
            workers.spawn(async move {
                while let Some(work) = queue.pull().await {
                    // A panicking runner kills this inner task, not the
                    // worker; the pusher sees the dropped result channel.
                    if let Err(join_error) = tokio::spawn(work.run()).await {
                        warn!(error = %join_error, "queued work did not settle cleanly");
                    }
                }
            });
        }

        // Every operation starts concurrently; those with dependencies park
        // on their dependencies' completion channels rather than on a worker.
        let mut executions = JoinSet::new();
        for operation in &self.operations {
            executions.spawn(Arc::clone(operation).execute(Arc::clone(&context)));
        }

        let mut has_failures = false;
        while let Some(result) = executions.join_next().await {
            match result {
                Ok(OperationStatus::Failure) => has_failures = true,
                Ok(_) => {}
                Err(join_error) => {
                    warn!(error = %join_error, "operation task did not settle cleanly");
                    has_failures = true;
                }
            }
        }

        queue_signal.cancel();
        while workers.join_next().await.is_some() {}

        let status = if self.tracked_operations == 0 {
            OperationStatus::NoOp
        } else if options.abort_signal.is_cancelled() {
            OperationStatus::Aborted
        } else if has_failures {
            OperationStatus::Failure
        } else {
            OperationStatus::Success
        };
        debug!(status = %status, "execution pass complete");
        status
    }
}
