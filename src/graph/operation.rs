// src/graph/operation.rs

//! The `Operation` graph node and its per-run execution state machine.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::engine::ExecutionContext;
use crate::errors::OperationError;
use crate::graph::group::OperationGroupRecord;
use crate::runner::{OperationRunner, RequestRunFn, RunnerContext};
use crate::status::OperationStatus;
use crate::stopwatch::Stopwatch;

/// Callback used to escalate a rerun request to the surrounding watch loop
/// once an operation has already settled. Arguments are the requesting
/// operation's name and an optional detail string.
pub type RequestRunCallback = Arc<dyn Fn(&str, Option<String>) + Send + Sync>;

/// Snapshot of one invocation of an operation.
#[derive(Debug, Clone)]
pub struct OperationState {
    pub status: OperationStatus,
    /// True once the runner has been started at least once under the current
    /// manager, across all runs (used for `is_first_run`).
    pub has_been_run: bool,
    pub error: Option<OperationError>,
    pub stopwatch: Stopwatch,
}

/// Construction options for [`Operation`].
pub struct OperationOptions {
    /// The name of this operation, for logging and deduplication.
    pub name: String,
    /// Group this operation belongs to, for aggregate timing and logging.
    pub group: Option<Arc<OperationGroupRecord>>,
    /// Implements the actual work. Absent means a purely structural node that
    /// settles as `NoOp`.
    pub runner: Option<Arc<dyn OperationRunner>>,
    /// Contribution of this operation to critical path lengths. Larger than 1
    /// biases the scheduler towards starting this operation earlier.
    pub weight: u64,
}

impl OperationOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: None,
            runner: None,
            weight: 1,
        }
    }
}

/// A node in the dependency graph of schedulable work.
///
/// Operations are shared via `Arc` and reusable across repeated manager runs
/// (watch mode re-executes the same graph); all per-run state is re-seeded by
/// [`Operation::reset`], which the manager calls once per execution pass.
pub struct Operation {
    name: String,
    group: Option<Arc<OperationGroupRecord>>,
    runner: Option<Arc<dyn OperationRunner>>,
    weight: u64,

    /// Longest weighted chain of consumer edges from this node to any node
    /// with no consumers. Memoized once; used as scheduling priority.
    critical_path_length: OnceLock<u64>,

    /// Operations that must complete before this one runs, keyed by name.
    dependencies: Mutex<BTreeMap<String, Arc<Operation>>>,
    /// Inverse edges, kept symmetric with `dependencies`. Weak to avoid
    /// reference cycles between the two adjacency sides.
    consumers: Mutex<BTreeMap<String, Weak<Operation>>>,

    state: Mutex<Option<OperationState>>,
    last_state: Mutex<Option<OperationState>>,

    /// Set when a rerun is requested while this operation is still unsettled.
    /// Lives on the operation rather than in a closure so that a runner
    /// holding a stale copy of the callback still lands on current state.
    run_pending: AtomicBool,

    /// Per-run completion broadcast; stands in for a cached in-flight future.
    /// Consumers await `Some(status)` on a receiver subscribed after reset.
    finished: Mutex<watch::Sender<Option<OperationStatus>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Operation {
    /// Create a bare operation with the given name and default weight.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_options(OperationOptions::new(name))
    }

    pub fn with_options(options: OperationOptions) -> Arc<Self> {
        let (finished, _) = watch::channel(None);
        let operation = Arc::new(Self {
            name: options.name,
            group: options.group,
            runner: options.runner,
            weight: options.weight,
            critical_path_length: OnceLock::new(),
            dependencies: Mutex::new(BTreeMap::new()),
            consumers: Mutex::new(BTreeMap::new()),
            state: Mutex::new(None),
            last_state: Mutex::new(None),
            run_pending: AtomicBool::new(true),
            finished: Mutex::new(finished),
        });

        if let Some(group) = &operation.group {
            group.add_operation(&operation.name);
        }

        operation
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> u64 {
        self.weight
    }

    pub fn group(&self) -> Option<&Arc<OperationGroupRecord>> {
        self.group.as_ref()
    }

    pub fn runner(&self) -> Option<&Arc<dyn OperationRunner>> {
        self.runner.as_ref()
    }

    /// Memoized critical path length, if it has been computed.
    pub fn critical_path_length(&self) -> Option<u64> {
        self.critical_path_length.get().copied()
    }

    /// Memoize the critical path length. A second call is a no-op: the value
    /// is stable for the lifetime of a manager once computed.
    pub(crate) fn memoize_critical_path_length(&self, length: u64) {
        let _ = self.critical_path_length.set(length);
    }

    /// Declare that `dependency` must complete before this operation runs.
    /// Both adjacency sides are updated.
    pub fn add_dependency(self: &Arc<Self>, dependency: &Arc<Operation>) {
        lock(&self.dependencies).insert(dependency.name.clone(), Arc::clone(dependency));
        lock(&dependency.consumers).insert(self.name.clone(), Arc::downgrade(self));
    }

    /// Remove a dependency edge, updating both adjacency sides.
    pub fn delete_dependency(&self, dependency: &Arc<Operation>) {
        lock(&self.dependencies).remove(dependency.name.as_str());
        lock(&dependency.consumers).remove(self.name.as_str());
    }

    pub fn dependencies(&self) -> Vec<Arc<Operation>> {
        lock(&self.dependencies).values().cloned().collect()
    }

    pub fn dependency_count(&self) -> usize {
        lock(&self.dependencies).len()
    }

    /// Live consumer nodes (dropped consumers are skipped).
    pub fn consumers(&self) -> Vec<Arc<Operation>> {
        lock(&self.consumers)
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Snapshot of the current invocation's state, or `None` before the
    /// first `reset()`.
    pub fn state(&self) -> Option<OperationState> {
        lock(&self.state).clone()
    }

    /// Snapshot of the previous invocation's state, kept for watch-mode
    /// diffing.
    pub fn last_state(&self) -> Option<OperationState> {
        lock(&self.last_state).clone()
    }

    pub fn status(&self) -> Option<OperationStatus> {
        lock(&self.state).as_ref().map(|state| state.status)
    }

    pub fn error(&self) -> Option<OperationError> {
        lock(&self.state).as_ref().and_then(|state| state.error.clone())
    }

    /// Re-seed per-run state ahead of an execution pass. Called once per
    /// manager run; the previous state is preserved in `last_state`.
    pub fn reset(&self) {
        let previous = lock(&self.state).take();
        let has_been_run = previous.as_ref().is_some_and(|state| state.has_been_run);
        *lock(&self.last_state) = previous;

        let status = if self.dependency_count() > 0 {
            OperationStatus::Waiting
        } else {
            OperationStatus::Ready
        };
        *lock(&self.state) = Some(OperationState {
            status,
            has_been_run,
            error: None,
            stopwatch: Stopwatch::new(),
        });

        self.run_pending.store(true, Ordering::SeqCst);

        let (finished, _) = watch::channel(None);
        *lock(&self.finished) = finished;
    }

    fn set_status(&self, status: OperationStatus) {
        if let Some(state) = lock(&self.state).as_mut() {
            state.status = status;
        }
    }

    /// Subscribe to this operation's completion for the current run.
    fn subscribe(&self) -> watch::Receiver<Option<OperationStatus>> {
        lock(&self.finished).subscribe()
    }

    /// Record the final status for this run and wake all waiting consumers.
    fn settle(&self, status: OperationStatus) -> OperationStatus {
        self.set_status(status);
        lock(&self.finished).send_replace(Some(status));
        status
    }

    /// Execute this operation within the given run context.
    ///
    /// The manager spawns this exactly once per operation per run, so there
    /// is never a duplicate execution; consumers observe the result through
    /// the per-run completion channel rather than re-entering this function.
    pub(crate) async fn execute(self: Arc<Self>, context: Arc<ExecutionContext>) -> OperationStatus {
        // Await every dependency, without short-circuiting on failures.
        let mut gate_closed = false;
        for dependency in self.dependencies() {
            let mut receiver = dependency.subscribe();
            let result = receiver.wait_for(|status| status.is_some()).await;
            let status = match result {
                Ok(status) => status.unwrap_or(OperationStatus::Failure),
                // The dependency's channel went away without settling; treat
                // it like a failed dependency.
                Err(_) => OperationStatus::Failure,
            };
            if matches!(status, OperationStatus::Blocked | OperationStatus::Failure) {
                gate_closed = true;
            }
        }

        if context.abort_signal.is_cancelled() {
            return self.settle(OperationStatus::Aborted);
        }

        if gate_closed {
            debug!(operation = %self.name, "dependency failed or was blocked; not running");
            return self.settle(OperationStatus::Blocked);
        }

        self.set_status(OperationStatus::Ready);

        let is_first_run = !lock(&self.state)
            .as_ref()
            .is_some_and(|state| state.has_been_run);
        let priority = self.critical_path_length().unwrap_or(0);

        let operation = Arc::clone(&self);
        let work_context = Arc::clone(&context);
        let status = context
            .queue_work(
                async move { operation.run_in_slot(work_context, is_first_run).await },
                priority,
            )
            .await;

        self.settle(status)
    }

    /// Body executed once a concurrency slot has been obtained.
    async fn run_in_slot(
        self: Arc<Self>,
        context: Arc<ExecutionContext>,
        is_first_run: bool,
    ) -> OperationStatus {
        // Re-check: the abort may have fired while queued.
        if context.abort_signal.is_cancelled() {
            self.set_status(OperationStatus::Aborted);
            return OperationStatus::Aborted;
        }

        context.before_execute(&self).await;

        if let Some(state) = lock(&self.state).as_mut() {
            state.stopwatch.start();
            state.status = OperationStatus::Executing;
            state.has_been_run = true;
        }

        let runner_context = RunnerContext::new(
            context.abort_signal.clone(),
            is_first_run,
            self.request_run_fn(&context),
        );

        let mut status;
        loop {
            self.run_pending.store(false, Ordering::SeqCst);

            status = match &self.runner {
                Some(runner) => match runner.execute(runner_context.clone()).await {
                    Ok(status) => status,
                    Err(error) => {
                        if let Some(state) = lock(&self.state).as_mut() {
                            state.error = Some(error);
                        }
                        OperationStatus::Failure
                    }
                },
                None => OperationStatus::NoOp,
            };

            // The runner is async: inputs may have changed again while it was
            // executing. This operation is still active, so it can re-execute
            // in place rather than forcing a whole new execution pass.
            if self.run_pending.load(Ordering::SeqCst) {
                if context.abort_signal.is_cancelled() {
                    status = OperationStatus::Aborted;
                    break;
                }
                debug!(operation = %self.name, "immediate rerun requested; executing again");
                continue;
            }
            break;
        }

        if let Some(state) = lock(&self.state).as_mut() {
            state.status = status;
            state.stopwatch.stop();
        }

        context.after_execute(&self).await;

        status
    }

    /// Build the `request_run` callback for the runner context, if the caller
    /// supplied a watch-mode escalation callback.
    fn request_run_fn(self: &Arc<Self>, context: &Arc<ExecutionContext>) -> Option<RequestRunFn> {
        let escalate = context.request_run.as_ref()?;
        let escalate = Arc::clone(escalate);
        let operation = Arc::downgrade(self);

        Some(Arc::new(move |detail: Option<String>| {
            let Some(operation) = operation.upgrade() else {
                return;
            };
            operation.handle_request_run(&escalate, detail);
        }))
    }

    fn handle_request_run(&self, escalate: &RequestRunCallback, detail: Option<String>) {
        match self.status() {
            // Not yet settled: absorb into the in-place retry loop.
            Some(
                OperationStatus::Waiting | OperationStatus::Ready | OperationStatus::Executing,
            ) => {
                self.run_pending.store(true, Ordering::SeqCst);
            }
            // Already settled: a rerun needs a whole new execution pass.
            Some(_) => escalate(&self.name, detail),
            None => {
                warn!(
                    operation = %self.name,
                    "rerun requested before the operation was reset; ignoring"
                );
            }
        }
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .field("critical_path_length", &self.critical_path_length.get())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
