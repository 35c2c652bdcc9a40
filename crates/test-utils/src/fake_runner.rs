use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use opgraph::{BoxFuture, OperationError, OperationRunner, OperationStatus, RunnerContext};

type ExecuteFn = dyn Fn(RunnerContext) -> BoxFuture<'static, Result<OperationStatus, OperationError>>
    + Send
    + Sync;

/// A scriptable runner for exercising the engine without real work.
///
/// The default constructors cover the common cases (fixed status, fixed
/// error); `from_fn` accepts an arbitrary async closure for tests that need
/// to inspect the [`RunnerContext`] or coordinate with the test body.
pub struct TestRunner {
    name: String,
    silent: bool,
    execute: Arc<ExecuteFn>,
}

impl TestRunner {
    /// A runner that always settles `Success`.
    pub fn succeeding(name: &str) -> Arc<Self> {
        Self::with_result(name, Ok(OperationStatus::Success))
    }

    /// A runner that always returns the given error.
    pub fn failing(name: &str, message: &str) -> Arc<Self> {
        Self::with_result(name, Err(OperationError::new("test", message)))
    }

    /// A runner that always resolves to the given result.
    pub fn with_result(
        name: &str,
        result: Result<OperationStatus, OperationError>,
    ) -> Arc<Self> {
        Self::from_fn(name, move |_context| {
            let result = result.clone();
            Box::pin(async move { result })
        })
    }

    pub fn from_fn<F>(name: &str, execute: F) -> Arc<Self>
    where
        F: Fn(RunnerContext) -> BoxFuture<'static, Result<OperationStatus, OperationError>>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self {
            name: name.to_string(),
            silent: false,
            execute: Arc::new(execute),
        })
    }

    /// Same as [`TestRunner::from_fn`] but excluded from the manager's
    /// tracked-operation count.
    pub fn silent_from_fn<F>(name: &str, execute: F) -> Arc<Self>
    where
        F: Fn(RunnerContext) -> BoxFuture<'static, Result<OperationStatus, OperationError>>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self {
            name: name.to_string(),
            silent: true,
            execute: Arc::new(execute),
        })
    }
}

impl OperationRunner for TestRunner {
    fn name(&self) -> &str {
        &self.name
    }

    fn silent(&self) -> bool {
        self.silent
    }

    fn execute(
        &self,
        context: RunnerContext,
    ) -> BoxFuture<'_, Result<OperationStatus, OperationError>> {
        (self.execute)(context)
    }
}

/// Records runner start/finish order and concurrency across a test run.
#[derive(Default)]
pub struct ExecutionLog {
    started: Mutex<Vec<String>>,
    finished: Mutex<Vec<String>>,
    concurrent: AtomicUsize,
    max_concurrent: AtomicUsize,
}

impl ExecutionLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_start(&self, name: &str) {
        self.started.lock().unwrap().push(name.to_string());
        let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);
    }

    pub fn record_finish(&self, name: &str) {
        self.concurrent.fetch_sub(1, Ordering::SeqCst);
        self.finished.lock().unwrap().push(name.to_string());
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn finished(&self) -> Vec<String> {
        self.finished.lock().unwrap().clone()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }
}
