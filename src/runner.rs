// src/runner.rs

//! The pluggable runner abstraction.
//!
//! The engine never performs any actual work itself: compiling, shelling out,
//! cache restoration, and so on are all implemented behind
//! [`OperationRunner`]. The engine's job is purely to decide *when* a
//! runner's `execute` is invoked and what to do with its result.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::errors::OperationError;
use crate::status::OperationStatus;

/// Boxed future alias used at the crate's trait seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Callback handed to a runner so it can ask for the operation to be run
/// again (watch mode). The optional string is a detail such as the name of a
/// changed file.
pub type RequestRunFn = Arc<dyn Fn(Option<String>) + Send + Sync>;

/// Per-invocation context passed to [`OperationRunner::execute`].
#[derive(Clone)]
pub struct RunnerContext {
    /// Cooperative cancellation token. The engine never interrupts a runner
    /// mid-flight; a long-running runner is expected to poll this token and
    /// wind down on its own when it fires.
    pub abort_signal: CancellationToken,

    /// False when the operation has run at least once under the current
    /// manager (watch mode re-executes the same graph repeatedly).
    pub is_first_run: bool,

    request_run: Option<RequestRunFn>,
}

impl RunnerContext {
    pub(crate) fn new(
        abort_signal: CancellationToken,
        is_first_run: bool,
        request_run: Option<RequestRunFn>,
    ) -> Self {
        Self {
            abort_signal,
            is_first_run,
            request_run,
        }
    }

    /// Signal that this operation's inputs changed and it should run again.
    ///
    /// Safe to call at any time, including after the operation has settled;
    /// the engine decides whether this becomes an immediate in-place retry or
    /// an escalation to the surrounding watch loop.
    pub fn request_run(&self, detail: Option<&str>) {
        if let Some(request_run) = &self.request_run {
            request_run(detail.map(str::to_string));
        }
    }

    /// Whether a rerun request has anywhere to go (i.e. the caller supplied a
    /// watch-mode callback to the execution manager).
    pub fn supports_request_run(&self) -> bool {
        self.request_run.is_some()
    }
}

/// Implements the actual work of a single operation.
///
/// A failed invocation is reported by returning `Err`; the engine records the
/// error on the operation's state and settles it as `Failure`. Runners never
/// cause the engine itself to return an error.
pub trait OperationRunner: Send + Sync {
    /// Name of the runner, for logging.
    fn name(&self) -> &str;

    /// Silent runners are excluded from the manager's tracked-operation
    /// count, so a graph consisting only of silent runners aggregates to
    /// `NoOp` rather than `Success`.
    fn silent(&self) -> bool {
        false
    }

    fn execute(
        &self,
        context: RunnerContext,
    ) -> BoxFuture<'_, Result<OperationStatus, OperationError>>;
}
