// src/watch/watch_loop.rs

//! Watch-mode driver: repeatedly executes until the system is stable, folding
//! rerun requests that arrive mid-pass into a fresh pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{EngineError, Result};
use crate::runner::BoxFuture;
use crate::status::OperationStatus;
use crate::watch::protocol::{CommandMessage, EventMessage, IpcHost};

/// What the watch loop runs on every iteration, typically a
/// [`OperationExecutionManager::execute`] pass plus any surrounding
/// bookkeeping.
///
/// [`OperationExecutionManager::execute`]: crate::engine::OperationExecutionManager::execute
pub trait WatchExecutor: Send + Sync {
    /// Run one pass. `state.abort_signal` fires when a rerun request arrives
    /// mid-pass; the pass should wind down cooperatively so the loop can start
    /// over with fresh inputs.
    fn execute(&self, state: WatchLoopState) -> BoxFuture<'_, Result<OperationStatus>>;

    /// Invoked immediately before each pass.
    fn on_before_execute(&self) {}

    /// Invoked when a rerun is requested while no request was already pending.
    fn on_request_run(&self, _requestor: &str, _detail: Option<&str>) {}

    /// Invoked when a rerun request interrupts a pass that is still running.
    fn on_abort(&self) {}
}

/// Per-iteration context handed to the executor.
pub struct WatchLoopState {
    /// Fires if this iteration should wind down in favor of a new one.
    pub abort_signal: CancellationToken,
    watch_loop: Arc<WatchLoop>,
}

impl WatchLoopState {
    /// Request another pass. Callable from anywhere that observed an input
    /// change, including from within the executing pass itself.
    pub fn request_run(&self, requestor: &str, detail: Option<&str>) {
        self.watch_loop.request_run(requestor, detail);
    }
}

#[derive(Debug, Clone)]
struct RunRequest {
    requestor: String,
    detail: Option<String>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Coordinates repeated execution passes against changing inputs.
///
/// One loop owns one executor. A run is always requested at construction, so
/// the first call to any of the `run_*` entry points executes at least once.
pub struct WatchLoop {
    executor: Arc<dyn WatchExecutor>,
    /// Cancellation scope of the in-flight iteration; renewed lazily once
    /// cancelled.
    iteration_token: Mutex<CancellationToken>,
    run_requested: AtomicBool,
    executing: AtomicBool,
    run_wanted: Notify,
    last_request: Mutex<Option<RunRequest>>,
}

impl WatchLoop {
    pub fn new(executor: Arc<dyn WatchExecutor>) -> Arc<Self> {
        Arc::new(Self {
            executor,
            iteration_token: Mutex::new(CancellationToken::new()),
            run_requested: AtomicBool::new(true),
            executing: AtomicBool::new(false),
            run_wanted: Notify::new(),
            last_request: Mutex::new(None),
        })
    }

    /// Request another execution pass.
    ///
    /// The first request of a cycle records the requestor and notifies the
    /// executor; if a pass is currently executing, its iteration token is
    /// cancelled so the loop can start over. Further requests before the next
    /// pass begins coalesce into the pending one.
    pub fn request_run(&self, requestor: &str, detail: Option<&str>) {
        let already_requested = self.run_requested.swap(true, Ordering::SeqCst);
        if !already_requested {
            *lock(&self.last_request) = Some(RunRequest {
                requestor: requestor.to_string(),
                detail: detail.map(str::to_string),
            });
            self.executor.on_request_run(requestor, detail);
            if self.executing.load(Ordering::SeqCst) {
                debug!(requestor, "rerun requested mid-pass; cancelling current iteration");
                self.executor.on_abort();
                lock(&self.iteration_token).cancel();
            }
        }
        self.run_wanted.notify_waiters();
    }

    /// Execute passes until no rerun is pending, returning the final status.
    ///
    /// Returns `Aborted` as soon as the outer signal is observed cancelled,
    /// whether a rerun was pending or not.
    pub async fn run_until_stable(
        self: &Arc<Self>,
        abort_signal: &CancellationToken,
    ) -> Result<OperationStatus> {
        let mut status = OperationStatus::NoOp;
        while self.run_requested.load(Ordering::SeqCst) {
            if abort_signal.is_cancelled() {
                return Ok(OperationStatus::Aborted);
            }
            status = self.run_iteration().await?;
        }
        if abort_signal.is_cancelled() {
            return Ok(OperationStatus::Aborted);
        }
        Ok(status)
    }

    async fn run_iteration(self: &Arc<Self>) -> Result<OperationStatus> {
        self.run_requested.store(false, Ordering::SeqCst);

        let iteration = {
            let mut token = lock(&self.iteration_token);
            if token.is_cancelled() {
                *token = CancellationToken::new();
            }
            token.clone()
        };

        self.executor.on_before_execute();
        self.executing.store(true, Ordering::SeqCst);
        let state = WatchLoopState {
            abort_signal: iteration,
            watch_loop: Arc::clone(self),
        };
        let result = self.executor.execute(state).await;
        self.executing.store(false, Ordering::SeqCst);

        match result {
            Ok(status) => Ok(status),
            // The failure was already surfaced through hooks and logging;
            // record it as a plain failed pass and keep watching.
            Err(EngineError::AlreadyReported) => Ok(OperationStatus::Failure),
            Err(error) => Err(error),
        }
    }

    /// Run until the outer signal is cancelled, parking between passes.
    ///
    /// `on_waiting` is invoked after each stable point, before the loop parks
    /// for the next rerun request.
    pub async fn run_until_aborted(
        self: &Arc<Self>,
        abort_signal: &CancellationToken,
        on_waiting: impl Fn(),
    ) -> Result<()> {
        loop {
            self.run_until_stable(abort_signal).await?;
            on_waiting();
            if abort_signal.is_cancelled() {
                return Ok(());
            }

            loop {
                // Register for wakeups before checking the flag so a request
                // racing with the check is not lost.
                let wake = self.run_wanted.notified();
                tokio::pin!(wake);
                wake.as_mut().enable();

                if self.run_requested.load(Ordering::SeqCst) {
                    break;
                }

                tokio::select! {
                    _ = &mut wake => {}
                    _ = abort_signal.cancelled() => return Ok(()),
                }
            }
        }
    }

    /// Run a host-driven session over the given IPC channel.
    ///
    /// The session opens by reporting `Ready`; thereafter the host's `run`,
    /// `cancel`, `sync`, and `exit` commands drive the loop, and every settled
    /// pass is reported back with an `after-execute` event. Rerun requests
    /// that arrive while idle are forwarded as `requestRun` events and the
    /// loop waits for the host to answer with `run`.
    pub async fn run_ipc(self: &Arc<Self>, host: IpcHost) -> Result<()> {
        let IpcHost {
            mut commands,
            events,
        } = host;

        send_event(
            &events,
            EventMessage::Sync {
                status: OperationStatus::Ready,
            },
        )
        .await?;

        // The initial implied run request is not auto-executed in a session;
        // the host decides when the first pass starts.
        let mut last_status = OperationStatus::Ready;
        let mut request_sent = false;
        let mut active: Option<JoinHandle<Result<OperationStatus>>> = None;

        loop {
            let wake = self.run_wanted.notified();
            tokio::pin!(wake);
            wake.as_mut().enable();

            if active.is_none() && !request_sent && self.run_requested.load(Ordering::SeqCst) {
                let pending = lock(&self.last_request).clone();
                if let Some(request) = pending {
                    send_event(
                        &events,
                        EventMessage::RequestRun {
                            requestor: request.requestor,
                            detail: request.detail,
                        },
                    )
                    .await?;
                    request_sent = true;
                }
            }

            tokio::select! {
                command = commands.recv() => match command {
                    Some(CommandMessage::Run) => {
                        request_sent = false;
                        if active.is_some() {
                            // Fold into the in-flight pass.
                            self.request_run("host", None);
                        } else {
                            self.run_requested.store(true, Ordering::SeqCst);
                            let watch_loop = Arc::clone(self);
                            let pass_signal = CancellationToken::new();
                            active = Some(tokio::spawn(async move {
                                watch_loop.run_until_stable(&pass_signal).await
                            }));
                        }
                    }
                    Some(CommandMessage::Cancel) => {
                        lock(&self.iteration_token).cancel();
                    }
                    Some(CommandMessage::Sync) => {
                        send_event(&events, EventMessage::Sync { status: last_status }).await?;
                    }
                    Some(CommandMessage::Exit) | None => break,
                },
                result = join_active(&mut active) => {
                    active = None;
                    let status = match result {
                        Ok(Ok(status)) => status,
                        Ok(Err(EngineError::AlreadyReported)) => OperationStatus::Failure,
                        Ok(Err(error)) => return Err(error),
                        Err(join_error) => {
                            warn!(error = %join_error, "watch pass task did not settle cleanly");
                            OperationStatus::Failure
                        }
                    };
                    last_status = status;
                    send_event(&events, EventMessage::AfterExecute { status }).await?;
                },
                _ = &mut wake => {}
            }
        }

        Ok(())
    }
}

async fn send_event(
    events: &tokio::sync::mpsc::Sender<EventMessage>,
    event: EventMessage,
) -> Result<()> {
    events
        .send(event)
        .await
        .map_err(|_| EngineError::HostClosed)
}

async fn join_active(
    active: &mut Option<JoinHandle<Result<OperationStatus>>>,
) -> std::result::Result<Result<OperationStatus>, tokio::task::JoinError> {
    match active.as_mut() {
        Some(handle) => handle.await,
        // No active pass; park until another select branch fires.
        None => std::future::pending().await,
    }
}
