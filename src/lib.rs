// src/lib.rs

//! Execution engine for graphs of build operations.
//!
//! The crate is organized around three layers:
//!
//! - [`graph`]: the data model. [`Operation`]s form a dependency DAG, carry an
//!   optional [`OperationRunner`], and may belong to an
//!   [`OperationGroupRecord`] for aggregate timing.
//! - [`engine`]: one-shot execution. The [`OperationExecutionManager`] runs a
//!   graph to completion with bounded concurrency, scheduling ready work by
//!   critical path length so the longest chains start first.
//! - [`watch`]: repeated execution. The [`WatchLoop`] reruns the engine as
//!   inputs change, coalescing rerun requests and optionally deferring to an
//!   external host over the [`watch::protocol`] message types.
//!
//! Failures in one branch of the graph never stop independent branches;
//! downstream operations of a failure settle as [`OperationStatus::Blocked`]
//! and everything else keeps running. Cancellation is cooperative throughout:
//! a fired [`CancellationToken`] prevents new work from starting but never
//! interrupts a runner mid-flight.
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod engine;
pub mod errors;
pub mod graph;
pub mod logging;
pub mod runner;
pub mod status;
pub mod stopwatch;
pub mod watch;

pub use engine::{ExecutionHooks, ExecutionOptions, NoopHooks, OperationExecutionManager};
pub use errors::{EngineError, GraphError, OperationError, Result};
pub use graph::{
    GroupOutcome, Operation, OperationGroupRecord, OperationOptions, OperationState,
    RequestRunCallback,
};
pub use runner::{BoxFuture, OperationRunner, RunnerContext};
pub use status::OperationStatus;
pub use stopwatch::Stopwatch;
pub use watch::{CommandMessage, EventMessage, IpcHost, WatchExecutor, WatchLoop, WatchLoopState};
