// src/engine/mod.rs

//! Execution engine: bounded-concurrency scheduling over the operation graph.
//!
//! - [`work_queue`] is the priority-ordered holding area for ready work.
//! - [`manager`] drives a full execution pass: resetting state, spawning one
//!   task per operation, fanning work through the queue, and aggregating a
//!   final status.

pub mod manager;
pub mod work_queue;

pub(crate) use manager::ExecutionContext;
pub use manager::{ExecutionHooks, ExecutionOptions, NoopHooks, OperationExecutionManager};
pub use work_queue::{QueuedWork, WorkQueue};
