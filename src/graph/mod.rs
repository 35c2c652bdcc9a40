// src/graph/mod.rs

//! The operation graph data model.
//!
//! - [`operation`] holds the graph node type and its per-run state machine.
//! - [`group`] aggregates timing and outcomes for named operation buckets.
//! - [`critical_path`] computes the scheduling priority of each node.

pub mod critical_path;
pub mod group;
pub mod operation;

pub use critical_path::{calculate_critical_path_lengths, calculate_shortest_path};
pub use group::{GroupOutcome, OperationGroupRecord};
pub use operation::{Operation, OperationOptions, OperationState, RequestRunCallback};
