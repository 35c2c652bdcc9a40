// src/watch/mod.rs

//! Watch mode: rerunning the graph as inputs change.
//!
//! [`watch_loop`] owns the execute/park/rerun cycle; [`protocol`] defines the
//! message types for running the loop under an external controlling host.

pub mod protocol;
pub mod watch_loop;

pub use protocol::{CommandMessage, EventMessage, IpcHost};
pub use watch_loop::{WatchExecutor, WatchLoop, WatchLoopState};
