// src/errors.rs

//! Crate-wide error types and the `Result` alias.

use thiserror::Error;

/// Errors detected while validating the operation graph. These are the only
/// failures surfaced as `Err` from the engine's public entry points; runner
/// failures, blockage, and aborts are all reported through
/// [`OperationStatus`](crate::status::OperationStatus) values instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// An operation depends on another operation that is not part of the set
    /// handed to the execution manager. Such a dependency can never resolve.
    #[error(
        "operation {consumer:?} declares a dependency on operation {dependency:?} \
         that is not in the set of operations to execute"
    )]
    MissingDependency { consumer: String, dependency: String },

    /// The dependency graph contains a cycle. `path` is the minimal cyclic
    /// path, starting and ending at the same operation.
    #[error("a cyclic dependency was encountered: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },
}

/// Error captured from a failed runner invocation and attached to the
/// operation's state. `kind` is a coarse taxonomy label (e.g. "spawn",
/// "exit-code", "internal"); `message` is the human-readable detail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct OperationError {
    pub kind: String,
    pub message: String,
}

impl OperationError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Top-level engine error, used at the watch-loop seam.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Sentinel for failures whose diagnostics were already shown to the
    /// user. The watch loop converts this into an ordinary `Failure` status
    /// instead of re-raising it.
    #[error("an error occurred that was already reported")]
    AlreadyReported,

    /// The IPC host hung up while the loop still had events to deliver.
    #[error("the IPC host channel closed unexpectedly")]
    HostClosed,

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
