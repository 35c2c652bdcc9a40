// src/status.rs

//! Operation status values.
//!
//! The string literals produced by `Display` / serde are a stable wire format
//! consumed by external hosts over the IPC protocol, so they must round-trip
//! exactly (including the space in `"NO OP"`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status of a single operation, or the aggregate status of an execution pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationStatus {
    /// The operation is ready to run as soon as a concurrency slot is free.
    #[serde(rename = "READY")]
    Ready,
    /// The operation is waiting on one or more dependencies to finish.
    #[serde(rename = "WAITING")]
    Waiting,
    /// The operation's runner is currently executing.
    #[serde(rename = "EXECUTING")]
    Executing,
    /// The operation completed successfully.
    #[serde(rename = "SUCCESS")]
    Success,
    /// The operation's runner failed.
    #[serde(rename = "FAILURE")]
    Failure,
    /// The operation was aborted before (or instead of) running.
    #[serde(rename = "ABORTED")]
    Aborted,
    /// A dependency failed or was blocked, so this operation never ran.
    #[serde(rename = "BLOCKED")]
    Blocked,
    /// The operation had nothing to do.
    #[serde(rename = "NO OP")]
    NoOp,
}

impl OperationStatus {
    /// Returns the stable wire literal for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            OperationStatus::Ready => "READY",
            OperationStatus::Waiting => "WAITING",
            OperationStatus::Executing => "EXECUTING",
            OperationStatus::Success => "SUCCESS",
            OperationStatus::Failure => "FAILURE",
            OperationStatus::Aborted => "ABORTED",
            OperationStatus::Blocked => "BLOCKED",
            OperationStatus::NoOp => "NO OP",
        }
    }

    /// Whether this status is a settled (final) state for the current run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationStatus::Success
                | OperationStatus::Failure
                | OperationStatus::Aborted
                | OperationStatus::Blocked
                | OperationStatus::NoOp
        )
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "READY" => Ok(OperationStatus::Ready),
            "WAITING" => Ok(OperationStatus::Waiting),
            "EXECUTING" => Ok(OperationStatus::Executing),
            "SUCCESS" => Ok(OperationStatus::Success),
            "FAILURE" => Ok(OperationStatus::Failure),
            "ABORTED" => Ok(OperationStatus::Aborted),
            "BLOCKED" => Ok(OperationStatus::Blocked),
            "NO OP" => Ok(OperationStatus::NoOp),
            other => Err(format!("unknown operation status: {other:?}")),
        }
    }
}
