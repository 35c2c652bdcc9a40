// src/watch/protocol.rs

//! Messages exchanged between a watch-mode client and its controlling host.
//!
//! The host drives the client with [`CommandMessage`]s; the client reports
//! state transitions back with [`EventMessage`]s. Both sides are plain serde
//! types so that any JSON-capable channel can carry a session.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::status::OperationStatus;

/// Instruction from the host to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum CommandMessage {
    /// Start an execution pass (or fold a rerun into the active one).
    Run,
    /// Cooperatively cancel the active pass.
    Cancel,
    /// Shut the session down.
    Exit,
    /// Ask the client to re-report its current status.
    Sync,
}

/// Notification from the client to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum EventMessage {
    /// Current status, sent once at session start and in reply to `Sync`.
    #[serde(rename = "sync")]
    Sync { status: OperationStatus },

    /// An execution pass settled with the given aggregate status.
    #[serde(rename = "after-execute")]
    AfterExecute { status: OperationStatus },

    /// The client wants a new pass; the host decides when to send `Run`.
    #[serde(rename = "requestRun")]
    RequestRun {
        requestor: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

/// The client's end of an IPC session.
pub struct IpcHost {
    /// Commands arriving from the host.
    pub commands: mpsc::Receiver<CommandMessage>,
    /// Events destined for the host.
    pub events: mpsc::Sender<EventMessage>,
}
