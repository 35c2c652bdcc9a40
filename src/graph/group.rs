// src/graph/group.rs

//! Aggregate timing and outcome tracking for named groups of operations.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::status::OperationStatus;
use crate::stopwatch::Stopwatch;

/// Final verdict for a finished group, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOutcome {
    Finished,
    Cancelled,
    EncounteredError,
}

impl fmt::Display for GroupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupOutcome::Finished => f.write_str("finished"),
            GroupOutcome::Cancelled => f.write_str("cancelled"),
            GroupOutcome::EncounteredError => f.write_str("encountered an error"),
        }
    }
}

/// A named bucket of operations, orthogonal to the dependency graph, used
/// purely for aggregate timing and start/finish logging.
///
/// A group is `finished` exactly when its remaining set is empty; the
/// stopwatch stops the instant the last member completes.
pub struct OperationGroupRecord {
    name: String,
    metadata: serde_json::Value,
    operations: Mutex<BTreeSet<String>>,
    remaining: Mutex<BTreeSet<String>>,
    stopwatch: Mutex<Stopwatch>,
    started: AtomicBool,
    finish_reported: AtomicBool,
    has_failures: AtomicBool,
    has_cancellations: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl OperationGroupRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_metadata(name, serde_json::Value::Null)
    }

    pub fn with_metadata(name: impl Into<String>, metadata: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            metadata,
            operations: Mutex::new(BTreeSet::new()),
            remaining: Mutex::new(BTreeSet::new()),
            stopwatch: Mutex::new(Stopwatch::new()),
            started: AtomicBool::new(false),
            finish_reported: AtomicBool::new(false),
            has_failures: AtomicBool::new(false),
            has_cancellations: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }

    /// Register a member. Called during `Operation` construction.
    pub fn add_operation(&self, name: &str) {
        lock(&self.operations).insert(name.to_string());
        lock(&self.remaining).insert(name.to_string());
    }

    /// Re-seed the remaining set and clear per-run outcome state before a
    /// manager run.
    pub fn reset(&self) {
        let members = lock(&self.operations).clone();
        *lock(&self.remaining) = members;
        *lock(&self.stopwatch) = Stopwatch::new();
        self.started.store(false, Ordering::SeqCst);
        self.finish_reported.store(false, Ordering::SeqCst);
        self.has_failures.store(false, Ordering::SeqCst);
        self.has_cancellations.store(false, Ordering::SeqCst);
    }

    /// Mark the group as started. Returns true only for the first caller of
    /// the current run, which should fire the group-start notification.
    pub(crate) fn mark_started(&self) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            return false;
        }
        lock(&self.stopwatch).start();
        true
    }

    /// Record completion of a member operation. The group's stopwatch stops
    /// the moment the remaining set becomes empty.
    pub(crate) fn mark_operation_complete(&self, name: &str, status: OperationStatus) {
        match status {
            OperationStatus::Failure => self.has_failures.store(true, Ordering::SeqCst),
            OperationStatus::Aborted => self.has_cancellations.store(true, Ordering::SeqCst),
            _ => {}
        }

        let mut remaining = lock(&self.remaining);
        remaining.remove(name);
        if remaining.is_empty() {
            lock(&self.stopwatch).stop();
        }
    }

    /// Marks the finish notification as delivered. Returns true only for the
    /// first caller, so the group-finish hook fires exactly once per run.
    pub(crate) fn mark_finish_reported(&self) -> bool {
        !self.finish_reported.swap(true, Ordering::SeqCst)
    }

    /// True once every member operation has completed in the current run.
    pub fn finished(&self) -> bool {
        lock(&self.remaining).is_empty()
    }

    pub fn has_failures(&self) -> bool {
        self.has_failures.load(Ordering::SeqCst)
    }

    pub fn has_cancellations(&self) -> bool {
        self.has_cancellations.load(Ordering::SeqCst)
    }

    /// Failures take precedence over cancellations in the reported verdict.
    pub fn outcome(&self) -> GroupOutcome {
        if self.has_failures() {
            GroupOutcome::EncounteredError
        } else if self.has_cancellations() {
            GroupOutcome::Cancelled
        } else {
            GroupOutcome::Finished
        }
    }

    pub fn duration(&self) -> Duration {
        lock(&self.stopwatch).duration()
    }
}

impl fmt::Debug for OperationGroupRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationGroupRecord")
            .field("name", &self.name)
            .field("finished", &self.finished())
            .field("has_failures", &self.has_failures())
            .field("has_cancellations", &self.has_cancellations())
            .finish_non_exhaustive()
    }
}
