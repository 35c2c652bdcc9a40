// src/stopwatch.rs

//! Monotonic start/stop timer for operation and group durations.

use std::time::{Duration, Instant};

/// A restartable stopwatch backed by [`Instant`].
///
/// Calling `start()` again discards any previous measurement; this matches
/// the per-run reset semantics of the execution engine, where each run gets a
/// fresh timing window.
#[derive(Debug, Clone, Default)]
pub struct Stopwatch {
    start: Option<Instant>,
    end: Option<Instant>,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin (or restart) timing from now.
    pub fn start(&mut self) {
        self.start = Some(Instant::now());
        self.end = None;
    }

    /// Stop timing. Has no effect if the stopwatch was never started.
    pub fn stop(&mut self) {
        if self.start.is_some() && self.end.is_none() {
            self.end = Some(Instant::now());
        }
    }

    /// True if `start()` has been called without a matching `stop()`.
    pub fn is_running(&self) -> bool {
        self.start.is_some() && self.end.is_none()
    }

    /// Elapsed time: zero if never started, elapsed-so-far while running,
    /// frozen once stopped.
    pub fn duration(&self) -> Duration {
        match (self.start, self.end) {
            (Some(start), Some(end)) => end.duration_since(start),
            (Some(start), None) => start.elapsed(),
            (None, _) => Duration::ZERO,
        }
    }
}
