// src/engine/work_queue.rs

//! Priority-ordered holding area for ready-to-run work.
//!
//! Producers push units of work with a priority and await the result; a
//! bounded pool of consumers pulls work in descending priority order. The
//! queue itself does not manage concurrency: the pool size is whatever number
//! of tasks the caller runs against [`WorkQueue::pull`].

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::status::OperationStatus;

type WorkFuture = Pin<Box<dyn Future<Output = OperationStatus> + Send>>;

struct WorkItem {
    priority: u64,
    /// Monotonic insertion counter; equal priorities drain in push order.
    sequence: u64,
    work: WorkFuture,
    result: oneshot::Sender<OperationStatus>,
}

impl PartialEq for WorkItem {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for WorkItem {}

impl PartialOrd for WorkItem {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for WorkItem {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Max-heap on priority; lower sequence wins ties (FIFO).
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// A unit of work handed to a consumer by [`WorkQueue::pull`].
///
/// Once pulled, the work is considered started: aborting the queue no longer
/// affects it, and its own result is what the pusher observes.
pub struct QueuedWork {
    work: WorkFuture,
    result: oneshot::Sender<OperationStatus>,
}

impl QueuedWork {
    /// Run the work to completion and deliver its result to the pusher.
    pub async fn run(self) {
        let status = self.work.await;
        // The pusher may have gone away; that is not our problem.
        let _ = self.result.send(status);
    }
}

/// Concurrency-safe priority queue of pending work, abortable via a
/// [`CancellationToken`].
pub struct WorkQueue {
    signal: CancellationToken,
    heap: Mutex<BinaryHeap<WorkItem>>,
    wake: Notify,
    sequence: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl WorkQueue {
    pub fn new(signal: CancellationToken) -> Self {
        Self {
            signal,
            heap: Mutex::new(BinaryHeap::new()),
            wake: Notify::new(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Enqueue `work` at the given priority and await its result.
    ///
    /// Resolves to whatever the work resolves to, or to `Aborted` if the
    /// queue's signal fires before the work is pulled by a consumer. Work
    /// that has already started always wins the race: its own result stands.
    /// If the work dies without delivering a result (a panic inside the
    /// future), this resolves to `Failure`.
    pub async fn push<F>(&self, work: F, priority: u64) -> OperationStatus
    where
        F: Future<Output = OperationStatus> + Send + 'static,
    {
        let (result, receiver) = oneshot::channel();
        {
            let mut heap = lock(&self.heap);
            heap.push(WorkItem {
                priority,
                sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
                work: Box::pin(work),
                result,
            });
        }

        // One wake per batch of pushes is enough; parked consumers re-check
        // the heap after waking.
        self.wake.notify_waiters();

        // If the abort won the race against this push, there may be no
        // consumer left to drain us.
        if self.signal.is_cancelled() {
            self.abort_pending();
        }

        // The abort path always sends an explicit `Aborted`; a dropped
        // sender means the work died mid-flight.
        receiver.await.unwrap_or(OperationStatus::Failure)
    }

    /// Pull the highest-priority ready item, waiting for a push if the queue
    /// is currently empty. Returns `None` once the abort signal has fired;
    /// any work still queued at that point is resolved as `Aborted` without
    /// being run.
    pub async fn pull(&self) -> Option<QueuedWork> {
        loop {
            // Register for wakeups before inspecting the heap so that a push
            // racing with the emptiness check cannot be lost.
            let wake = self.wake.notified();
            tokio::pin!(wake);
            wake.as_mut().enable();

            if self.signal.is_cancelled() {
                self.abort_pending();
                return None;
            }

            if let Some(item) = lock(&self.heap).pop() {
                return Some(QueuedWork {
                    work: item.work,
                    result: item.result,
                });
            }

            tokio::select! {
                _ = &mut wake => {}
                _ = self.signal.cancelled() => {}
            }
        }
    }

    /// Number of items currently waiting for a consumer.
    pub fn len(&self) -> usize {
        lock(&self.heap).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.heap).is_empty()
    }

    /// Resolve every not-yet-started item as `Aborted`.
    fn abort_pending(&self) {
        let drained: Vec<WorkItem> = lock(&self.heap).drain().collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "aborting queued work that never started");
        }
        for item in drained {
            let _ = item.result.send(OperationStatus::Aborted);
        }
    }
}
