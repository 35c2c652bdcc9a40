// tests/work_queue.rs

use std::error::Error;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use opgraph::engine::WorkQueue;
use opgraph::OperationStatus;
use opgraph_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

async fn wait_for_len(queue: &Arc<WorkQueue>, len: usize) {
    while queue.len() < len {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn drains_in_priority_order() -> TestResult {
    init_tracing();

    let queue = Arc::new(WorkQueue::new(CancellationToken::new()));
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let mut pushers = Vec::new();
    for (name, priority) in [("low", 1), ("high", 5), ("mid", 3)] {
        let queue = Arc::clone(&queue);
        let order = Arc::clone(&order);
        pushers.push(tokio::spawn(async move {
            queue
                .push(
                    async move {
                        order.lock().unwrap().push(name);
                        OperationStatus::Success
                    },
                    priority,
                )
                .await
        }));
    }

    with_timeout(wait_for_len(&queue, 3)).await;
    for _ in 0..3 {
        let work = with_timeout(queue.pull()).await.expect("queue not aborted");
        work.run().await;
    }

    assert_eq!(order.lock().unwrap().clone(), vec!["high", "mid", "low"]);
    for pusher in pushers {
        assert_eq!(pusher.await?, OperationStatus::Success);
    }
    Ok(())
}

#[tokio::test]
async fn equal_priorities_drain_in_push_order() -> TestResult {
    init_tracing();

    let queue = Arc::new(WorkQueue::new(CancellationToken::new()));
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    for name in ["first", "second", "third"] {
        let queue = Arc::clone(&queue);
        let order = Arc::clone(&order);
        tokio::spawn(async move {
            queue
                .push(
                    async move {
                        order.lock().unwrap().push(name);
                        OperationStatus::Success
                    },
                    7,
                )
                .await
        });
    }

    with_timeout(wait_for_len(&queue, 3)).await;
    for _ in 0..3 {
        let work = with_timeout(queue.pull()).await.expect("queue not aborted");
        work.run().await;
    }

    assert_eq!(order.lock().unwrap().clone(), vec!["first", "second", "third"]);
    Ok(())
}

#[tokio::test]
async fn abort_resolves_unstarted_work_as_aborted() -> TestResult {
    init_tracing();

    let signal = CancellationToken::new();
    let queue = Arc::new(WorkQueue::new(signal.clone()));

    let mut pushers = Vec::new();
    for i in 0..10u64 {
        let queue = Arc::clone(&queue);
        pushers.push(tokio::spawn(async move {
            queue
                .push(async move { OperationStatus::Success }, i)
                .await
        }));
    }

    with_timeout(wait_for_len(&queue, 10)).await;

    // One item starts before the abort; its result stands.
    let work = with_timeout(queue.pull()).await.expect("queue not aborted");
    work.run().await;

    signal.cancel();
    assert!(with_timeout(queue.pull()).await.is_none());
    assert!(queue.is_empty());

    let mut results = Vec::new();
    for pusher in pushers {
        results.push(with_timeout(pusher).await?);
    }
    let successes = results
        .iter()
        .filter(|status| **status == OperationStatus::Success)
        .count();
    let aborted = results
        .iter()
        .filter(|status| **status == OperationStatus::Aborted)
        .count();
    assert_eq!(successes, 1);
    assert_eq!(aborted, 9);
    Ok(())
}

#[tokio::test]
async fn push_after_abort_resolves_aborted() -> TestResult {
    init_tracing();

    let signal = CancellationToken::new();
    let queue = Arc::new(WorkQueue::new(signal.clone()));
    signal.cancel();

    let status = with_timeout(queue.push(async { OperationStatus::Success }, 1)).await;
    assert_eq!(status, OperationStatus::Aborted);
    assert!(with_timeout(queue.pull()).await.is_none());
    Ok(())
}
