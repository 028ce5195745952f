use std::collections::HashSet;
use std::sync::Arc;

use super::common::WAIT;
use crate::messaging::queue::{EnqueueOutcome, NotificationQueue, OverflowPolicy};

#[tokio::test]
async fn single_consumer_sees_fifo_order() {
    let queue = NotificationQueue::unbounded();
    for index in 0..50 {
        assert_eq!(queue.enqueue(format!("n{index}")), EnqueueOutcome::Accepted);
    }

    for index in 0..50 {
        assert_eq!(queue.dequeue().await, format!("n{index}"));
    }
    assert!(queue.is_empty());
}

#[tokio::test]
async fn dequeue_waits_for_an_item() {
    let queue = Arc::new(NotificationQueue::unbounded());

    let consumer = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.dequeue().await })
    };
    tokio::task::yield_now().await;
    assert!(!consumer.is_finished());

    queue.enqueue("late".to_string());
    let item = tokio::time::timeout(WAIT, consumer)
        .await
        .expect("consumer woke up")
        .expect("consumer task");
    assert_eq!(item, "late");
}

#[tokio::test]
async fn competing_consumers_partition_items() {
    let queue = Arc::new(NotificationQueue::unbounded());
    let total = 200;

    let mut consumers = Vec::new();
    for _ in 0..4 {
        let queue = queue.clone();
        consumers.push(tokio::spawn(async move {
            let mut received = Vec::new();
            while let Ok(item) = tokio::time::timeout(WAIT / 4, queue.dequeue()).await {
                received.push(item);
            }
            received
        }));
    }

    for index in 0..total {
        queue.enqueue(format!("n{index}"));
    }

    let mut seen = HashSet::new();
    let mut count = 0;
    for consumer in consumers {
        for item in consumer.await.expect("consumer task") {
            count += 1;
            seen.insert(item);
        }
    }

    assert_eq!(count, total);
    assert_eq!(seen.len(), total);
}

#[tokio::test]
async fn cancelled_dequeue_loses_nothing() {
    let queue = NotificationQueue::unbounded();

    let timed_out =
        tokio::time::timeout(std::time::Duration::from_millis(20), queue.dequeue()).await;
    assert!(timed_out.is_err());

    queue.enqueue("kept".to_string());
    assert_eq!(queue.dequeue().await, "kept");
}

#[test]
fn drop_oldest_evicts_head_when_full() {
    let queue = NotificationQueue::bounded(2, OverflowPolicy::DropOldest);
    queue.enqueue("a".to_string());
    queue.enqueue("b".to_string());

    assert_eq!(
        queue.enqueue("c".to_string()),
        EnqueueOutcome::Evicted("a".to_string())
    );
    assert_eq!(queue.try_dequeue().as_deref(), Some("b"));
    assert_eq!(queue.try_dequeue().as_deref(), Some("c"));
    assert_eq!(queue.stats().dropped, 1);
}

#[test]
fn drop_newest_rejects_when_full() {
    let queue = NotificationQueue::bounded(1, OverflowPolicy::DropNewest);
    queue.enqueue("a".to_string());

    assert_eq!(
        queue.enqueue("b".to_string()),
        EnqueueOutcome::Rejected("b".to_string())
    );
    let stats = queue.stats();
    assert_eq!(stats.depth, 1);
    assert_eq!(stats.enqueued, 1);
    assert_eq!(stats.dropped, 1);
}

#[test]
fn requeue_front_restores_head_position() {
    let queue = NotificationQueue::unbounded();
    queue.enqueue("first".to_string());
    queue.enqueue("second".to_string());

    let taken = queue.try_dequeue().expect("item");
    queue.requeue_front(taken);

    assert_eq!(queue.try_dequeue().as_deref(), Some("first"));
    assert_eq!(queue.stats().dequeued, 1);
}

#[test]
fn parses_overflow_policies() {
    assert_eq!(
        OverflowPolicy::parse("Drop-Oldest"),
        Some(OverflowPolicy::DropOldest)
    );
    assert_eq!(
        OverflowPolicy::parse("drop_newest"),
        Some(OverflowPolicy::DropNewest)
    );
    assert_eq!(OverflowPolicy::parse("block"), None);
}

#[test]
fn requeue_all_front_keeps_batch_order_ahead_of_tail() {
    let queue = NotificationQueue::unbounded();
    for item in ["a", "b", "c", "d"] {
        queue.enqueue(item.to_string());
    }
    let taken: Vec<_> = std::iter::from_fn(|| queue.try_dequeue()).take(3).collect();

    queue.requeue_all_front(taken);

    let order: Vec<_> = std::iter::from_fn(|| queue.try_dequeue()).collect();
    assert_eq!(order, vec!["a", "b", "c", "d"]);
    assert_eq!(queue.stats().dequeued, 4);
}
