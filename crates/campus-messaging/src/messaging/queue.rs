use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::Notify;
use tracing::warn;

/// What a bounded queue does with a new item once it is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    DropOldest,
    DropNewest,
}

impl OverflowPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "drop-oldest" | "drop_oldest" | "oldest" => Some(Self::DropOldest),
            "drop-newest" | "drop_newest" | "newest" => Some(Self::DropNewest),
            _ => None,
        }
    }
}

/// Result of an [`NotificationQueue::enqueue`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Accepted,
    /// Accepted after evicting the item at the head.
    Evicted(String),
    /// Rejected because the queue is full.
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub depth: usize,
    pub capacity: Option<usize>,
    pub enqueued: u64,
    pub dequeued: u64,
    pub dropped: u64,
}

/// In-process FIFO of rendered notifications shared by every dispatcher.
///
/// Consumers compete: each item is handed to exactly one `dequeue` caller.
/// Unbounded unless a capacity is given.
#[derive(Debug)]
pub struct NotificationQueue {
    items: Mutex<VecDeque<String>>,
    available: Notify,
    capacity: Option<usize>,
    overflow: OverflowPolicy,
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    dropped: AtomicU64,
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl NotificationQueue {
    pub fn unbounded() -> Self {
        Self::with_limits(None, OverflowPolicy::DropOldest)
    }

    pub fn bounded(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self::with_limits(Some(capacity.max(1)), overflow)
    }

    pub fn with_limits(capacity: Option<usize>, overflow: OverflowPolicy) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Notify::new(),
            capacity,
            overflow,
            enqueued: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Appends to the tail. Never blocks.
    pub fn enqueue(&self, item: String) -> EnqueueOutcome {
        let outcome = {
            let mut items = self.items.lock().expect("queue mutex poisoned");
            match self.capacity {
                Some(capacity) if items.len() >= capacity => match self.overflow {
                    OverflowPolicy::DropNewest => EnqueueOutcome::Rejected(item),
                    OverflowPolicy::DropOldest => {
                        let evicted = items.pop_front();
                        items.push_back(item);
                        match evicted {
                            Some(evicted) => EnqueueOutcome::Evicted(evicted),
                            None => EnqueueOutcome::Accepted,
                        }
                    }
                },
                _ => {
                    items.push_back(item);
                    EnqueueOutcome::Accepted
                }
            }
        };

        match &outcome {
            EnqueueOutcome::Accepted => {
                self.enqueued.fetch_add(1, Ordering::Relaxed);
                self.available.notify_one();
            }
            EnqueueOutcome::Evicted(_) => {
                self.enqueued.fetch_add(1, Ordering::Relaxed);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(capacity = ?self.capacity, "notification queue full, evicted oldest item");
                self.available.notify_one();
            }
            EnqueueOutcome::Rejected(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(capacity = ?self.capacity, "notification queue full, rejected new item");
            }
        }

        outcome
    }

    /// Removes the head, waiting while the queue is empty.
    ///
    /// Cancel safe: dropping the future before it completes never loses an item.
    pub async fn dequeue(&self) -> String {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_dequeue() {
                return item;
            }

            notified.await;
        }
    }

    pub fn try_dequeue(&self) -> Option<String> {
        let item = self
            .items
            .lock()
            .expect("queue mutex poisoned")
            .pop_front()?;
        self.dequeued.fetch_add(1, Ordering::Relaxed);
        Some(item)
    }

    /// Puts back an item whose consumer went away before delivering it.
    /// Bypasses the capacity check so the item keeps its place at the head.
    pub fn requeue_front(&self, item: String) {
        self.items
            .lock()
            .expect("queue mutex poisoned")
            .push_front(item);
        self.dequeued.fetch_sub(1, Ordering::Relaxed);
        self.available.notify_one();
    }

    /// Puts back a run of undelivered items ahead of everything else,
    /// keeping their relative order.
    pub fn requeue_all_front(&self, items: Vec<String>) {
        let count = items.len();
        {
            let mut queued = self.items.lock().expect("queue mutex poisoned");
            for item in items.into_iter().rev() {
                queued.push_front(item);
            }
        }
        self.dequeued.fetch_sub(count as u64, Ordering::Relaxed);
        for _ in 0..count {
            self.available.notify_one();
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().expect("queue mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            depth: self.len(),
            capacity: self.capacity,
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}
