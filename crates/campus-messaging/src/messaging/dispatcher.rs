use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tokio_stream::Stream;
use tracing::{debug, error, info};

use super::queue::NotificationQueue;

/// Formats one server-sent event frame.
pub fn frame(item: &str) -> String {
    format!("data: {item}\n\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatcherState {
    Connected,
    AwaitingItem,
    Emitting,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// The client went away; includes failed writes.
    ClientClosed,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherExit {
    pub id: u64,
    pub delivered: u64,
    pub reason: ExitReason,
}

/// Per-connection loop moving queued notifications to one client.
pub struct StreamDispatcher {
    id: u64,
    queue: Arc<NotificationQueue>,
    frames: mpsc::Sender<String>,
    handoff: Arc<Mutex<Handoff>>,
    state: watch::Sender<DispatcherState>,
    shutdown: watch::Receiver<bool>,
    delivered: u64,
}

/// Shared between a dispatcher and its subscription. Frames are only sent
/// while the gate is held and open, so a dropped subscription can reclaim
/// every frame its client never read.
#[derive(Debug, Default)]
struct Handoff {
    closed: bool,
}

impl StreamDispatcher {
    pub async fn run(mut self) -> DispatcherExit {
        let reason = self.pump().await;
        self.state.send_replace(DispatcherState::Disconnected);
        debug!(
            dispatcher_id = self.id,
            delivered = self.delivered,
            ?reason,
            "stream dispatcher finished"
        );

        DispatcherExit {
            id: self.id,
            delivered: self.delivered,
            reason,
        }
    }

    async fn pump(&mut self) -> ExitReason {
        loop {
            if *self.shutdown.borrow() {
                return ExitReason::Shutdown;
            }
            self.state.send_replace(DispatcherState::AwaitingItem);

            // Reserve buffer space first so a dequeued item always has somewhere to go.
            let permit = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut self.shutdown) => return ExitReason::Shutdown,
                permit = self.frames.reserve() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return ExitReason::ClientClosed,
                },
            };

            let item = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut self.shutdown) => return ExitReason::Shutdown,
                _ = self.frames.closed() => return ExitReason::ClientClosed,
                item = self.queue.dequeue() => item,
            };

            self.state.send_replace(DispatcherState::Emitting);
            let handoff = self.handoff.lock().expect("handoff mutex poisoned");
            if handoff.closed {
                drop(handoff);
                self.queue.requeue_front(item);
                return ExitReason::ClientClosed;
            }
            permit.send(item);
            drop(handoff);
            self.delivered += 1;
        }
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender counts as shutdown too.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Receiving half handed to the transport for one connected client.
///
/// Dropping it hands any buffered, unread notifications back to the head of
/// the queue in their original order.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    frames: mpsc::Receiver<String>,
    handoff: Arc<Mutex<Handoff>>,
    queue: Arc<NotificationQueue>,
    state: watch::Receiver<DispatcherState>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> DispatcherState {
        *self.state.borrow()
    }

    /// A handle that keeps observing the dispatcher after the subscription is dropped.
    pub fn state_watcher(&self) -> watch::Receiver<DispatcherState> {
        self.state.clone()
    }

    pub async fn next(&mut self) -> Option<String> {
        self.frames.recv().await
    }

}

impl Stream for Subscription {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        self.frames.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let unread = {
            let mut handoff = self.handoff.lock().expect("handoff mutex poisoned");
            handoff.closed = true;
            self.frames.close();

            let mut unread = Vec::new();
            while let Ok(item) = self.frames.try_recv() {
                unread.push(item);
            }
            unread
        };

        if unread.is_empty() {
            return;
        }
        debug!(
            dispatcher_id = self.id,
            returned = unread.len(),
            "returning unread notifications to the queue"
        );
        self.queue.requeue_all_front(unread);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatcherError {
    #[error("notification streams are shutting down")]
    ShuttingDown,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    pub completed: usize,
    pub failed: usize,
}

/// Owns every dispatcher task so exits are observed and shutdown is clean.
pub struct DispatcherSupervisor {
    queue: Arc<NotificationQueue>,
    frame_buffer: usize,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<JoinSet<DispatcherExit>>,
    next_id: AtomicU64,
    active: Arc<AtomicUsize>,
}

impl DispatcherSupervisor {
    pub fn new(queue: Arc<NotificationQueue>, frame_buffer: usize) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            queue,
            frame_buffer: frame_buffer.max(1),
            shutdown,
            tasks: Mutex::new(JoinSet::new()),
            next_id: AtomicU64::new(0),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Spawns a dispatcher for a newly connected client.
    pub fn attach(&self) -> Result<Subscription, DispatcherError> {
        let mut tasks = self.tasks.lock().expect("dispatcher set mutex poisoned");
        if *self.shutdown.borrow() {
            return Err(DispatcherError::ShuttingDown);
        }
        reap_finished(&mut tasks);

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (frames_tx, frames_rx) = mpsc::channel(self.frame_buffer);
        let (state_tx, state_rx) = watch::channel(DispatcherState::Connected);
        let handoff = Arc::new(Mutex::new(Handoff::default()));

        let dispatcher = StreamDispatcher {
            id,
            queue: self.queue.clone(),
            frames: frames_tx,
            handoff: handoff.clone(),
            state: state_tx,
            shutdown: self.shutdown.subscribe(),
            delivered: 0,
        };

        let active = ActiveGuard::enter(self.active.clone());
        tasks.spawn(async move {
            let _active = active;
            dispatcher.run().await
        });
        info!(dispatcher_id = id, active = self.active(), "stream dispatcher attached");

        Ok(Subscription {
            id,
            frames: frames_rx,
            handoff,
            queue: self.queue.clone(),
            state: state_rx,
        })
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Signals every dispatcher to stop and refuses new attachments.
    pub fn close(&self) {
        if !self.shutdown.send_replace(true) {
            info!(active = self.active(), "closing notification streams");
        }
    }

    /// Waits for all dispatcher tasks to finish.
    pub async fn join(&self) -> ShutdownReport {
        let mut tasks = {
            let mut guard = self.tasks.lock().expect("dispatcher set mutex poisoned");
            std::mem::take(&mut *guard)
        };

        let mut report = ShutdownReport::default();
        while let Some(result) = tasks.join_next().await {
            if record_exit(result) {
                report.completed += 1;
            } else {
                report.failed += 1;
            }
        }
        report
    }

    pub async fn shutdown(&self) -> ShutdownReport {
        self.close();
        self.join().await
    }
}

fn reap_finished(tasks: &mut JoinSet<DispatcherExit>) {
    while let Some(result) = tasks.try_join_next() {
        record_exit(result);
    }
}

fn record_exit(result: Result<DispatcherExit, JoinError>) -> bool {
    match result {
        Ok(exit) => {
            debug!(
                dispatcher_id = exit.id,
                delivered = exit.delivered,
                reason = ?exit.reason,
                "stream dispatcher reaped"
            );
            true
        }
        Err(err) => {
            error!(error = %err, "stream dispatcher task failed");
            false
        }
    }
}

/// Decrements the live dispatcher count when the task ends, even by panic.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
