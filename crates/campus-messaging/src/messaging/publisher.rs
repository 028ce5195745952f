use std::sync::Arc;

use tracing::debug;

use super::domain::{Message, NotificationPayload};
use super::queue::{EnqueueOutcome, NotificationQueue};

/// Hook invoked once a message has been persisted.
pub trait NotificationPublisher: Send + Sync {
    fn on_message_created(&self, message: &Message) -> Result<(), PublishError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("notification queue is full")]
    QueueFull,
    #[error("notification could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Renders the payload and pushes it onto the shared queue.
#[derive(Debug, Clone)]
pub struct QueueNotificationPublisher {
    queue: Arc<NotificationQueue>,
}

impl QueueNotificationPublisher {
    pub fn new(queue: Arc<NotificationQueue>) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &Arc<NotificationQueue> {
        &self.queue
    }
}

impl NotificationPublisher for QueueNotificationPublisher {
    fn on_message_created(&self, message: &Message) -> Result<(), PublishError> {
        let rendered = NotificationPayload::from_message(message).render()?;

        match self.queue.enqueue(rendered) {
            EnqueueOutcome::Rejected(_) => Err(PublishError::QueueFull),
            EnqueueOutcome::Accepted | EnqueueOutcome::Evicted(_) => {
                debug!(message_id = %message.id, depth = self.queue.len(), "notification queued");
                Ok(())
            }
        }
    }
}
