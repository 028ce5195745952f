use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use super::domain::{Message, MessageId, NewMessage};
use super::publisher::NotificationPublisher;
use super::store::{MessageStore, StoreError};

/// Upper bound applied to list queries.
pub const MAX_PAGE_SIZE: usize = 500;

/// Persists messages and then announces them to live streams.
///
/// The publish step runs only after the insert succeeds and before
/// `create_message` returns.
pub struct MessagingService<S: ?Sized, P: ?Sized> {
    store: Arc<S>,
    publisher: Arc<P>,
    failed_publishes: AtomicU64,
}

impl<S, P> MessagingService<S, P>
where
    S: MessageStore + ?Sized + 'static,
    P: NotificationPublisher + ?Sized + 'static,
{
    pub fn new(store: Arc<S>, publisher: Arc<P>) -> Self {
        Self {
            store,
            publisher,
            failed_publishes: AtomicU64::new(0),
        }
    }

    /// Store the message, then queue its notification.
    ///
    /// A publish failure is logged and counted but does not fail the call.
    pub fn create_message(&self, message: NewMessage) -> Result<Message, MessagingServiceError> {
        validate(&message)?;

        let stored = self.store.insert(message)?;
        info!(message_id = %stored.id, recipient = %stored.recipient, "message stored");

        if let Err(err) = self.publisher.on_message_created(&stored) {
            self.failed_publishes.fetch_add(1, Ordering::Relaxed);
            warn!(message_id = %stored.id, error = %err, "live notification not queued");
        }

        Ok(stored)
    }

    pub fn get(&self, id: MessageId) -> Result<Message, MessagingServiceError> {
        let message = self.store.fetch(id)?.ok_or(StoreError::NotFound)?;
        Ok(message)
    }

    pub fn inbox(
        &self,
        recipient: &str,
        limit: usize,
    ) -> Result<Vec<Message>, MessagingServiceError> {
        Ok(self.store.inbox(recipient, limit.min(MAX_PAGE_SIZE))?)
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<Message>, MessagingServiceError> {
        Ok(self.store.recent(limit.min(MAX_PAGE_SIZE))?)
    }

    pub fn failed_publishes(&self) -> u64 {
        self.failed_publishes.load(Ordering::Relaxed)
    }
}

fn validate(message: &NewMessage) -> Result<(), ValidationError> {
    if message.sender.trim().is_empty() {
        return Err(ValidationError::MissingField("sender"));
    }
    if message.recipient.trim().is_empty() {
        return Err(ValidationError::MissingField("recipient"));
    }
    if message.id.is_some_and(|id| id < 0) {
        return Err(ValidationError::NegativeId);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} must not be blank")]
    MissingField(&'static str),
    #[error("message id must be positive")]
    NegativeId,
}

/// Error raised by the messaging service.
#[derive(Debug, thiserror::Error)]
pub enum MessagingServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
