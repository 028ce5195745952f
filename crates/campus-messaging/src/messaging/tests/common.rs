use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::response::Response;
use serde_json::Value;

use crate::messaging::domain::{Message, MessageId, NewMessage};
use crate::messaging::publisher::{
    NotificationPublisher, PublishError, QueueNotificationPublisher,
};
use crate::messaging::store::{InMemoryMessageStore, MessageStore, StoreError};
use crate::messaging::{
    messaging_router, DispatcherSupervisor, MessagingService, MessagingState, NotificationQueue,
};

pub(super) const WAIT: Duration = Duration::from_secs(2);

pub(super) type MemoryService =
    MessagingService<InMemoryMessageStore, QueueNotificationPublisher>;

pub(super) fn hello() -> NewMessage {
    NewMessage::new("a@x.com", "b@x.com", "hello")
}

pub(super) fn build_service() -> (
    MemoryService,
    Arc<InMemoryMessageStore>,
    Arc<NotificationQueue>,
) {
    let store = Arc::new(InMemoryMessageStore::default());
    let queue = Arc::new(NotificationQueue::unbounded());
    let publisher = Arc::new(QueueNotificationPublisher::new(queue.clone()));
    let service = MessagingService::new(store.clone(), publisher);
    (service, store, queue)
}

pub(super) fn state_for(
    service: MemoryService,
    queue: Arc<NotificationQueue>,
) -> MessagingState<InMemoryMessageStore, QueueNotificationPublisher> {
    MessagingState {
        service: Arc::new(service),
        dispatchers: Arc::new(DispatcherSupervisor::new(queue.clone(), 8)),
        queue,
        keep_alive: None,
    }
}

pub(super) fn router_with_service(
    service: MemoryService,
    queue: Arc<NotificationQueue>,
) -> axum::Router {
    messaging_router(state_for(service, queue))
}

/// Records every message it is told about.
#[derive(Default, Clone)]
pub(super) struct RecordingPublisher {
    seen: Arc<Mutex<Vec<MessageId>>>,
}

impl RecordingPublisher {
    pub(super) fn seen(&self) -> Vec<MessageId> {
        self.seen.lock().expect("publisher mutex poisoned").clone()
    }
}

impl NotificationPublisher for RecordingPublisher {
    fn on_message_created(&self, message: &Message) -> Result<(), PublishError> {
        self.seen
            .lock()
            .expect("publisher mutex poisoned")
            .push(message.id);
        Ok(())
    }
}

pub(super) struct FullQueuePublisher;

impl NotificationPublisher for FullQueuePublisher {
    fn on_message_created(&self, _message: &Message) -> Result<(), PublishError> {
        Err(PublishError::QueueFull)
    }
}

pub(super) struct UnavailableStore;

impl MessageStore for UnavailableStore {
    fn insert(&self, _message: NewMessage) -> Result<Message, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: MessageId) -> Result<Option<Message>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn inbox(&self, _recipient: &str, _limit: usize) -> Result<Vec<Message>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn recent(&self, _limit: usize) -> Result<Vec<Message>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
