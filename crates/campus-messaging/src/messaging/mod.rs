//! In-app messages and their live notification pipeline.
//!
//! A created message is persisted by a [`MessageStore`], rendered into a
//! notification by a [`NotificationPublisher`], queued on the shared
//! [`NotificationQueue`], and pushed to exactly one connected client by a
//! [`StreamDispatcher`] owned by the [`DispatcherSupervisor`].

pub mod dispatcher;
pub mod domain;
pub mod publisher;
pub mod queue;
pub mod router;
pub mod service;
pub mod sqlite;
pub mod store;

#[cfg(test)]
mod tests;

pub use dispatcher::{
    frame, DispatcherError, DispatcherExit, DispatcherState, DispatcherSupervisor, ExitReason,
    ShutdownReport, StreamDispatcher, Subscription,
};
pub use domain::{Message, MessageId, NewMessage, NotificationPayload};
pub use publisher::{NotificationPublisher, PublishError, QueueNotificationPublisher};
pub use queue::{EnqueueOutcome, NotificationQueue, OverflowPolicy, QueueStats};
pub use router::{messaging_router, MessagingState};
pub use service::{MessagingService, MessagingServiceError, ValidationError, MAX_PAGE_SIZE};
pub use sqlite::SqliteMessageStore;
pub use store::{InMemoryMessageStore, MessageStore, StoreError};
