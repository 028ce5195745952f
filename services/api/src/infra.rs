use campus_messaging::config::{MessagingConfig, StoreBackend};
use campus_messaging::messaging::{
    DispatcherSupervisor, InMemoryMessageStore, MessageStore, MessagingService, MessagingState,
    NotificationQueue, QueueNotificationPublisher, SqliteMessageStore, StoreError,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type SharedMessaging = MessagingState<dyn MessageStore, QueueNotificationPublisher>;

pub(crate) fn open_store(backend: &StoreBackend) -> Result<Arc<dyn MessageStore>, StoreError> {
    let store: Arc<dyn MessageStore> = match backend {
        StoreBackend::Memory => Arc::new(InMemoryMessageStore::default()),
        StoreBackend::SqliteInMemory => Arc::new(SqliteMessageStore::in_memory()?),
        StoreBackend::Sqlite(path) => Arc::new(SqliteMessageStore::open(path)?),
    };
    Ok(store)
}

/// Wires store, queue, publisher, and supervisor from configuration.
pub(crate) fn build_messaging(config: &MessagingConfig) -> Result<SharedMessaging, StoreError> {
    let store = open_store(&config.store)?;
    let queue = Arc::new(NotificationQueue::with_limits(
        config.queue_capacity,
        config.overflow,
    ));
    let publisher = Arc::new(QueueNotificationPublisher::new(queue.clone()));

    info!(
        store = ?config.store,
        capacity = ?config.queue_capacity,
        overflow = ?config.overflow,
        "messaging pipeline configured"
    );

    Ok(MessagingState {
        service: Arc::new(MessagingService::new(store, publisher)),
        dispatchers: Arc::new(DispatcherSupervisor::new(
            queue.clone(),
            config.stream_buffer,
        )),
        queue,
        keep_alive: config.keep_alive,
    })
}
