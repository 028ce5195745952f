use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::StreamExt;

use super::dispatcher::DispatcherSupervisor;
use super::domain::{MessageId, NewMessage};
use super::publisher::NotificationPublisher;
use super::queue::NotificationQueue;
use super::service::MessagingService;
use super::store::MessageStore;
use crate::error::AppError;

const DEFAULT_PAGE_SIZE: usize = 50;

/// Shared handles for the messaging routes.
pub struct MessagingState<S: ?Sized, P: ?Sized> {
    pub service: Arc<MessagingService<S, P>>,
    pub dispatchers: Arc<DispatcherSupervisor>,
    pub queue: Arc<NotificationQueue>,
    pub keep_alive: Option<Duration>,
}

impl<S: ?Sized, P: ?Sized> Clone for MessagingState<S, P> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            dispatchers: self.dispatchers.clone(),
            queue: self.queue.clone(),
            keep_alive: self.keep_alive,
        }
    }
}

/// Router exposing message creation, lookup, and the live notification stream.
pub fn messaging_router<S, P>(state: MessagingState<S, P>) -> Router
where
    S: MessageStore + ?Sized + 'static,
    P: NotificationPublisher + ?Sized + 'static,
{
    Router::new()
        .route(
            "/messaging/messages",
            get(list_handler::<S, P>).post(create_handler::<S, P>),
        )
        .route("/messaging/messages/:message_id", get(fetch_handler::<S, P>))
        .route("/messaging/stream", get(stream_handler::<S, P>))
        .route("/messaging/stats", get(stats_handler::<S, P>))
        .with_state(state)
}

pub(crate) async fn create_handler<S, P>(
    State(state): State<MessagingState<S, P>>,
    Json(message): Json<NewMessage>,
) -> Response
where
    S: MessageStore + ?Sized + 'static,
    P: NotificationPublisher + ?Sized + 'static,
{
    match state.service.create_message(message) {
        Ok(stored) => {
            let payload = json!({
                "message": "Message created successfully",
                "data": stored,
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(err) => AppError::from(err).into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListParams {
    pub(crate) recipient: Option<String>,
    pub(crate) limit: Option<usize>,
}

pub(crate) async fn list_handler<S, P>(
    State(state): State<MessagingState<S, P>>,
    Query(params): Query<ListParams>,
) -> Response
where
    S: MessageStore + ?Sized + 'static,
    P: NotificationPublisher + ?Sized + 'static,
{
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    let result = match params.recipient.as_deref() {
        Some(recipient) => state.service.inbox(recipient, limit),
        None => state.service.recent(limit),
    };

    match result {
        Ok(messages) => (StatusCode::OK, Json(messages)).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub(crate) async fn fetch_handler<S, P>(
    State(state): State<MessagingState<S, P>>,
    Path(message_id): Path<i64>,
) -> Response
where
    S: MessageStore + ?Sized + 'static,
    P: NotificationPublisher + ?Sized + 'static,
{
    match state.service.get(MessageId(message_id)) {
        Ok(message) => (StatusCode::OK, Json(message)).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub(crate) async fn stream_handler<S, P>(State(state): State<MessagingState<S, P>>) -> Response
where
    S: MessageStore + ?Sized + 'static,
    P: NotificationPublisher + ?Sized + 'static,
{
    let subscription = match state.dispatchers.attach() {
        Ok(subscription) => subscription,
        Err(err) => return AppError::from(err).into_response(),
    };

    let events = subscription.map(|item| Ok::<_, Infallible>(Event::default().data(item)));
    let sse = Sse::new(events);

    match state.keep_alive {
        Some(interval) => sse
            .keep_alive(KeepAlive::new().interval(interval))
            .into_response(),
        None => sse.into_response(),
    }
}

pub(crate) async fn stats_handler<S, P>(State(state): State<MessagingState<S, P>>) -> Response
where
    S: MessageStore + ?Sized + 'static,
    P: NotificationPublisher + ?Sized + 'static,
{
    let payload = json!({
        "queue": state.queue.stats(),
        "active_dispatchers": state.dispatchers.active(),
        "failed_publishes": state.service.failed_publishes(),
        "accepting_streams": !state.dispatchers.is_closed(),
    });
    (StatusCode::OK, Json(payload)).into_response()
}
