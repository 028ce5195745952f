use super::common::*;
use crate::messaging::domain::{MessageId, NewMessage};
use crate::messaging::store::{InMemoryMessageStore, MessageStore, StoreError};
use crate::messaging::{MessagingService, MessagingServiceError, ValidationError};
use std::sync::Arc;

#[test]
fn create_message_stores_row_and_queues_one_payload() {
    let (service, store, queue) = build_service();

    let stored = service.create_message(hello()).expect("message created");

    assert_eq!(stored.content, "hello");
    assert_eq!(store.len(), 1);
    assert_eq!(queue.len(), 1);
    assert_eq!(
        queue.try_dequeue().as_deref(),
        Some(r#"You have a message: {"content": "hello", "sender": "a@x.com"}"#)
    );
}

#[test]
fn duplicate_insert_queues_nothing() {
    let (service, store, queue) = build_service();
    service
        .create_message(hello().with_id(11))
        .expect("first insert");
    queue.try_dequeue().expect("first notification");

    match service.create_message(NewMessage::new("c@x.com", "d@x.com", "dup").with_id(11)) {
        Err(MessagingServiceError::Store(StoreError::Conflict)) => {}
        other => panic!("expected conflict, got {other:?}"),
    }

    assert_eq!(store.len(), 1);
    assert!(queue.is_empty());
    assert_eq!(queue.stats().enqueued, 1);
}

#[test]
fn store_failure_never_reaches_publisher() {
    let publisher = Arc::new(RecordingPublisher::default());
    let service = MessagingService::new(Arc::new(UnavailableStore), publisher.clone());

    let err = service.create_message(hello()).expect_err("store offline");

    assert!(matches!(
        err,
        MessagingServiceError::Store(StoreError::Unavailable(_))
    ));
    assert!(publisher.seen().is_empty());
}

#[test]
fn publisher_sees_each_stored_message_once() {
    let store = Arc::new(InMemoryMessageStore::default());
    let publisher = Arc::new(RecordingPublisher::default());
    let service = MessagingService::new(store, publisher.clone());

    let first = service.create_message(hello()).expect("created");
    let second = service
        .create_message(NewMessage::new("b@x.com", "a@x.com", "reply"))
        .expect("created");

    assert_eq!(publisher.seen(), vec![first.id, second.id]);
}

#[test]
fn publish_failure_is_counted_but_message_is_kept() {
    let store = Arc::new(InMemoryMessageStore::default());
    let service = MessagingService::new(store.clone(), Arc::new(FullQueuePublisher));

    let stored = service.create_message(hello()).expect("message still created");

    assert_eq!(service.failed_publishes(), 1);
    assert_eq!(store.fetch(stored.id).expect("fetch"), Some(stored));
}

#[test]
fn blank_sender_is_rejected_before_insert() {
    let (service, store, queue) = build_service();

    let err = service
        .create_message(NewMessage::new("  ", "b@x.com", "hello"))
        .expect_err("blank sender");

    assert!(matches!(
        err,
        MessagingServiceError::Validation(ValidationError::MissingField("sender"))
    ));
    assert!(store.is_empty());
    assert!(queue.is_empty());
}

#[test]
fn negative_ids_are_rejected() {
    let (service, _, _) = build_service();

    let err = service
        .create_message(hello().with_id(-4))
        .expect_err("negative id");

    assert!(matches!(
        err,
        MessagingServiceError::Validation(ValidationError::NegativeId)
    ));
}

#[test]
fn get_propagates_not_found() {
    let (service, _, _) = build_service();

    match service.get(MessageId(99)) {
        Err(MessagingServiceError::Store(StoreError::NotFound)) => {}
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn inbox_limit_is_capped() {
    let (service, _, _) = build_service();
    for index in 0..3 {
        service
            .create_message(NewMessage::new("a@x.com", "b@x.com", format!("m{index}")))
            .expect("created");
    }

    let inbox = service.inbox("b@x.com", usize::MAX).expect("inbox");
    assert_eq!(inbox.len(), 3);
    assert_eq!(inbox[0].content, "m2");
}
