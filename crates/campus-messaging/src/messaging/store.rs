use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;

use super::domain::{Message, MessageId, NewMessage};

/// Persistence boundary for in-app messages.
pub trait MessageStore: Send + Sync {
    /// Inserts a message, assigning its id (unless requested) and timestamp.
    fn insert(&self, message: NewMessage) -> Result<Message, StoreError>;
    fn fetch(&self, id: MessageId) -> Result<Option<Message>, StoreError>;
    /// Messages addressed to `recipient`, most recently stored first.
    fn inbox(&self, recipient: &str, limit: usize) -> Result<Vec<Message>, StoreError>;
    /// All messages, most recently stored first.
    fn recent(&self, limit: usize) -> Result<Vec<Message>, StoreError>;
}

/// Error enumeration for persistence failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("message already exists")]
    Conflict,
    #[error("message not found")]
    NotFound,
    #[error("message store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Default)]
struct MemoryState {
    records: BTreeMap<MessageId, Message>,
    /// Ids in insertion order; client-chosen ids make id order unreliable.
    arrival: Vec<MessageId>,
    last_id: i64,
}

impl MemoryState {
    fn newest_first(&self) -> impl Iterator<Item = &Message> + '_ {
        self.arrival
            .iter()
            .rev()
            .filter_map(|id| self.records.get(id))
    }
}

/// Process-local store keyed by message id.
#[derive(Debug, Default, Clone)]
pub struct InMemoryMessageStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryMessageStore {
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .expect("message store mutex poisoned")
            .records
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MessageStore for InMemoryMessageStore {
    fn insert(&self, message: NewMessage) -> Result<Message, StoreError> {
        let mut guard = self.state.lock().expect("message store mutex poisoned");

        let id = match message.requested_id() {
            Some(id) if guard.records.contains_key(&id) => return Err(StoreError::Conflict),
            Some(id) => id,
            None => guard
                .last_id
                .checked_add(1)
                .map(MessageId)
                .ok_or_else(|| StoreError::Unavailable("message id space exhausted".into()))?,
        };
        guard.last_id = guard.last_id.max(id.0);

        let stored = Message {
            id,
            sender: message.sender,
            recipient: message.recipient,
            content: message.content,
            timestamp: Utc::now(),
        };
        guard.records.insert(id, stored.clone());
        guard.arrival.push(id);
        Ok(stored)
    }

    fn fetch(&self, id: MessageId) -> Result<Option<Message>, StoreError> {
        let guard = self.state.lock().expect("message store mutex poisoned");
        Ok(guard.records.get(&id).cloned())
    }

    fn inbox(&self, recipient: &str, limit: usize) -> Result<Vec<Message>, StoreError> {
        let guard = self.state.lock().expect("message store mutex poisoned");
        Ok(guard
            .newest_first()
            .filter(|message| message.recipient == recipient)
            .take(limit)
            .cloned()
            .collect())
    }

    fn recent(&self, limit: usize) -> Result<Vec<Message>, StoreError> {
        let guard = self.state.lock().expect("message store mutex poisoned");
        Ok(guard.newest_first().take(limit).cloned().collect())
    }
}
