use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use super::domain::{Message, MessageId, NewMessage};
use super::store::{MessageStore, StoreError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY,
    sender TEXT NOT NULL,
    recipient TEXT NOT NULL,
    content TEXT NOT NULL,
    timestamp TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    seq INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_seq ON messages (seq);
CREATE INDEX IF NOT EXISTS idx_messages_recipient ON messages (recipient, seq);
";

const COLUMNS: &str = "id, sender, recipient, content, timestamp";

/// SQLite-backed message table. The database assigns ids and timestamps.
///
/// `seq` records insertion order, which listings follow since clients may
/// pick their own ids.
pub struct SqliteMessageStore {
    conn: Mutex<Connection>,
}

impl SqliteMessageStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening message database");
        let conn = Connection::open(path).map_err(map_error)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(map_error)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA).map_err(map_error)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl MessageStore for SqliteMessageStore {
    fn insert(&self, message: NewMessage) -> Result<Message, StoreError> {
        let requested = message.requested_id().map(|id| id.0);
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        conn.query_row(
            &format!(
                "INSERT INTO messages (id, sender, recipient, content, seq) \
                 VALUES (?1, ?2, ?3, ?4, (SELECT COALESCE(MAX(seq), 0) + 1 FROM messages)) \
                 RETURNING {COLUMNS}"
            ),
            params![
                requested,
                message.sender,
                message.recipient,
                message.content
            ],
            read_message,
        )
        .map_err(map_error)
    }

    fn fetch(&self, id: MessageId) -> Result<Option<Message>, StoreError> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM messages WHERE id = ?1"),
            params![id.0],
            read_message,
        )
        .optional()
        .map_err(map_error)
    }

    fn inbox(&self, recipient: &str, limit: usize) -> Result<Vec<Message>, StoreError> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM messages WHERE recipient = ?1 ORDER BY seq DESC LIMIT ?2"
            ))
            .map_err(map_error)?;
        let rows = stmt
            .query_map(params![recipient, limit as i64], read_message)
            .map_err(map_error)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(map_error)
    }

    fn recent(&self, limit: usize) -> Result<Vec<Message>, StoreError> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM messages ORDER BY seq DESC LIMIT ?1"
            ))
            .map_err(map_error)?;
        let rows = stmt
            .query_map(params![limit as i64], read_message)
            .map_err(map_error)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(map_error)
    }
}

fn read_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let raw_timestamp: String = row.get(4)?;
    let timestamp = DateTime::parse_from_rfc3339(&raw_timestamp)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(err)))?
        .with_timezone(&Utc);

    Ok(Message {
        id: MessageId(row.get(0)?),
        sender: row.get(1)?,
        recipient: row.get(2)?,
        content: row.get(3)?,
        timestamp,
    })
}

fn map_error(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            StoreError::Conflict
        }
        _ => StoreError::Unavailable(err.to_string()),
    }
}
