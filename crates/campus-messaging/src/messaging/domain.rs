use std::fmt;
use std::io;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;

/// Store-assigned message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persisted in-app message. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: String,
    pub recipient: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Create request. An `id` of `None` or `0` lets the store assign one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub sender: String,
    pub recipient: String,
    pub content: String,
}

impl NewMessage {
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            sender: sender.into(),
            recipient: recipient.into(),
            content: content.into(),
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// The id requested by the client, ignoring the `0` placeholder.
    pub fn requested_id(&self) -> Option<MessageId> {
        self.id.filter(|id| *id > 0).map(MessageId)
    }
}

/// Live notification derived from a [`Message`]. The recipient is not carried,
/// so every connected stream is eligible to receive it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationPayload {
    pub content: String,
    pub sender: String,
}

const NOTIFICATION_PREFIX: &str = "You have a message: ";

impl NotificationPayload {
    pub fn from_message(message: &Message) -> Self {
        Self {
            content: message.content.clone(),
            sender: message.sender.clone(),
        }
    }

    /// Renders `You have a message: {"content": ..., "sender": ...}`.
    pub fn render(&self) -> Result<String, serde_json::Error> {
        let mut buffer = NOTIFICATION_PREFIX.as_bytes().to_vec();
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, SpacedFormatter);
        self.serialize(&mut serializer)?;
        // serde_json only ever writes valid UTF-8.
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Single-line JSON with `", "` and `": "` separators.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}
