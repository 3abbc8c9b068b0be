use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Who wrote a message. Wire names follow the chat servers (`human` / `ai`).
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
pub enum Sender {
    #[serde(rename = "human", alias = "user")]
    User,
    #[serde(rename = "ai", alias = "assistant", alias = "bot")]
    Assistant,
}

impl Sender {
    pub fn label(self) -> &'static str {
        match self {
            Sender::User => "You",
            Sender::Assistant => "Bot",
        }
    }
}

/// One chat message. Immutable once it is in a `MessageLog`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    /// Server-assigned on history records; a local UUID on optimistic ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "sessionID", alias = "sessionId", default)]
    pub session_id: String,
    pub sender: Sender,
    pub text: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn local(session_id: &str, sender: Sender, text: String) -> Self {
        Self {
            id: Some(uuid::Uuid::new_v4().to_string()),
            session_id: session_id.to_string(),
            sender,
            text,
            timestamp: Utc::now(),
        }
    }

    pub fn user(session_id: &str, text: String) -> Self {
        Self::local(session_id, Sender::User, text)
    }

    pub fn assistant(session_id: &str, text: String) -> Self {
        Self::local(session_id, Sender::Assistant, text)
    }
}

/// Accepts RFC 3339 with any offset, or a naive ISO-8601 value taken as UTC
/// (Python's `datetime.utcnow().isoformat()` has no offset).
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid timestamp {raw:?}: {e}"))
}

/// The session's ordered message log.
///
/// Messages are only ever appended. The one bulk operation, `replace_with`,
/// swaps in the server's authoritative history.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    pub fn replace_with(&mut self, history: Vec<Message>) {
        self.messages = history;
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }
}

impl<'a> IntoIterator for &'a MessageLog {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}
