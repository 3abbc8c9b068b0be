//! Wire payloads for the chat server's `/api/send` and `/api/history`.

use serde::{Deserialize, Serialize};

use crate::core::message::Message;

/// Body of `POST /api/send`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SendRequest<'a> {
    pub text: &'a str,
}

/// Error body returned with a non-success status.
/// The Go server says `error`, the others say `message`.
#[derive(Deserialize, Debug)]
pub struct ErrorBody {
    #[serde(alias = "error")]
    pub message: String,
}

/// Body of `GET /api/history`. A missing or `null` history is an empty one.
#[derive(Deserialize, Debug, Default)]
pub struct HistoryResponse {
    #[serde(default)]
    pub history: Option<Vec<Message>>,
}

impl HistoryResponse {
    pub fn into_messages(self) -> Vec<Message> {
        self.history.unwrap_or_default()
    }
}
