use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

use super::types::SendRequest;
use crate::core::message::Message;

/// Errors from the send and history calls.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Connection refused, reset, DNS, or a body read that broke off.
    #[error("network error: {0}")]
    Network(String),
    /// The server answered with a non-success status.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    /// The server's body was not what we expected.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Lazy, single-pass sequence of raw body chunks. Dropping it releases the connection.
pub type ChunkStream = BoxStream<'static, Result<Bytes, BackendError>>;

/// Successful answer to a send.
pub enum SendResponse {
    /// `text/event-stream`: the reply arrives as frames.
    Stream(ChunkStream),
    /// Any other body. Nothing to decode.
    Body(String),
}

impl std::fmt::Debug for SendResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendResponse::Stream(_) => f.write_str("Stream(..)"),
            SendResponse::Body(body) => f.debug_tuple("Body").field(body).finish(),
        }
    }
}

/// The chat server as seen by the controller.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Returns the name of the backend.
    fn name(&self) -> &str;

    /// Posts a user message. Non-success statuses come back as `BackendError::Api`.
    async fn send(&self, request: SendRequest<'_>) -> Result<SendResponse, BackendError>;

    /// Fetches the authoritative message history of a session.
    async fn history(&self, session_id: &str) -> Result<Vec<Message>, BackendError>;
}
