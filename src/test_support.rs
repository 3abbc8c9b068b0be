//! Test utilities shared across the crate.
//!
//! This module is only compiled during tests (`#[cfg(test)]`).

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;

use crate::api::{BackendError, ChatBackend, SendRequest, SendResponse};
use crate::core::message::{Message, Sender};

/// One scripted answer to `send`.
pub enum ScriptedSend {
    /// Chunks, then end of stream.
    Stream(Vec<Result<Bytes, BackendError>>),
    /// Chunks, then a read that never completes.
    Endless(Vec<Bytes>),
    Body(String),
    Fail(BackendError),
}

impl ScriptedSend {
    pub fn stream(chunks: &[&str]) -> Self {
        ScriptedSend::Stream(
            chunks
                .iter()
                .map(|c| Ok(Bytes::copy_from_slice(c.as_bytes())))
                .collect(),
        )
    }
}

/// A backend that replays scripted answers and records what it was asked.
///
/// Unscripted sends fail with a network error; unscripted history calls
/// return an empty history.
#[derive(Default)]
pub struct ScriptedBackend {
    sends: Mutex<VecDeque<ScriptedSend>>,
    histories: Mutex<VecDeque<Result<Vec<Message>, BackendError>>>,
    sent: Mutex<Vec<String>>,
    history_calls: Mutex<usize>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_send(self, send: ScriptedSend) -> Self {
        self.sends.lock().unwrap().push_back(send);
        self
    }

    pub fn with_history(self, history: Result<Vec<Message>, BackendError>) -> Self {
        self.histories.lock().unwrap().push_back(history);
        self
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn history_calls(&self) -> usize {
        *self.history_calls.lock().unwrap()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(&self, request: SendRequest<'_>) -> Result<SendResponse, BackendError> {
        self.sent.lock().unwrap().push(request.text.to_string());
        let next = self.sends.lock().unwrap().pop_front();
        match next {
            Some(ScriptedSend::Stream(chunks)) => {
                Ok(SendResponse::Stream(futures::stream::iter(chunks).boxed()))
            }
            Some(ScriptedSend::Endless(chunks)) => Ok(SendResponse::Stream(
                futures::stream::iter(chunks.into_iter().map(Ok::<Bytes, BackendError>))
                    .chain(futures::stream::pending())
                    .boxed(),
            )),
            Some(ScriptedSend::Body(body)) => Ok(SendResponse::Body(body)),
            Some(ScriptedSend::Fail(err)) => Err(err),
            None => Err(BackendError::Network("no scripted response".to_string())),
        }
    }

    async fn history(&self, _session_id: &str) -> Result<Vec<Message>, BackendError> {
        *self.history_calls.lock().unwrap() += 1;
        let next = self.histories.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// A message as the server would return it in history.
pub fn history_message(id: &str, sender: Sender, text: &str) -> Message {
    Message {
        id: Some(id.to_string()),
        session_id: "1".to_string(),
        sender,
        text: text.to_string(),
        timestamp: Utc::now(),
    }
}
