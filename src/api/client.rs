//! HTTP backend for the chat server.
//!
//! - `POST {base}/api/send` with `{"text": ...}`. A `text/event-stream`
//!   response is handed back as a chunk stream; the controller decodes it.
//! - `GET {base}/api/history?session_id=...` returning `{"history": [...]}`.

use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, info, warn};
use reqwest::header::CONTENT_TYPE;

use super::backend::{BackendError, ChatBackend, SendResponse};
use super::types::{ErrorBody, HistoryResponse, SendRequest};
use crate::core::config::ResolvedConfig;
use crate::core::message::Message;

const EVENT_STREAM: &str = "text/event-stream";

pub struct HttpBackend {
    base_url: String,
    send_path: String,
    history_path: String,
    client: reqwest::Client,
}

impl HttpBackend {
    /// Creates a backend with the default `/api/send` and `/api/history` routes.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            send_path: crate::core::config::DEFAULT_SEND_PATH.to_string(),
            history_path: crate::core::config::DEFAULT_HISTORY_PATH.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            send_path: config.send_path.clone(),
            history_path: config.history_path.clone(),
            ..Self::new(config.base_url.clone())
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Builds an `Api` error from a failed response, preferring its JSON `message`.
async fn api_error(response: reqwest::Response) -> BackendError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(err) => err.message,
        Err(_) if !body.trim().is_empty() => body,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
    };
    warn!("Chat server error: {} - {}", status.as_u16(), message);
    BackendError::Api {
        status: status.as_u16(),
        message,
    }
}

fn is_event_stream(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains(EVENT_STREAM))
}

#[async_trait]
impl ChatBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, request: SendRequest<'_>) -> Result<SendResponse, BackendError> {
        info!("Sending message: {} bytes", request.text.len());

        let response = self
            .client
            .post(self.url(&self.send_path))
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        debug!("Send response status: {}", response.status());

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        if is_event_stream(&response) {
            let chunks = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| BackendError::Network(e.to_string())));
            return Ok(SendResponse::Stream(chunks.boxed()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        debug!("Non-streaming send body: {} bytes", body.len());
        Ok(SendResponse::Body(body))
    }

    async fn history(&self, session_id: &str) -> Result<Vec<Message>, BackendError> {
        let response = self
            .client
            .get(self.url(&self.history_path))
            .query(&[("session_id", session_id)])
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        let history: HistoryResponse =
            serde_json::from_str(&body).map_err(|e| BackendError::Parse(e.to_string()))?;
        let messages = history.into_messages();
        debug!("History for session {}: {} messages", session_id, messages.len());
        Ok(messages)
    }
}
