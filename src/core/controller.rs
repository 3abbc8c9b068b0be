//! # Chat Session Controller
//!
//! Owns the message log and drives one chat turn at a time.
//!
//! ```text
//!          begin_turn            stream content type
//!   Idle ─────────────► Sending ─────────────────► Streaming
//!    ▲                     │                           │ end of stream
//!    │   error / plain body│                           ▼
//!    └─────────────────────┴──────────────────── Reconciling
//! ```
//!
//! Any failure surfaces a `ChatEvent::Failed` and lands back in `Idle`.
//! The optimistic user message is never retracted.
//!
//! The decoder, accumulator and state all live on the controller, not in
//! the turn's stack frame, so a turn can suspend at any chunk read and
//! resume where it left off. Turns take `&mut self`, and the `Idle` guard
//! rejects a second `begin_turn` before the first turn is driven.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::api::{ChatBackend, ChunkStream, SendRequest, SendResponse};
use crate::core::error::ChatError;
use crate::core::event::ChatEvent;
use crate::core::message::{Message, MessageLog};
use crate::stream::{DeltaAccumulator, StreamDecoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Sending,
    Streaming,
    Reconciling,
}

pub struct ChatSessionController {
    backend: Arc<dyn ChatBackend>,
    session_id: String,
    log: MessageLog,
    state: TurnState,
    draft: String,
    /// Text of a begun turn waiting for `drive_turn`.
    pending: Option<String>,
    decoder: StreamDecoder,
    accumulator: DeltaAccumulator,
    events: Option<mpsc::Sender<ChatEvent>>,
    /// Events that found the channel full, delivered in order at the next
    /// suspension point.
    backlog: VecDeque<ChatEvent>,
    cancel: CancellationToken,
}

/// Returns the controller to `Idle` if a turn future is dropped mid-flight.
struct TurnGuard<'a> {
    controller: &'a mut ChatSessionController,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        if self.controller.state != TurnState::Idle {
            warn!(
                "Turn abandoned while {:?}; discarding partial reply",
                self.controller.state
            );
            self.controller.end_turn();
        }
    }
}

/// Outcome of one suspending chunk read.
enum Read {
    Chunk(bytes::Bytes),
    Failed(String),
    End,
    Cancelled,
    ViewClosed,
}

impl ChatSessionController {
    pub fn new(backend: Arc<dyn ChatBackend>, session_id: impl Into<String>) -> Self {
        Self {
            backend,
            session_id: session_id.into(),
            log: MessageLog::new(),
            state: TurnState::Idle,
            draft: String::new(),
            pending: None,
            decoder: StreamDecoder::new(),
            accumulator: DeltaAccumulator::new(),
            events: None,
            backlog: VecDeque::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Surfaces live events to a view. Dropping the receiver cancels a streaming turn.
    pub fn with_events(mut self, events: mpsc::Sender<ChatEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn messages(&self) -> &MessageLog {
        &self.log
    }

    /// The in-flight reply, empty outside `Streaming`.
    pub fn reply(&self) -> &str {
        self.accumulator.snapshot()
    }

    /// Bytes of an incomplete frame held by the decoder.
    pub fn buffered_bytes(&self) -> usize {
        self.decoder.buffered()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Token that cancels the current or next streaming turn.
    ///
    /// A cancelled turn gets a fresh token, so fetch it again afterwards.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Never blocks. Events that find the channel full wait in the backlog
    /// and are never dropped while the view is alive.
    fn emit(&mut self, event: ChatEvent) {
        let Some(events) = &self.events else {
            return;
        };
        if !self.backlog.is_empty() {
            self.backlog.push_back(event);
            return;
        }
        match events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                debug!("View lagging, queued {:?}", event);
                self.backlog.push_back(event);
            }
            Err(TrySendError::Closed(_)) => debug!("View gone, event dropped"),
        }
    }

    /// Offers the current reply snapshot. A lagging view skips it; the next
    /// snapshot supersedes it.
    fn emit_reply(&self) {
        let Some(events) = &self.events else {
            return;
        };
        if !self.backlog.is_empty() {
            return;
        }
        match events.try_reserve() {
            Ok(permit) => permit.send(ChatEvent::Reply(self.accumulator.snapshot().to_string())),
            Err(TrySendError::Full(())) => debug!("View lagging, skipped reply snapshot"),
            Err(TrySendError::Closed(())) => {}
        }
    }

    /// Waits until the view has taken every queued event, or is gone.
    async fn flush_events(&mut self) {
        let Some(events) = self.events.clone() else {
            return;
        };
        while let Some(event) = self.backlog.pop_front() {
            if events.send(event).await.is_err() {
                debug!("View gone, dropping {} queued events", self.backlog.len() + 1);
                self.backlog.clear();
            }
        }
    }

    fn set_state(&mut self, state: TurnState) {
        debug!("Turn state {:?} -> {:?}", self.state, state);
        self.state = state;
        self.emit(ChatEvent::StateChanged(state));
    }

    fn report(&mut self, err: ChatError) -> ChatError {
        warn!("Chat error: {}", err);
        self.emit(ChatEvent::Failed(err.clone()));
        err
    }

    /// Drops per-turn state and returns to `Idle`. The log is untouched.
    fn end_turn(&mut self) {
        self.pending = None;
        self.decoder.reset();
        self.accumulator.reset();
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        if self.state != TurnState::Idle {
            self.set_state(TurnState::Idle);
        }
    }

    fn fail(&mut self, err: ChatError) -> ChatError {
        let err = self.report(err);
        self.end_turn();
        err
    }

    // ========================================================================
    // History
    // ========================================================================

    /// Replaces the log with the server's history. Only allowed while idle.
    pub async fn load_history(&mut self) -> Result<usize, ChatError> {
        if self.state != TurnState::Idle {
            let err = self.report(ChatError::GuardViolation(self.state));
            self.flush_events().await;
            return Err(err);
        }
        let backend = Arc::clone(&self.backend);
        let result = match backend.history(&self.session_id).await {
            Ok(history) => {
                let count = history.len();
                self.log.replace_with(history);
                info!("Loaded {} messages for session {}", count, self.session_id);
                self.emit(ChatEvent::HistoryLoaded(count));
                Ok(count)
            }
            Err(e) => Err(self.report(ChatError::History(e.to_string()))),
        };
        self.flush_events().await;
        result
    }

    // ========================================================================
    // Turns
    // ========================================================================

    /// Sends the draft.
    pub async fn submit(&mut self) -> Result<Option<Message>, ChatError> {
        let text = self.draft.clone();
        self.send(&text).await
    }

    /// Runs a whole turn. Returns the locally finalized reply when the server
    /// streamed one.
    pub async fn send(&mut self, text: &str) -> Result<Option<Message>, ChatError> {
        self.begin_turn(text)?;
        self.drive_turn().await
    }

    /// Starts a turn without suspending: appends the optimistic user message,
    /// clears the draft and moves to `Sending`.
    pub fn begin_turn(&mut self, text: &str) -> Result<(), ChatError> {
        if self.state != TurnState::Idle {
            return Err(self.report(ChatError::GuardViolation(self.state)));
        }
        if text.trim().is_empty() {
            return Err(ChatError::EmptyInput);
        }

        self.set_state(TurnState::Sending);
        let message = Message::user(&self.session_id, text.to_string());
        self.log.push(message.clone());
        self.draft.clear();
        self.pending = Some(text.to_string());
        self.emit(ChatEvent::UserMessage(message));
        Ok(())
    }

    /// Performs the network part of a begun turn.
    pub async fn drive_turn(&mut self) -> Result<Option<Message>, ChatError> {
        let text = match (self.state, self.pending.take()) {
            (TurnState::Sending, Some(text)) => text,
            (state, _) => {
                let err = self.report(ChatError::GuardViolation(state));
                self.flush_events().await;
                return Err(err);
            }
        };

        let mut turn = TurnGuard { controller: self };
        let result = turn.controller.run_turn(text).await;
        turn.controller.flush_events().await;
        drop(turn);
        result
    }

    async fn run_turn(&mut self, text: String) -> Result<Option<Message>, ChatError> {
        let backend = Arc::clone(&self.backend);
        info!("Turn started via {}: {} bytes", backend.name(), text.len());

        let response = match backend.send(SendRequest { text: &text }).await {
            Ok(response) => response,
            Err(e) => return Err(self.fail(ChatError::from_send(e))),
        };

        match response {
            SendResponse::Stream(chunks) => {
                let reply = self.stream_reply(chunks).await?;
                self.log.push(reply.clone());
                self.reconcile().await?;
                Ok(Some(reply))
            }
            SendResponse::Body(body) => {
                debug!("Plain send body ({} bytes), nothing to decode", body.len());
                self.reconcile().await?;
                Ok(None)
            }
        }
    }

    /// Reads chunks until the stream ends and returns the finalized reply.
    async fn stream_reply(&mut self, mut chunks: ChunkStream) -> Result<Message, ChatError> {
        self.decoder.reset();
        self.accumulator.reset();
        self.set_state(TurnState::Streaming);

        let cancel = self.cancel.clone();
        let view = self.events.clone();
        let view_closed = async move {
            match view {
                Some(events) => events.closed().await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(view_closed);

        let mut chunk_count = 0usize;
        loop {
            self.flush_events().await;

            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => Read::Cancelled,
                _ = &mut view_closed => Read::ViewClosed,
                next = chunks.next() => match next {
                    Some(Ok(chunk)) => Read::Chunk(chunk),
                    Some(Err(e)) => Read::Failed(e.to_string()),
                    None => Read::End,
                },
            };

            match read {
                Read::Chunk(chunk) => {
                    chunk_count += 1;
                    let deltas = self.decoder.feed(&chunk);
                    if !deltas.is_empty() {
                        for delta in &deltas {
                            self.accumulator.apply(delta);
                        }
                        self.emit_reply();
                    }
                }
                Read::End => break,
                Read::Failed(e) => return Err(self.fail(ChatError::Transport(e))),
                Read::Cancelled => {
                    info!("Turn cancelled after {} chunks", chunk_count);
                    return Err(self.fail(ChatError::Cancelled));
                }
                Read::ViewClosed => {
                    info!("View closed after {} chunks, cancelling turn", chunk_count);
                    return Err(self.fail(ChatError::Cancelled));
                }
            }
        }
        drop(chunks);

        self.decoder.flush();
        let dropped = self.decoder.dropped_frames();
        let reply = self.accumulator.finalize(&self.session_id);
        info!(
            "Stream complete: {} chunks, {} reply bytes, {} frames dropped",
            chunk_count,
            reply.text.len(),
            dropped
        );
        self.emit(ChatEvent::ReplyFinished(reply.clone()));
        Ok(reply)
    }

    /// Swaps the local view for the server's history. On failure the local
    /// view stays as a degraded fallback.
    async fn reconcile(&mut self) -> Result<(), ChatError> {
        self.set_state(TurnState::Reconciling);
        let backend = Arc::clone(&self.backend);
        match backend.history(&self.session_id).await {
            Ok(history) => {
                let count = history.len();
                self.log.replace_with(history);
                self.emit(ChatEvent::HistoryLoaded(count));
                self.end_turn();
                Ok(())
            }
            Err(e) => Err(self.fail(ChatError::Reconciliation(e.to_string()))),
        }
    }
}
