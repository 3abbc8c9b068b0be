//! # View Events
//!
//! Everything the controller tells the consuming view. The view renders from
//! these; it never touches the message log directly.
//!
//! ```text
//! StateChanged(Sending) → UserMessage → StateChanged(Streaming)
//!   → Reply("Hel") → Reply("Hello") → ReplyFinished
//!   → StateChanged(Reconciling) → HistoryLoaded(n) → StateChanged(Idle)
//! ```
//!
//! A lagging view may miss `Reply` snapshots. Every other event arrives, in order.

use crate::core::controller::TurnState;
use crate::core::error::ChatError;
use crate::core::message::Message;

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    StateChanged(TurnState),
    /// The optimistic user message was appended.
    UserMessage(Message),
    /// The reply so far. Later snapshots supersede earlier ones.
    Reply(String),
    /// The stream ended and the reply was finalized locally.
    ReplyFinished(Message),
    /// The log was replaced by server history of this many messages.
    HistoryLoaded(usize),
    Failed(ChatError),
}
