//! # Delta Accumulator
//!
//! Folds deltas into the in-flight assistant reply. One accumulator lives for
//! the whole session and is reset at the start of every turn.

use crate::core::message::Message;
use crate::stream::decoder::DeltaPayload;

#[derive(Debug, Default)]
pub struct DeltaAccumulator {
    reply: String,
}

impl DeltaAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `delta` and returns the reply so far.
    pub fn apply(&mut self, delta: &DeltaPayload) -> &str {
        self.reply.push_str(&delta.text);
        &self.reply
    }

    pub fn snapshot(&self) -> &str {
        &self.reply
    }

    pub fn len(&self) -> usize {
        self.reply.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reply.is_empty()
    }

    /// Wraps the reply as an assistant message and clears the accumulator.
    ///
    /// An empty reply still yields a message, so "nothing was delivered"
    /// shows up in the log instead of vanishing.
    pub fn finalize(&mut self, session_id: &str) -> Message {
        Message::assistant(session_id, std::mem::take(&mut self.reply))
    }

    pub fn reset(&mut self) {
        self.reply.clear();
    }
}
