use thiserror::Error;

use crate::api::BackendError;
use crate::core::controller::TurnState;

/// Failures the controller surfaces to the consuming view.
///
/// Malformed frames never show up here: the decoder drops them and the
/// stream carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// The send call or a chunk read failed. The partial reply was discarded.
    #[error("transport error: {0}")]
    Transport(String),
    /// The server answered the send with a non-success status.
    #[error("send rejected (HTTP {status}): {message}")]
    SendRejected { status: u16, message: String },
    /// The history re-fetch after a turn failed; the local view was kept.
    #[error("reconciliation failed: {0}")]
    Reconciliation(String),
    /// The initial history load failed.
    #[error("history unavailable: {0}")]
    History(String),
    /// A turn was requested while another was in progress, or driven
    /// without being begun.
    #[error("turn request rejected while {0:?}")]
    GuardViolation(TurnState),
    #[error("message is empty")]
    EmptyInput,
    /// The view went away or the turn was cancelled mid-stream.
    #[error("turn cancelled")]
    Cancelled,
}

impl ChatError {
    /// Maps a send-call failure.
    pub(crate) fn from_send(err: BackendError) -> Self {
        match err {
            BackendError::Api { status, message } => ChatError::SendRejected { status, message },
            other => ChatError::Transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_becomes_send_rejected() {
        let err = ChatError::from_send(BackendError::Api {
            status: 500,
            message: "boom".to_string(),
        });
        assert_eq!(
            err,
            ChatError::SendRejected {
                status: 500,
                message: "boom".to_string()
            }
        );
        assert_eq!(err.to_string(), "send rejected (HTTP 500): boom");
    }

    #[test]
    fn test_network_error_becomes_transport() {
        let err = ChatError::from_send(BackendError::Network("connection refused".to_string()));
        assert_eq!(
            err,
            ChatError::Transport("network error: connection refused".to_string())
        );
    }
}
