//! Error types for the assistant client
//!
//! None of these reach the person chatting. The controller absorbs every
//! `AssistantError` into an offline answer, an apology, or a partial reply,
//! and only uses the variant to pick a log level.

use std::time::Duration;

/// Failure while talking to one of the remote services
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    /// No API key configured for the generative-text endpoint
    #[error("no API key configured")]
    MissingCredential,

    /// History normalization produced nothing to send
    #[error("conversation history has no user turn to send")]
    EmptyHistory,

    /// Connect, DNS or read failure inside the HTTP client
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-success status
    #[error("service returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// A response body that should have been JSON was not
    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The body stream failed after it had started
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),

    /// No bytes arrived within the idle window
    #[error("no data received for {0:?}")]
    IdleTimeout(Duration),
}

impl AssistantError {
    /// True for decisions made locally, before any network traffic.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            AssistantError::MissingCredential | AssistantError::EmptyHistory
        )
    }
}

/// Why a submission was refused at the idle gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("a reply is still in progress")]
    Busy,

    #[error("the chat session has been closed")]
    Closed,

    #[error("nothing to send")]
    EmptyInput,
}
