//! UI-agnostic conversation state types
//!
//! These are shared between whatever front-end renders the chat (terminal,
//! desktop shell, web view) and carry no dependency on a UI framework.

use serde::{Deserialize, Serialize};

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatRole {
    User,
    Assistant,
}

/// Position of a message in the conversation. Messages are never removed,
/// so an id stays valid for the lifetime of the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub usize);

/// Opaque handle to an image held by the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef(pub(crate) usize);

/// A chat message in the assistant conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Suggestion labels the UI renders as tappable buttons
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buttons: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRef>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            buttons: None,
            image: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            buttons: None,
            image: None,
        }
    }

    pub fn with_buttons(mut self, buttons: Vec<String>) -> Self {
        self.buttons = Some(buttons);
        self
    }
}

/// Role of a turn as the generative-text API names it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

impl TurnRole {
    pub fn flipped(self) -> Self {
        match self {
            TurnRole::User => TurnRole::Model,
            TurnRole::Model => TurnRole::User,
        }
    }
}

impl From<ChatRole> for TurnRole {
    fn from(role: ChatRole) -> Self {
        match role {
            ChatRole::User => TurnRole::User,
            ChatRole::Assistant => TurnRole::Model,
        }
    }
}

/// One unit of history sent to the remote model. Recomputed on every send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTurn {
    pub role: TurnRole,
    pub text: String,
}

/// Where a send cycle currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatState {
    Idle,
    Sending,
    Streaming,
    OfflineAnswering,
    ImageAnswering,
}
