pub mod ai;
pub mod config;
pub mod conversation;
pub mod error;
pub mod history;
pub mod offline;
pub mod state;

// Re-export main types for convenience
pub use ai::{GeminiClient, ImageAnalyzer, TextStreamer, VisionClient};
pub use config::Config;
pub use conversation::{
    ChatEvent, Conversation, ConversationOptions, CycleOutcome, OfflineReason, SessionHandle,
};
pub use error::{AssistantError, SendError};
pub use state::{ChatMessage, ChatRole, ChatState, ImageRef, MessageId, NormalizedTurn, TurnRole};
