//! Conversation controller
//!
//! Owns the message log and runs one send cycle at a time:
//!
//! ```text
//! Idle -> Sending -> Streaming | OfflineAnswering | ImageAnswering -> Idle
//! ```
//!
//! Every failure before the first streamed byte is answered by the offline
//! responder, so each completed cycle adds exactly one assistant message.

use futures_util::StreamExt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

use crate::ai::sse::FrameDecoder;
use crate::ai::vision::{self, ANALYSIS_UNAVAILABLE};
use crate::ai::{ChunkStream, GeminiClient, ImageAnalyzer, TextStreamer, VisionClient};
use crate::config::Config;
use crate::error::{AssistantError, SendError};
use crate::history;
use crate::offline::{self, topic_buttons, WELCOME_TEXT};
use crate::state::{ChatMessage, ChatRole, ChatState, ImageRef, MessageId};

/// Tunables for a conversation
#[derive(Debug, Clone)]
pub struct ConversationOptions {
    /// Longest wait for the connection to open, and between two body
    /// chunks once it has.
    pub stream_idle_timeout: Duration,
}

impl Default for ConversationOptions {
    fn default() -> Self {
        Self {
            stream_idle_timeout: Duration::from_secs(60),
        }
    }
}

/// Incremental updates for the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    StateChanged(ChatState),
    MessageAppended(MessageId),
    MessageDelta { id: MessageId, text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineReason {
    /// No API key configured
    NoCredential,
    /// Nothing in the history could be sent
    EmptyHistory,
    /// Connect failure, error status or timeout before streaming began
    Unavailable,
}

/// How a send cycle was answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Streamed reply; `complete` is false when the stream broke off or
    /// stalled and the partial text was kept.
    Streamed {
        id: MessageId,
        deltas: usize,
        complete: bool,
    },
    Offline {
        id: MessageId,
        reason: OfflineReason,
    },
    Image {
        id: MessageId,
        analysed: bool,
    },
    /// The session was closed while the cycle was running
    Abandoned,
}

/// Cloneable handle the UI keeps to tear the session down.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    liveness: Arc<watch::Sender<bool>>,
}

impl SessionHandle {
    pub fn close(&self) {
        self.liveness.send_replace(false);
    }

    pub fn is_open(&self) -> bool {
        *self.liveness.borrow()
    }

    /// Resolves once `close` has been called from any clone.
    pub async fn closed(&self) {
        closed(self.liveness.subscribe()).await
    }
}

pub struct Conversation {
    messages: Vec<ChatMessage>,
    images: Vec<Vec<u8>>,
    pending_image: Option<Vec<u8>>,
    state: ChatState,
    streamer: Option<Arc<dyn TextStreamer>>,
    analyzer: Arc<dyn ImageAnalyzer>,
    options: ConversationOptions,
    liveness: Arc<watch::Sender<bool>>,
    events: Option<mpsc::UnboundedSender<ChatEvent>>,
}

impl Conversation {
    /// Start a conversation seeded with the welcome message. Without a
    /// `streamer` every text question is answered offline.
    pub fn new(
        streamer: Option<Arc<dyn TextStreamer>>,
        analyzer: Arc<dyn ImageAnalyzer>,
        options: ConversationOptions,
    ) -> Self {
        let (liveness, _) = watch::channel(true);
        Self {
            messages: vec![ChatMessage::assistant(WELCOME_TEXT).with_buttons(topic_buttons())],
            images: Vec::new(),
            pending_image: None,
            state: ChatState::Idle,
            streamer,
            analyzer,
            options,
            liveness: Arc::new(liveness),
            events: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let streamer = config.api_key().map(|key| {
            Arc::new(
                GeminiClient::new(key)
                    .with_model(config.model())
                    .with_base_url(config.api_base_url()),
            ) as Arc<dyn TextStreamer>
        });
        if streamer.is_none() {
            tracing::info!("No API key configured; answers will come from the offline responder");
        }
        let analyzer = Arc::new(VisionClient::new(config.analysis_endpoint()));
        let options = ConversationOptions {
            stream_idle_timeout: config.stream_idle_timeout(),
        };
        Self::new(streamer, analyzer, options)
    }

    /// Receive UI events. A later call replaces the earlier subscriber.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ChatEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    pub fn session_handle(&self) -> SessionHandle {
        SessionHandle {
            liveness: Arc::clone(&self.liveness),
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn message(&self, id: MessageId) -> Option<&ChatMessage> {
        self.messages.get(id.0)
    }

    pub fn image(&self, image: ImageRef) -> Option<&[u8]> {
        self.images.get(image.0).map(Vec::as_slice)
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == ChatState::Idle
    }

    pub fn is_streaming(&self) -> bool {
        self.state == ChatState::Streaming
    }

    pub fn is_open(&self) -> bool {
        *self.liveness.borrow()
    }

    /// Hold an image for the next send.
    pub fn attach_image(&mut self, image: Vec<u8>) {
        self.pending_image = Some(image);
    }

    pub fn clear_image(&mut self) {
        self.pending_image = None;
    }

    pub fn has_pending_image(&self) -> bool {
        self.pending_image.is_some()
    }

    /// Submit a suggestion button as if its label had been typed.
    pub async fn send_suggestion(&mut self, label: &str) -> Result<CycleOutcome, SendError> {
        self.send(label).await
    }

    /// Run one send cycle with `text` and any attached image. Dropping the
    /// returned future ends the cycle early and leaves the conversation idle.
    pub async fn send(&mut self, text: &str) -> Result<CycleOutcome, SendError> {
        if !self.is_open() {
            return Err(SendError::Closed);
        }
        if self.state != ChatState::Idle {
            return Err(SendError::Busy);
        }
        let text = text.trim();
        if text.is_empty() && self.pending_image.is_none() {
            return Err(SendError::EmptyInput);
        }

        self.set_state(ChatState::Sending);
        let mut cycle = Cycle(self);
        let outcome = match cycle.pending_image.take() {
            Some(image) => cycle.answer_image(text, image).await,
            None => match cycle.push_message(ChatMessage::user(text)) {
                Some(_) => cycle.answer_text(text).await,
                None => CycleOutcome::Abandoned,
            },
        };
        Ok(outcome)
    }

    async fn answer_image(&mut self, text: &str, image: Vec<u8>) -> CycleOutcome {
        let image_ref = ImageRef(self.images.len());
        self.images.push(image);
        let mut message = ChatMessage::user(text);
        message.image = Some(image_ref);
        if self.push_message(message).is_none() {
            return CycleOutcome::Abandoned;
        }
        self.set_state(ChatState::ImageAnswering);

        let analyzer = Arc::clone(&self.analyzer);
        let idle = self.options.stream_idle_timeout;
        let bytes = &self.images[image_ref.0];
        let (reply, analysed) =
            match timeout(idle, vision::describe_image(analyzer.as_ref(), bytes)).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!("Image analysis failed: {}", AssistantError::IdleTimeout(idle));
                    (ANALYSIS_UNAVAILABLE.to_string(), false)
                }
            };

        match self.push_message(ChatMessage::assistant(reply)) {
            Some(id) => CycleOutcome::Image { id, analysed },
            None => CycleOutcome::Abandoned,
        }
    }

    async fn answer_text(&mut self, text: &str) -> CycleOutcome {
        let Some(streamer) = self.streamer.clone() else {
            tracing::debug!("No API key configured; answering offline");
            return self.answer_offline(text, OfflineReason::NoCredential);
        };

        let turns = history::normalize(&self.messages);
        if turns.is_empty() {
            tracing::debug!("No user turn to send; answering offline");
            return self.answer_offline(text, OfflineReason::EmptyHistory);
        }

        let idle = self.options.stream_idle_timeout;
        let opened = tokio::select! {
            _ = closed(self.liveness.subscribe()) => return CycleOutcome::Abandoned,
            opened = timeout(idle, streamer.open_stream(&turns)) => {
                opened.unwrap_or(Err(AssistantError::IdleTimeout(idle)))
            }
        };

        match opened {
            Ok(stream) => self.stream_reply(stream).await,
            Err(e) => {
                if e.is_local() {
                    tracing::debug!("Answering offline: {}", e);
                } else {
                    tracing::warn!("Generative endpoint unavailable, answering offline: {}", e);
                }
                self.answer_offline(text, OfflineReason::Unavailable)
            }
        }
    }

    fn answer_offline(&mut self, text: &str, reason: OfflineReason) -> CycleOutcome {
        self.set_state(ChatState::OfflineAnswering);
        let reply = offline::respond(text);
        let mut message = ChatMessage::assistant(reply.text);
        message.buttons = reply.buttons;
        match self.push_message(message) {
            Some(id) => CycleOutcome::Offline { id, reason },
            None => CycleOutcome::Abandoned,
        }
    }

    async fn stream_reply(&mut self, mut stream: ChunkStream) -> CycleOutcome {
        self.set_state(ChatState::Streaming);
        let Some(id) = self.push_message(ChatMessage::assistant("")) else {
            return CycleOutcome::Abandoned;
        };

        let idle = self.options.stream_idle_timeout;
        let mut decoder = FrameDecoder::new();
        let mut deltas = 0;
        let mut complete = true;

        loop {
            let next = tokio::select! {
                _ = closed(self.liveness.subscribe()) => return CycleOutcome::Abandoned,
                next = timeout(idle, stream.next()) => {
                    next.unwrap_or(Some(Err(AssistantError::IdleTimeout(idle))))
                }
            };

            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                None => break,
                Some(Err(e)) => {
                    tracing::warn!("Stream ended early, keeping partial reply: {}", e);
                    complete = false;
                    break;
                }
            };

            for delta in decoder.push(&chunk) {
                if !self.append_to(id, &delta.text) {
                    return CycleOutcome::Abandoned;
                }
                deltas += 1;
            }
            if decoder.is_done() {
                break;
            }
        }

        decoder.finish();
        if deltas == 0 {
            tracing::debug!("Stream finished without any text");
        }
        CycleOutcome::Streamed {
            id,
            deltas,
            complete,
        }
    }

    fn emit(&self, event: ChatEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn set_state(&mut self, state: ChatState) {
        if !self.is_open() {
            return;
        }
        self.state = state;
        self.emit(ChatEvent::StateChanged(state));
    }

    fn push_message(&mut self, message: ChatMessage) -> Option<MessageId> {
        if !self.is_open() {
            return None;
        }
        let id = MessageId(self.messages.len());
        self.messages.push(message);
        self.emit(ChatEvent::MessageAppended(id));
        Some(id)
    }

    /// Grow the in-progress reply. Only the last message, while streaming,
    /// and only an assistant one.
    fn append_to(&mut self, id: MessageId, text: &str) -> bool {
        if !self.is_open() || self.state != ChatState::Streaming {
            return false;
        }
        if id.0 + 1 != self.messages.len() {
            return false;
        }
        let message = &mut self.messages[id.0];
        if message.role != ChatRole::Assistant {
            return false;
        }
        message.content.push_str(text);
        self.emit(ChatEvent::MessageDelta {
            id,
            text: text.to_string(),
        });
        true
    }
}

/// One running send cycle. Puts the conversation back to `Idle` when it
/// ends, including when the caller drops the `send` future part way
/// through; a partial reply stays as it was.
struct Cycle<'a>(&'a mut Conversation);

impl Deref for Cycle<'_> {
    type Target = Conversation;

    fn deref(&self) -> &Conversation {
        &*self.0
    }
}

impl DerefMut for Cycle<'_> {
    fn deref_mut(&mut self) -> &mut Conversation {
        &mut *self.0
    }
}

impl Drop for Cycle<'_> {
    fn drop(&mut self) {
        if self.0.state != ChatState::Idle {
            self.0.set_state(ChatState::Idle);
        }
    }
}

/// Resolves once the session has been closed.
async fn closed(mut liveness: watch::Receiver<bool>) {
    let _ = liveness.wait_for(|open| !*open).await;
}
