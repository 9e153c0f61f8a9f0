pub mod gemini;
pub mod sse;
pub mod vision;

pub use gemini::GeminiClient;
pub use vision::VisionClient;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::AssistantError;
use crate::state::NormalizedTurn;
use vision::ImageAnalysis;

/// Raw body chunks as the transport delivers them
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>, AssistantError>>;

/// A generative-text backend that answers with a chunked event stream.
#[async_trait]
pub trait TextStreamer: Send + Sync {
    /// Open the streaming call. Errors here happen before the first byte
    /// and are recoverable; errors yielded by the stream are not.
    async fn open_stream(&self, turns: &[NormalizedTurn]) -> Result<ChunkStream, AssistantError>;
}

/// A backend that classifies an uploaded image.
#[async_trait]
pub trait ImageAnalyzer: Send + Sync {
    async fn analyze(&self, image: &[u8]) -> Result<ImageAnalysis, AssistantError>;
}
