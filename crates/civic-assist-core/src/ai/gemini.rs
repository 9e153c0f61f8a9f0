use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Serialize;

use super::{ChunkStream, TextStreamer};
use crate::error::AssistantError;
use crate::state::{NormalizedTurn, TurnRole};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

pub const SYSTEM_INSTRUCTION: &str = "You are the helpdesk assistant of a civic issue \
reporting portal. Answer questions about waste segregation, public toilets, e-waste, \
composting, the plastic ban, water supply and how to report civic issues. Keep answers \
short, practical and friendly. If a question is unrelated to civic services, politely \
steer the conversation back to them.";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Instruction<'a>,
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Instruction<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: TurnRole,
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

fn build_request(turns: &[NormalizedTurn]) -> GenerateRequest<'_> {
    GenerateRequest {
        system_instruction: Instruction {
            parts: vec![TextPart {
                text: SYSTEM_INSTRUCTION,
            }],
        },
        contents: turns
            .iter()
            .map(|turn| Content {
                role: turn.role,
                parts: vec![TextPart { text: &turn.text }],
            })
            .collect(),
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        )
    }
}

#[async_trait]
impl TextStreamer for GeminiClient {
    async fn open_stream(&self, turns: &[NormalizedTurn]) -> Result<ChunkStream, AssistantError> {
        if self.api_key.trim().is_empty() {
            return Err(AssistantError::MissingCredential);
        }
        if turns.is_empty() {
            return Err(AssistantError::EmptyHistory);
        }

        let request = build_request(turns);
        let response = self
            .client
            .post(self.stream_url())
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::Status { status, body });
        }

        tracing::debug!("Streaming {} turns from {}", turns.len(), self.model);
        let stream = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| AssistantError::StreamInterrupted(e.to_string()))
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let turns = vec![
            NormalizedTurn {
                role: TurnRole::User,
                text: "hi".into(),
            },
            NormalizedTurn {
                role: TurnRole::Model,
                text: "Vanakkam".into(),
            },
            NormalizedTurn {
                role: TurnRole::User,
                text: "where is the bin?".into(),
            },
        ];
        let value = serde_json::to_value(build_request(&turns)).unwrap();
        assert_eq!(
            value["systemInstruction"]["parts"][0]["text"],
            json!(SYSTEM_INSTRUCTION)
        );
        assert_eq!(
            value["contents"],
            json!([
                { "role": "user", "parts": [{ "text": "hi" }] },
                { "role": "model", "parts": [{ "text": "Vanakkam" }] },
                { "role": "user", "parts": [{ "text": "where is the bin?" }] },
            ])
        );
    }

    #[test]
    fn test_stream_url() {
        let client = GeminiClient::new("k")
            .with_model("gemini-2.0-flash")
            .with_base_url("http://localhost:9000/");
        assert_eq!(
            client.stream_url(),
            "http://localhost:9000/v1beta/models/gemini-2.0-flash:streamGenerateContent?alt=sse"
        );
    }

    #[tokio::test]
    async fn test_blank_key_rejected_locally() {
        let client = GeminiClient::new("  ").with_base_url("http://127.0.0.1:9");
        let turns = vec![NormalizedTurn {
            role: TurnRole::User,
            text: "hi".into(),
        }];
        let err = client.open_stream(&turns).await.err().unwrap();
        assert!(matches!(err, AssistantError::MissingCredential));
        assert!(err.is_local());
    }

    #[tokio::test]
    async fn test_empty_turns_rejected_locally() {
        let client = GeminiClient::new("k").with_base_url("http://127.0.0.1:9");
        let err = client.open_stream(&[]).await.err().unwrap();
        assert!(matches!(err, AssistantError::EmptyHistory));
    }
}
