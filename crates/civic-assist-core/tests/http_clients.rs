use civic_assist_core::ai::sse::FrameDecoder;
use civic_assist_core::ai::vision::compose_reply;
use civic_assist_core::{
    AssistantError, ChatRole, Config, Conversation, CycleOutcome, GeminiClient, ImageAnalyzer,
    NormalizedTurn, OfflineReason, TextStreamer, TurnRole, VisionClient,
};
use futures_util::StreamExt;
use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STREAM_PATH: &str = "/v1beta/models/gemini-1.5-flash:streamGenerateContent";

fn sse_frame(text: &str) -> String {
    let body = json!({
        "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
    });
    format!("data: {}\r\n\r\n", body)
}

fn sse_response(frames: &[String]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(frames.concat(), "text/event-stream")
}

fn user_turn(text: &str) -> Vec<NormalizedTurn> {
    vec![NormalizedTurn {
        role: TurnRole::User,
        text: text.to_string(),
    }]
}

#[tokio::test]
async fn test_gemini_stream_decodes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .and(query_param("alt", "sse"))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "contents": [{ "role": "user", "parts": [{ "text": "hi" }] }]
        })))
        .respond_with(sse_response(&[sse_frame("Hello "), sse_frame("there")]))
        .expect(1)
        .mount(&server)
        .await;

    let client = GeminiClient::new("test-key").with_base_url(&server.uri());
    let mut stream = client.open_stream(&user_turn("hi")).await.unwrap();

    let mut decoder = FrameDecoder::new();
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        for delta in decoder.push(&chunk.unwrap()) {
            text.push_str(&delta.text);
        }
    }
    assert_eq!(text, "Hello there");
}

#[tokio::test]
async fn test_gemini_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(
            ResponseTemplate::new(429).set_body_string(r#"{"error":{"message":"quota"}}"#),
        )
        .mount(&server)
        .await;

    let client = GeminiClient::new("test-key").with_base_url(&server.uri());
    let err = client.open_stream(&user_turn("hi")).await.err().unwrap();
    match err {
        AssistantError::Status { status, body } => {
            assert_eq!(status.as_u16(), 429);
            assert!(body.contains("quota"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_gemini_connection_refused() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let client = GeminiClient::new("test-key").with_base_url(&uri);
    let err = client.open_stream(&user_turn("hi")).await.err().unwrap();
    assert!(matches!(err, AssistantError::Transport(_)));
}

#[tokio::test]
async fn test_vision_client_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze"))
        .and(body_json(json!({ "image": "AQID" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "summary": "Garbage dumped by the road.",
            "wasteDetected": ["plastic bag"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = VisionClient::new(&format!("{}/analyze", server.uri()));
    let analysis = client.analyze(&[1, 2, 3]).await.unwrap();
    assert_eq!(
        compose_reply(&analysis),
        "Here's what I found in your image:\n\nGarbage dumped by the road.\n\nWaste detected: plastic bag"
    );
}

#[tokio::test]
async fn test_vision_client_bad_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let client = VisionClient::new(&server.uri());
    let err = client.analyze(&[0]).await.unwrap_err();
    assert!(matches!(err, AssistantError::Decode(_)));
}

#[tokio::test]
async fn test_conversation_streams_from_config() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(sse_response(&[
            sse_frame("Green bin for "),
            sse_frame("food waste."),
            "data: [DONE]\r\n\r\n".to_string(),
            sse_frame("ignored after done"),
        ]))
        .expect(1)
        .mount(&server)
        .await;

    let config = Config {
        gemini_api_key: Some("test-key".into()),
        api_base_url: Some(server.uri()),
        stream_idle_timeout_secs: Some(5),
        ..Config::new()
    };
    let mut conversation = Conversation::from_config(&config);
    let outcome = conversation.send("where do peels go?").await.unwrap();

    assert!(matches!(outcome, CycleOutcome::Streamed { deltas: 2, .. }));
    let reply = conversation.messages().last().unwrap();
    assert_eq!(reply.role, ChatRole::Assistant);
    assert_eq!(reply.content, "Green bin for food waste.");
}

#[tokio::test]
async fn test_conversation_falls_back_on_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let config = Config {
        gemini_api_key: Some("test-key".into()),
        api_base_url: Some(server.uri()),
        ..Config::new()
    };
    let mut conversation = Conversation::from_config(&config);
    let outcome = conversation.send("Where can I find a toilet?").await.unwrap();

    assert!(matches!(
        outcome,
        CycleOutcome::Offline {
            reason: OfflineReason::Unavailable,
            ..
        }
    ));
    assert_eq!(conversation.messages().len(), 3);
    assert!(conversation.messages()[2].content.contains("toilet"));
}
