use crate::llm::{GeminiClient, GeminiConfig, LanguageModel, LlmError};
use mockito::Matcher;
use serde_json::json;

const ENDPOINT: &str = "/v1beta/models/gemini-test:generateContent";

fn client_for(api_base: String) -> GeminiClient {
    GeminiClient::new(GeminiConfig {
        api_key: "test-key".to_string(),
        model: "gemini-test".to_string(),
        api_base,
    })
}

#[tokio::test]
async fn test_gemini_complete_success() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", ENDPOINT)
        .match_header("x-goog-api-key", "test-key")
        .match_body(Matcher::PartialJson(json!({
            "contents": [{ "role": "user", "parts": [{ "text": "Say hello" }] }],
            "generationConfig": { "temperature": 0.0 }
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "candidates": [{
                    "content": { "role": "model", "parts": [{ "text": "Hello" }, { "text": ", world" }] }
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = client_for(server.url());
    let text = client.complete("Say hello").await.expect("completion");

    assert_eq!(text, "Hello, world");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_gemini_trailing_slash_in_base_url() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", ENDPOINT)
        .with_status(200)
        .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"ok"}]}}]}"#)
        .create_async()
        .await;

    let client = client_for(format!("{}/", server.url()));
    assert_eq!(client.complete("ping").await.expect("completion"), "ok");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_gemini_overloaded_is_unavailable() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("POST", ENDPOINT)
        .with_status(503)
        .with_body("The model is overloaded")
        .create_async()
        .await;

    let err = client_for(server.url()).complete("question").await.unwrap_err();

    match &err {
        LlmError::Api { status, body } => {
            assert_eq!(*status, 503);
            assert_eq!(body, "The model is overloaded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn test_gemini_client_error_is_not_retryable() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("POST", ENDPOINT)
        .with_status(400)
        .with_body(r#"{"error":{"message":"API key not valid"}}"#)
        .create_async()
        .await;

    let err = client_for(server.url()).complete("question").await.unwrap_err();

    assert!(matches!(err, LlmError::Api { status: 400, .. }));
    assert!(!err.is_unavailable());
}

#[tokio::test]
async fn test_gemini_empty_candidates() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("POST", ENDPOINT)
        .with_status(200)
        .with_body(r#"{"candidates":[]}"#)
        .create_async()
        .await;

    let err = client_for(server.url()).complete("question").await.unwrap_err();
    assert!(matches!(err, LlmError::EmptyResponse));
}

#[tokio::test]
async fn test_gemini_malformed_body() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("POST", ENDPOINT)
        .with_status(200)
        .with_body("<html>not json</html>")
        .create_async()
        .await;

    let err = client_for(server.url()).complete("question").await.unwrap_err();
    assert!(matches!(err, LlmError::Decode(_)));
    assert!(!err.is_unavailable());
}

#[tokio::test]
async fn test_gemini_unreachable_host_is_unavailable() {
    // nothing listens on the discard port
    let err = client_for("http://127.0.0.1:9".to_string())
        .complete("question")
        .await
        .unwrap_err();

    assert!(matches!(err, LlmError::Request(_)));
    assert!(err.is_unavailable());
}
