//! Chat-completion client tests against a mock API.

use std::time::Duration;

use chatgate_core::UserId;
use chatgate_service::llm::ResponderError;
use chatgate_service::{ChatCompletionClient, Responder};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> ChatCompletionClient {
    ChatCompletionClient::new(
        server.uri(),
        "sk-test",
        "deepseek-chat",
        "Be kind.",
        Duration::from_secs(5),
    )
    .expect("Failed to create client")
}

#[tokio::test]
async fn reply_sends_system_prompt_and_trims_answer() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "deepseek-chat",
            "messages": [
                { "role": "system", "content": "Be kind." },
                { "role": "user", "content": "hello" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "  Hi there!\n" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let answer = client(&server).reply(UserId::new(42), "hello").await.unwrap();

    assert_eq!(answer, "Hi there!");
}

#[tokio::test]
async fn empty_choices_are_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let err = client(&server).reply(UserId::new(42), "hello").await.unwrap_err();

    assert!(matches!(err, ResponderError::Empty));
}

#[tokio::test]
async fn api_failure_keeps_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(402).set_body_string("Insufficient Balance"))
        .mount(&server)
        .await;

    let err = client(&server).reply(UserId::new(42), "hello").await.unwrap_err();

    match err {
        ResponderError::Api { status, message } => {
            assert_eq!(status, 402);
            assert_eq!(message, "Insufficient Balance");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
