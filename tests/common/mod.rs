//! Shared test utilities and fixtures
//!
//! The OpenAI client is blocking, so tests drive it from `spawn_blocking` while the mock
//! server runs on the async runtime.

#![allow(dead_code)]

use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use waspnest_providers::openai::OpenAIClient;
use waspnest_types::ApiKey;

pub const TEST_API_KEY: &str = "sk-test";
pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Start a mock server that simulates the Chat Completions API
pub async fn start_openai_mock() -> MockServer {
    MockServer::start().await
}

/// Chat Completions response whose message content is `content` serialized as JSON
pub fn completion_body(content: &Value) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1_234_567_890,
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": content.to_string(),
                "refusal": null
            },
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30}
    })
}

/// Reply with `reply` to requests asking for the response shape `shape_name`
pub async fn mount_structured_reply(server: &MockServer, shape_name: &str, reply: Value) {
    Mock::given(method("POST"))
        .and(path(CHAT_COMPLETIONS_PATH))
        .and(header("authorization", format!("Bearer {TEST_API_KEY}").as_str()))
        .and(body_partial_json(json!({
            "response_format": {"type": "json_schema", "json_schema": {"name": shape_name}}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(&reply)))
        .mount(server)
        .await;
}

/// Reply to every completion request with a raw message object
pub async fn mount_message(server: &MockServer, message: Value) {
    let body = json!({"choices": [{"index": 0, "message": message, "finish_reason": "stop"}]});
    Mock::given(method("POST"))
        .and(path(CHAT_COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Fail every completion request with `status`
pub async fn mount_error(server: &MockServer, status: u16, body: &str) {
    Mock::given(method("POST"))
        .and(path(CHAT_COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

/// Client pointed at the mock server. Build it inside `blocking`.
pub fn client_for(base_url: &str) -> OpenAIClient {
    OpenAIClient::builder(ApiKey::new(TEST_API_KEY))
        .base_url(base_url)
        .build()
        .expect("mock base URL is valid")
}

/// Run blocking client code off the async runtime
pub async fn blocking<F, T>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .expect("blocking task panicked")
}

/// Requests received by the mock server, as JSON bodies
pub async fn received_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| serde_json::from_slice(&request.body).expect("request body is JSON"))
        .collect()
}
