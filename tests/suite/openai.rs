//! Chat Completions client against a mock server.

use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use waspnest_providers::{ClientObserver, ReasoningClient, ReasoningError};
use waspnest_types::{ModelId, ReasoningRequest, RequestOptions, ResponseShape};

use crate::common::{
    blocking, client_for, mount_error, mount_message, mount_structured_reply, received_bodies,
    start_openai_mock,
};

fn verdict_shape() -> ResponseShape {
    ResponseShape::new(
        "Verdict",
        json!({
            "type": "object",
            "properties": {
                "label": {"type": "string"},
                "score": {"type": "number"}
            },
            "required": ["label", "score"],
            "additionalProperties": false
        }),
    )
}

fn verdict_request() -> ReasoningRequest {
    let mut options = RequestOptions::new();
    options.insert("temperature".to_string(), json!(0.0));
    ReasoningRequest::new(
        ModelId::default(),
        "Is this spam?",
        Some("Classify the message."),
        verdict_shape(),
        options,
    )
}

#[derive(Default)]
struct Recorder {
    requests: Mutex<Vec<String>>,
    failures: Mutex<Vec<String>>,
}

impl ClientObserver for Recorder {
    fn on_request(&self, request: &ReasoningRequest) {
        self.requests
            .lock()
            .unwrap()
            .push(request.response_shape.name.clone());
    }

    fn on_failure(&self, error: &ReasoningError) {
        self.failures.lock().unwrap().push(error.to_string());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn structured_reply_is_returned_and_request_is_well_formed() {
    let server = start_openai_mock().await;
    mount_structured_reply(&server, "Verdict", json!({"label": "spam", "score": 0.97})).await;

    let uri = server.uri();
    let reply = blocking(move || client_for(&uri).complete(&verdict_request())).await;

    assert_eq!(reply.unwrap(), json!({"label": "spam", "score": 0.97}));

    let bodies = received_bodies(&server).await;
    assert_eq!(bodies.len(), 1);
    let body = &bodies[0];
    assert_eq!(body["model"], "gpt-4o-mini");
    assert_eq!(body["temperature"], json!(0.0));
    assert_eq!(body["messages"][0], json!({"role": "system", "content": "Classify the message."}));
    assert_eq!(body["messages"][1], json!({"role": "user", "content": "Is this spam?"}));
    assert_eq!(body["response_format"]["json_schema"]["strict"], true);
    assert_eq!(
        body["response_format"]["json_schema"]["schema"],
        verdict_shape().schema
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn api_error_carries_status_and_body() {
    let server = start_openai_mock().await;
    mount_error(&server, 429, r#"{"error":{"message":"Rate limit exceeded"}}"#).await;

    let uri = server.uri();
    let err = blocking(move || client_for(&uri).complete(&verdict_request()))
        .await
        .unwrap_err();

    match err {
        ReasoningError::Api { status, body } => {
            assert_eq!(status, 429);
            assert!(body.contains("Rate limit exceeded"), "{body}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn refusal_is_reported() {
    let server = start_openai_mock().await;
    mount_message(
        &server,
        json!({"role": "assistant", "content": null, "refusal": "I can't help with that."}),
    )
    .await;

    let uri = server.uri();
    let err = blocking(move || client_for(&uri).complete(&verdict_request()))
        .await
        .unwrap_err();

    assert!(
        matches!(err, ReasoningError::Refused(ref reason) if reason == "I can't help with that."),
        "{err}"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn reply_not_matching_shape_is_rejected() {
    let server = start_openai_mock().await;
    mount_structured_reply(&server, "Verdict", json!({"label": "spam"})).await;

    let uri = server.uri();
    let err = blocking(move || client_for(&uri).complete(&verdict_request()))
        .await
        .unwrap_err();

    assert!(
        matches!(err, ReasoningError::Shape { ref shape, .. } if shape == "Verdict"),
        "{err}"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn observers_see_requests_and_failures() {
    let server = start_openai_mock().await;
    mount_error(&server, 500, "upstream exploded").await;
    let recorder = Arc::new(Recorder::default());

    let uri = server.uri();
    let observer = Arc::clone(&recorder);
    let result: Result<Value, ReasoningError> = blocking(move || {
        let client = client_for(&uri);
        assert!(client.observe(observer));
        client.complete(&verdict_request())
    })
    .await;

    assert!(result.is_err());
    assert_eq!(*recorder.requests.lock().unwrap(), vec!["Verdict".to_string()]);
    let failures = recorder.failures.lock().unwrap();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("500"), "{}", failures[0]);
}
