//! Example pipelines end to end against a mock reasoning service.

use std::sync::{Arc, Mutex};

use serde_json::json;

use waspnest::pipeline::{DetailedResponse, Pipeline, Query, Response, SimpleResponse};
use waspnest::{hooks, report};
use waspnest_engine::{Event, Lifecycle, RunOptions, keys};
use waspnest_types::{ModelId, State};

use crate::common::{blocking, client_for, mount_error, mount_structured_reply, start_openai_mock};

#[tokio::test(flavor = "multi_thread")]
async fn standard_pipeline_analyzes_then_responds() {
    let server = start_openai_mock().await;
    mount_structured_reply(
        &server,
        "Analysis",
        json!({
            "intent": "password_reset",
            "query": "How do I reset my password in Mac?",
            "confidence": 0.92
        }),
    )
    .await;
    mount_structured_reply(
        &server,
        "Response",
        json!({"message": "Use Recovery Mode to reset it.", "confidence": 0.85}),
    )
    .await;

    let uri = server.uri();
    let finished = blocking(move || {
        let orchestrator =
            Pipeline::Standard.build(Arc::new(client_for(&uri)), ModelId::default());
        hooks::install(orchestrator.events());
        let initial = State::new(Query::new("How do I reset my password in Mac?"))
            .with_context([("user_id", json!("123"))]);
        orchestrator.run(&initial)
    })
    .await;

    let response = finished.payload_ref::<Response>().unwrap();
    assert_eq!(response.message, "Use Recovery Mode to reset it.");
    assert_eq!(finished.context()[keys::TOTAL_STEPS], json!(2));
    assert_eq!(finished.context()[keys::LAST_CAPABILITY], json!("ResponseGenerator"));
    assert_eq!(finished.context()["user_id"], json!("123"));

    let rendered = report(&finished).unwrap();
    assert_eq!(rendered["payload_type"], "Response");
    assert_eq!(rendered["payload"]["confidence"], json!(0.85));
}

#[tokio::test(flavor = "multi_thread")]
async fn smart_pipeline_answers_in_one_step() {
    let server = start_openai_mock().await;
    mount_structured_reply(
        &server,
        "SimpleResponse",
        json!({"answer": "It is 3pm.", "confidence": 0.6}),
    )
    .await;
    mount_structured_reply(
        &server,
        "DetailedResponse",
        json!({
            "answer": "They use qubits.",
            "explanation": "Superposition lets them explore many states.",
            "confidence": 0.8,
            "references": ["Nielsen & Chuang", "Shor 1994"]
        }),
    )
    .await;

    let uri = server.uri();
    let (simple, detailed) = blocking(move || {
        let orchestrator = Pipeline::Smart.build(Arc::new(client_for(&uri)), ModelId::default());
        let simple = orchestrator.run(&State::new(Query::new("What time is it in New York?")));
        let detailed = orchestrator.run(&State::new(Query::new(
            "Can you explain how quantum computers work and their impact on cryptography?",
        )));
        (simple, detailed)
    })
    .await;

    assert_eq!(simple.payload_ref::<SimpleResponse>().unwrap().answer, "It is 3pm.");
    assert_eq!(simple.context()[keys::TOTAL_STEPS], json!(1));

    let detailed = detailed.payload_ref::<DetailedResponse>().unwrap();
    assert_eq!(detailed.references.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn service_failure_is_recorded_and_reported_to_hooks() {
    let server = start_openai_mock().await;
    mount_error(&server, 503, "overloaded").await;

    let uri = server.uri();
    let (finished, errors, requests) = blocking(move || {
        let orchestrator = Pipeline::Standard.build(Arc::new(client_for(&uri)), ModelId::default());
        let errors = Arc::new(Mutex::new(Vec::new()));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&errors);
        orchestrator.events().on(Lifecycle::Error, move |event| {
            let name = event.capability().map(|c| c.name().to_string());
            sink.lock().unwrap().push(name);
            Ok(())
        });
        let counter = Arc::clone(&requests);
        orchestrator
            .events()
            .on(Lifecycle::ReasoningRequest, move |event| {
                if let Event::ReasoningRequest { request } = event {
                    counter
                        .lock()
                        .unwrap()
                        .push(request.response_shape.name.clone());
                }
                Ok(())
            });

        let finished = orchestrator.run_with(
            &State::new(Query::new("hello")),
            RunOptions::new().context("session_id", "abc"),
        );
        let errors = errors.lock().unwrap().clone();
        let requests = requests.lock().unwrap().clone();
        (finished, errors, requests)
    })
    .await;

    assert!(finished.payload_ref::<Query>().is_some());
    assert_eq!(finished.context()[keys::TOTAL_STEPS], json!(0));
    assert_eq!(finished.context()[keys::ERROR_CAPABILITY], json!("QueryAnalyzer"));
    assert!(
        finished.context()[keys::ERROR]
            .as_str()
            .unwrap()
            .contains("503"),
        "{}",
        finished.context()[keys::ERROR]
    );
    assert_eq!(finished.context()["session_id"], json!("abc"));
    // Once from the client channel, once from the failed step.
    assert_eq!(errors, vec![None, Some("QueryAnalyzer".to_string())]);
    assert_eq!(requests, vec!["Analysis".to_string()]);
}
