//! Configuration files driving a real client.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use waspnest::pipeline::{Pipeline, Query, SimpleResponse};
use waspnest_config::WaspnestConfig;
use waspnest_engine::{RunOptions, keys};
use waspnest_providers::openai::OpenAIClient;
use waspnest_types::State;

use crate::common::{TEST_API_KEY, blocking, mount_structured_reply, start_openai_mock};

#[tokio::test(flavor = "multi_thread")]
async fn config_file_selects_endpoint_model_and_limit() {
    let server = start_openai_mock().await;
    mount_structured_reply(
        &server,
        "SimpleResponse",
        json!({"answer": "Hello!", "confidence": 0.9}),
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        format!(
            r#"
[app]
model = "gpt-4o"
step_limit = 3

[api_keys]
openai = "{TEST_API_KEY}"

[openai]
base_url = "{}"
timeout_seconds = 5
"#,
            server.uri()
        ),
    )
    .unwrap();

    let config = WaspnestConfig::load_from(&path).unwrap().unwrap();
    assert_eq!(config.model().as_str(), "gpt-4o");
    assert_eq!(config.step_limit(), Some(3));
    assert_eq!(config.openai_timeout(), Some(Duration::from_secs(5)));

    let finished = blocking(move || {
        let mut builder = OpenAIClient::builder(config.openai_api_key().unwrap());
        if let Some(base_url) = config.openai_base_url() {
            builder = builder.base_url(base_url);
        }
        if let Some(timeout) = config.openai_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().unwrap();
        let orchestrator = Pipeline::Smart.build(Arc::new(client), config.model());
        orchestrator.run_with(
            &State::new(Query::new("hi")),
            RunOptions::new().step_limit(config.step_limit().unwrap()),
        )
    })
    .await;

    assert_eq!(finished.payload_ref::<SimpleResponse>().unwrap().answer, "Hello!");
    assert_eq!(finished.context()[keys::STEP_LIMIT], json!(3));

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["model"], "gpt-4o");
}
