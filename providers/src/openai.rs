//! OpenAI-compatible Chat Completions client with `json_schema` structured output.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde_json::{Value, json};
use url::Url;

use crate::{
    ClientObserver, ReasoningClient, ReasoningError, http_client_with_timeout,
    read_capped_error_body, validate_shape,
};
use waspnest_types::{ApiKey, ReasoningRequest, ResponseShape};

/// Canonical OpenAI API origin.
pub const OPENAI_API_BASE_URL: &str = "https://api.openai.com";

const CHAT_COMPLETIONS_PATH: &str = "v1/chat/completions";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum OpenAIClientError {
    #[error("invalid base URL '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Builder for [`OpenAIClient`].
///
/// ```rust
/// use std::time::Duration;
/// use waspnest_providers::openai::OpenAIClient;
/// use waspnest_types::ApiKey;
///
/// let client = OpenAIClient::builder(ApiKey::new("sk-test"))
///     .timeout(Duration::from_secs(30))
///     .build()
///     .unwrap();
/// assert_eq!(client.endpoint().as_str(), "https://api.openai.com/v1/chat/completions");
/// ```
#[derive(Debug)]
pub struct OpenAIClientBuilder {
    api_key: ApiKey,
    base_url: String,
    timeout: Duration,
}

impl OpenAIClientBuilder {
    /// Origin of the API (scheme, host, optional port). Defaults to [`OPENAI_API_BASE_URL`].
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<OpenAIClient, OpenAIClientError> {
        let base = Url::parse(&self.base_url).map_err(|source| {
            OpenAIClientError::InvalidBaseUrl {
                url: self.base_url.clone(),
                source,
            }
        })?;
        let endpoint =
            base.join(CHAT_COMPLETIONS_PATH)
                .map_err(|source| OpenAIClientError::InvalidBaseUrl {
                    url: self.base_url.clone(),
                    source,
                })?;
        let https_only = endpoint.scheme() == "https";
        let http = http_client_with_timeout(self.timeout, https_only)?;
        Ok(OpenAIClient {
            http,
            endpoint,
            api_key: self.api_key,
            observers: RwLock::new(Vec::new()),
        })
    }
}

/// Blocking structured-output client.
pub struct OpenAIClient {
    http: reqwest::blocking::Client,
    endpoint: Url,
    api_key: ApiKey,
    observers: RwLock<Vec<Arc<dyn ClientObserver>>>,
}

impl std::fmt::Debug for OpenAIClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}

impl OpenAIClient {
    #[must_use]
    pub fn builder(api_key: ApiKey) -> OpenAIClientBuilder {
        OpenAIClientBuilder {
            api_key,
            base_url: OPENAI_API_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Live observers. Closed ones are dropped on the way.
    fn observers(&self) -> Vec<Arc<dyn ClientObserver>> {
        let mut observers = self
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        observers.retain(|observer| !observer.is_closed());
        observers.clone()
    }

    fn send(&self, request: &ReasoningRequest) -> Result<Value, ReasoningError> {
        let body = build_request_body(request);
        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(self.api_key.as_str())
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReasoningError::Api {
                status: status.as_u16(),
                body: read_capped_error_body(response),
            });
        }

        let payload: Value = response.json()?;
        extract_structured(&payload, &request.response_shape)
    }
}

impl ReasoningClient for OpenAIClient {
    fn complete(&self, request: &ReasoningRequest) -> Result<Value, ReasoningError> {
        let observers = self.observers();
        for observer in &observers {
            observer.on_request(request);
        }

        tracing::debug!(
            model = %request.model,
            shape = %request.response_shape.name,
            "Sending structured completion request"
        );
        let result = self.send(request);

        if let Err(e) = &result {
            tracing::warn!(error = %e, model = %request.model, "Structured completion failed");
            for observer in &observers {
                observer.on_failure(e);
            }
        }
        result
    }

    fn observe(&self, observer: Arc<dyn ClientObserver>) -> bool {
        let mut observers = self
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        observers.retain(|existing| !existing.is_closed());
        observers.push(observer);
        true
    }
}

/// Build the Chat Completions request body. Extra options are merged at the top level and may
/// not override the model, messages or response format.
pub(crate) fn build_request_body(request: &ReasoningRequest) -> Value {
    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|m| json!({"role": m.role, "content": m.content}))
        .collect();

    let mut body = serde_json::Map::new();
    for (key, value) in &request.options {
        body.insert(key.clone(), value.clone());
    }
    body.insert("model".to_string(), json!(request.model.as_str()));
    body.insert("messages".to_string(), Value::Array(messages));
    body.insert(
        "response_format".to_string(),
        json!({
            "type": "json_schema",
            "json_schema": {
                "name": request.response_shape.name,
                "schema": request.response_shape.schema,
                "strict": true,
            }
        }),
    );
    Value::Object(body)
}

/// Pull the structured reply out of a Chat Completions response.
pub(crate) fn extract_structured(
    payload: &Value,
    shape: &ResponseShape,
) -> Result<Value, ReasoningError> {
    let message = payload
        .pointer("/choices/0/message")
        .ok_or_else(|| ReasoningError::Malformed("missing choices[0].message".to_string()))?;

    if let Some(refusal) = message.get("refusal").and_then(Value::as_str) {
        return Err(ReasoningError::Refused(refusal.to_string()));
    }

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .ok_or_else(|| ReasoningError::Malformed("message has no text content".to_string()))?;

    let value: Value = serde_json::from_str(content)?;
    validate_shape(shape, &value)?;
    Ok(value)
}
