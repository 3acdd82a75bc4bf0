//! Reasoning-service clients.
//!
//! # Architecture
//!
//! The engine talks to the reasoning service through the [`ReasoningClient`] trait: one
//! blocking call taking a [`ReasoningRequest`] (model, role-tagged messages, response shape,
//! extra options) and returning a JSON value already conforming to the requested shape.
//!
//! Clients may additionally offer two notification channels through
//! [`ReasoningClient::observe`]: one fired with every outgoing request and one fired on request
//! failure. Offering them is optional; the default implementation declines.
//!
//! - [`openai`] - OpenAI-compatible Chat Completions client using `json_schema` structured output
//!
//! # Error Handling
//!
//! Every failure is a [`ReasoningError`]. Replies are validated against the response shape's
//! JSON Schema before they are handed back, so a shape mismatch is reported here rather than
//! surfacing later as a deserialization failure.

pub mod openai;

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

pub use waspnest_types;
use waspnest_types::{ReasoningRequest, ResponseShape};

const CONNECT_TIMEOUT_SECS: u64 = 30;

const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("model refused the request: {0}")]
    Refused(String),
    #[error("response is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("response does not match shape `{shape}`: {message}")]
    Shape { shape: String, message: String },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Notification channels a client may offer.
pub trait ClientObserver: Send + Sync {
    /// Called with the request parameters before the request is sent.
    fn on_request(&self, request: &ReasoningRequest);

    /// Called when a request fails for any reason.
    fn on_failure(&self, error: &ReasoningError);

    /// Closed observers are released by the client and receive no further notifications.
    fn is_closed(&self) -> bool {
        false
    }
}

/// A structured-completion provider.
pub trait ReasoningClient: Send + Sync {
    /// Perform one blocking completion, returning a value shaped like `request.response_shape`.
    fn complete(&self, request: &ReasoningRequest) -> Result<Value, ReasoningError>;

    /// Subscribe to the client's notification channels. Returns `false` when the client does
    /// not offer them.
    fn observe(&self, observer: Arc<dyn ClientObserver>) -> bool {
        let _ = observer;
        false
    }
}

impl<C: ReasoningClient + ?Sized> ReasoningClient for Arc<C> {
    fn complete(&self, request: &ReasoningRequest) -> Result<Value, ReasoningError> {
        (**self).complete(request)
    }

    fn observe(&self, observer: Arc<dyn ClientObserver>) -> bool {
        (**self).observe(observer)
    }
}

/// Check a reply against the shape's JSON Schema.
pub fn validate_shape(shape: &ResponseShape, value: &Value) -> Result<(), ReasoningError> {
    let validator = jsonschema::validator_for(&shape.schema).map_err(|e| ReasoningError::Shape {
        shape: shape.name.clone(),
        message: format!("invalid schema: {e}"),
    })?;
    validator
        .validate(value)
        .map_err(|e| ReasoningError::Shape {
            shape: shape.name.clone(),
            message: e.to_string(),
        })
}

pub fn http_client_with_timeout(
    timeout: Duration,
    https_only: bool,
) -> Result<reqwest::blocking::Client, reqwest::Error> {
    reqwest::blocking::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .https_only(https_only)
        .build()
}

/// Read an error body, truncating it so a misbehaving server cannot flood logs.
pub fn read_capped_error_body(response: reqwest::blocking::Response) -> String {
    let mut body = Vec::new();
    let mut limited = response.take(MAX_ERROR_BODY_BYTES as u64 + 1);
    if let Err(e) = limited.read_to_end(&mut body) {
        tracing::debug!(%e, "Failed to read error body");
    }
    if body.len() > MAX_ERROR_BODY_BYTES {
        body.truncate(MAX_ERROR_BODY_BYTES);
        let text = String::from_utf8_lossy(&body);
        return format!("{text}...(truncated)");
    }
    String::from_utf8_lossy(&body).into_owned()
}
