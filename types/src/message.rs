//! Request types exchanged with the reasoning service.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::model::ModelId;
use crate::record::short_type_name;

/// Extra request parameters merged into the provider request body.
pub type RequestOptions = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A role-tagged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Name and JSON Schema of the structure a reply must conform to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseShape {
    pub name: String,
    pub schema: Value,
}

impl ResponseShape {
    #[must_use]
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }

    /// A strict object schema named after `T`: every listed property is required and no
    /// other properties are allowed.
    ///
    /// ```rust
    /// use serde_json::json;
    /// use waspnest_types::ResponseShape;
    ///
    /// struct Analysis;
    ///
    /// let shape = ResponseShape::record::<Analysis>(json!({
    ///     "intent": {"type": "string"},
    ///     "confidence": {"type": "number"},
    /// }));
    /// assert_eq!(shape.name, "Analysis");
    /// assert_eq!(shape.schema["required"], json!(["confidence", "intent"]));
    /// ```
    #[must_use]
    pub fn record<T: ?Sized + 'static>(properties: Value) -> Self {
        let mut required: Vec<String> = properties
            .as_object()
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default();
        required.sort();
        Self::new(
            short_type_name(std::any::type_name::<T>()),
            json!({
                "type": "object",
                "properties": properties,
                "required": required,
                "additionalProperties": false,
            }),
        )
    }
}

/// A Rust type the reasoning service can be asked to produce.
pub trait StructuredResponse: DeserializeOwned {
    fn response_shape() -> ResponseShape;
}

/// One structured-completion call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReasoningRequest {
    pub model: ModelId,
    pub messages: Vec<ChatMessage>,
    pub response_shape: ResponseShape,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub options: RequestOptions,
}

impl ReasoningRequest {
    /// Build a request with an optional system message ahead of the user prompt.
    #[must_use]
    pub fn new(
        model: ModelId,
        prompt: &str,
        system_prompt: Option<&str>,
        response_shape: ResponseShape,
        options: RequestOptions,
    ) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(prompt));
        Self {
            model,
            messages,
            response_shape,
            options,
        }
    }

    #[must_use]
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    #[must_use]
    pub fn user_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}
