//! The reasoning handle passed to capabilities.
//!
//! A capability never holds a reference to the orchestrator running it. Instead every
//! [`Capability::transform`](crate::Capability::transform) call receives a [`Reasoning`] handle
//! borrowing the orchestrator's client and model for the duration of the call. Outside an
//! orchestrator a [`Reasoning::detached`] handle stands in and every ask fails with
//! [`AttachmentError`].

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use waspnest_providers::{ReasoningClient, ReasoningError};
use waspnest_types::{ModelId, ReasoningRequest, RequestOptions, ResponseShape, StructuredResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("capability must be attached to an orchestrator before asking the reasoning service")]
pub struct AttachmentError;

#[derive(Debug, Error)]
pub enum AskError {
    #[error(transparent)]
    NotAttached(#[from] AttachmentError),
    #[error(transparent)]
    Reasoning(#[from] ReasoningError),
}

#[derive(Clone, Copy)]
pub struct Reasoning<'a> {
    attachment: Option<(&'a dyn ReasoningClient, &'a ModelId)>,
}

impl fmt::Debug for Reasoning<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reasoning")
            .field("model", &self.model())
            .finish_non_exhaustive()
    }
}

impl<'a> Reasoning<'a> {
    #[must_use]
    pub const fn detached() -> Self {
        Self { attachment: None }
    }

    #[must_use]
    pub fn attached(client: &'a dyn ReasoningClient, model: &'a ModelId) -> Self {
        Self {
            attachment: Some((client, model)),
        }
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attachment.is_some()
    }

    #[must_use]
    pub fn model(&self) -> Option<&'a ModelId> {
        self.attachment.map(|(_, model)| model)
    }

    /// Ask for a structured reply of type `R`.
    pub fn ask<R: StructuredResponse>(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<R, AskError> {
        self.ask_with(prompt, system_prompt, RequestOptions::new())
    }

    /// Like [`Reasoning::ask`], forwarding extra request parameters to the client.
    pub fn ask_with<R: StructuredResponse>(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        options: RequestOptions,
    ) -> Result<R, AskError> {
        let value = self.ask_shape(prompt, &R::response_shape(), system_prompt, options)?;
        serde_json::from_value(value).map_err(|e| AskError::Reasoning(ReasoningError::Decode(e)))
    }

    /// Ask for a reply conforming to an explicit shape, returned as raw JSON.
    pub fn ask_shape(
        &self,
        prompt: &str,
        shape: &ResponseShape,
        system_prompt: Option<&str>,
        options: RequestOptions,
    ) -> Result<Value, AskError> {
        let (client, model) = self.attachment.ok_or(AttachmentError)?;
        let request =
            ReasoningRequest::new(model.clone(), prompt, system_prompt, shape.clone(), options);
        tracing::debug!(model = %model, shape = %shape.name, "Asking reasoning service");
        Ok(client.complete(&request)?)
    }
}
