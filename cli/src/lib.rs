//! Command-line front end for waspnest: example pipelines, logging hooks and output rendering.

pub mod hooks;
pub mod pipeline;

use anyhow::Context;
use serde_json::{Value, json};

use waspnest_types::State;

/// Render a finished state as `{payload_type, payload, context}`.
pub fn report(state: &State) -> anyhow::Result<Value> {
    let payload = state
        .payload()
        .to_value()
        .with_context(|| format!("failed to serialize {} payload", state.payload_type()))?;
    Ok(json!({
        "payload_type": state.payload_type().to_string(),
        "payload": payload,
        "context": state.context(),
    }))
}
