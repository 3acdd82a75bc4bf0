//! Logging subscribers for every lifecycle point.

use waspnest_engine::{Event, EventBus, HookId, Lifecycle, keys};

/// Register one `tracing` subscriber per lifecycle point.
pub fn install(events: &EventBus) -> Vec<HookId> {
    Lifecycle::ALL
        .iter()
        .map(|point| events.on(*point, log_event))
        .collect()
}

#[allow(clippy::unnecessary_wraps)]
fn log_event(event: &Event<'_>) -> anyhow::Result<()> {
    match event {
        Event::BeforeRun { state } => {
            tracing::info!(
                payload = %state.payload_type(),
                context = ?state.context(),
                "Starting run"
            );
        }
        Event::BeforeStep { capability, state } => {
            let step = state
                .context()
                .get(keys::CURRENT_STEP)
                .map_or_else(|| "initial".to_string(), ToString::to_string);
            tracing::info!(capability = capability.name(), %step, "Starting capability");
        }
        Event::AfterStep { capability, state } => {
            tracing::info!(
                capability = capability.name(),
                produced = %state.payload_type(),
                "Completed capability"
            );
        }
        Event::Error {
            error,
            capability,
            state,
            hook,
        } => {
            let capability = capability.map_or("-", |c| c.name());
            match hook {
                Some(hook) => tracing::warn!(%hook, "Subscriber failed: {error}"),
                None => tracing::warn!(
                    capability,
                    context = ?state.map(|s| s.context()),
                    "Error: {error}"
                ),
            }
        }
        Event::ReasoningRequest { request } => {
            tracing::debug!(
                model = %request.model,
                shape = %request.response_shape.name,
                system = request.system_prompt().unwrap_or("-"),
                user = request.user_prompt().unwrap_or("-"),
                "Reasoning request"
            );
        }
        Event::AfterRun { state } => {
            let total_steps = state
                .context()
                .get(keys::TOTAL_STEPS)
                .and_then(serde_json::Value::as_u64)
                .unwrap_or_default();
            tracing::info!(total_steps, produced = %state.payload_type(), "Finished run");
        }
    }
    Ok(())
}
