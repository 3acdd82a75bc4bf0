//! The step loop.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use serde_json::Value;

use waspnest_providers::{ClientObserver, ReasoningClient, ReasoningError};
use waspnest_types::{ContextMap, Contract, ModelId, ReasoningRequest, State};

use crate::capability::{Capability, CapabilityError, checked_transform};
use crate::events::{Event, EventBus, panic_message};
use crate::reasoning::Reasoning;

pub const DEFAULT_STEP_LIMIT: usize = 10;

/// Context keys written by the orchestrator.
pub mod keys {
    pub const EXECUTION_STARTED_AT: &str = "execution_started_at";
    pub const STEP_LIMIT: &str = "step_limit";
    pub const CURRENT_STEP: &str = "current_step";
    pub const CURRENT_CAPABILITY: &str = "current_capability";
    pub const STEP_STARTED_AT: &str = "step_started_at";
    pub const LAST_CAPABILITY: &str = "last_capability";
    pub const LAST_STEP: &str = "last_step";
    pub const STEP_COMPLETED_AT: &str = "step_completed_at";
    pub const ERROR: &str = "error";
    pub const ERROR_CAPABILITY: &str = "error_capability";
    pub const ERROR_STEP: &str = "error_step";
    pub const EXECUTION_COMPLETED_AT: &str = "execution_completed_at";
    pub const TOTAL_STEPS: &str = "total_steps";
}

/// Per-run settings.
#[derive(Debug, Clone)]
pub struct RunOptions {
    step_limit: usize,
    context: ContextMap,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            step_limit: DEFAULT_STEP_LIMIT,
            context: ContextMap::new(),
        }
    }
}

impl RunOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn step_limit(mut self, step_limit: usize) -> Self {
        self.step_limit = step_limit;
        self
    }

    /// Extra context merged into the initial state before the run starts.
    #[must_use]
    pub fn context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_context_map(mut self, context: ContextMap) -> Self {
        self.context.extend(context);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Termination {
    /// No capability made progress.
    Completed,
    StepLimitReached,
}

impl Termination {
    const fn as_str(self) -> &'static str {
        match self {
            Termination::Completed => "completed",
            Termination::StepLimitReached => "step_limit_reached",
        }
    }
}

struct Registered {
    capability: Arc<dyn Capability>,
    contract: Option<Contract>,
}

pub struct OrchestratorBuilder {
    capabilities: Vec<Arc<dyn Capability>>,
    client: Arc<dyn ReasoningClient>,
    model: ModelId,
}

impl OrchestratorBuilder {
    #[must_use]
    pub fn capability<C: Capability + 'static>(mut self, capability: C) -> Self {
        self.capabilities.push(Arc::new(capability));
        self
    }

    /// Register a capability that may also be registered elsewhere.
    #[must_use]
    pub fn shared(mut self, capability: Arc<dyn Capability>) -> Self {
        self.capabilities.push(capability);
        self
    }

    #[must_use]
    pub fn capabilities<I>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Capability>>,
    {
        self.capabilities.extend(capabilities);
        self
    }

    #[must_use]
    pub fn model(mut self, model: ModelId) -> Self {
        self.model = model;
        self
    }

    /// Resolve contracts and subscribe to the client's notification channels.
    #[must_use]
    pub fn build(self) -> Orchestrator {
        let events = Arc::new(EventBus::new());

        let bridge = EventBridge {
            events: Arc::downgrade(&events),
        };
        if !self.client.observe(Arc::new(bridge)) {
            tracing::debug!("Reasoning client offers no notification channels");
        }

        let capabilities = self
            .capabilities
            .into_iter()
            .map(|capability| {
                let contract = capability.contract();
                tracing::debug!(
                    capability = capability.name(),
                    typed = contract.is_some(),
                    "Registered capability"
                );
                Registered {
                    capability,
                    contract,
                }
            })
            .collect();

        Orchestrator {
            capabilities,
            client: self.client,
            model: self.model,
            events,
        }
    }
}

/// Drives a [`State`] through an ordered list of capabilities.
///
/// Each step scans the capabilities in registration order and gives the state to the first one
/// whose [`Capability::can_handle`] accepts it. A capability that fails does not end the step:
/// the failure is recorded in the context and the scan continues. The run ends when a step
/// makes no progress or the step limit is reached.
pub struct Orchestrator {
    capabilities: Vec<Registered>,
    client: Arc<dyn ReasoningClient>,
    model: ModelId,
    events: Arc<EventBus>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.capabilities().map(|c| c.name()).collect();
        f.debug_struct("Orchestrator")
            .field("capabilities", &names)
            .field("model", &self.model)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    #[must_use]
    pub fn builder(client: Arc<dyn ReasoningClient>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            capabilities: Vec::new(),
            client,
            model: ModelId::default(),
        }
    }

    #[must_use]
    pub fn new<I>(capabilities: I, client: Arc<dyn ReasoningClient>) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Capability>>,
    {
        Self::builder(client).capabilities(capabilities).build()
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    #[must_use]
    pub fn model(&self) -> &ModelId {
        &self.model
    }

    pub fn capabilities(&self) -> impl Iterator<Item = &dyn Capability> {
        self.capabilities.iter().map(|r| r.capability.as_ref())
    }

    /// Contract resolved at registration for the first capability called `name`.
    #[must_use]
    pub fn contract_of(&self, name: &str) -> Option<&Contract> {
        self.capabilities
            .iter()
            .find(|r| r.capability.name() == name)
            .and_then(|r| r.contract.as_ref())
    }

    /// Handle bound to this orchestrator's client and model.
    #[must_use]
    pub fn reasoning(&self) -> Reasoning<'_> {
        Reasoning::attached(self.client.as_ref(), &self.model)
    }

    pub fn run(&self, initial: &State) -> State {
        self.run_with(initial, RunOptions::default())
    }

    /// Run until no capability applies or `options.step_limit` steps have completed.
    ///
    /// Never fails: capability failures are recorded in the returned state's context under
    /// [`keys::ERROR`], [`keys::ERROR_CAPABILITY`] and [`keys::ERROR_STEP`].
    pub fn run_with(&self, initial: &State, options: RunOptions) -> State {
        let RunOptions {
            step_limit,
            context,
        } = options;
        let span = tracing::info_span!("run", step_limit, termination = tracing::field::Empty);
        let _guard = span.enter();

        let mut current = initial.with_context(context).with_context([
            (keys::EXECUTION_STARTED_AT, Value::from(timestamp())),
            (keys::STEP_LIMIT, Value::from(step_limit)),
        ]);

        tracing::info!(capabilities = self.capabilities.len(), "Run started");
        self.events.trigger(&Event::BeforeRun { state: initial });

        let reasoning = self.reasoning();
        let mut steps = 0;
        let termination = loop {
            if steps >= step_limit {
                break Termination::StepLimitReached;
            }
            let (next, advanced) = self.step(current, steps, &reasoning);
            current = next;
            if !advanced {
                break Termination::Completed;
            }
            steps += 1;
        };

        let finished = current.with_context([
            (keys::EXECUTION_COMPLETED_AT, Value::from(timestamp())),
            (keys::TOTAL_STEPS, Value::from(steps)),
        ]);
        span.record("termination", termination.as_str());
        tracing::info!(total_steps = steps, "Run finished: {}", termination.as_str());

        self.events.trigger(&Event::AfterRun { state: &finished });
        finished
    }

    /// Offer `current` to each capability in order. Returns the new state and whether a
    /// capability completed.
    fn step(&self, mut current: State, step: usize, reasoning: &Reasoning<'_>) -> (State, bool) {
        for registered in &self.capabilities {
            let capability = registered.capability.as_ref();
            if !capability.can_handle(&current) {
                continue;
            }
            let name = capability.name();

            current = current.with_context([
                (keys::CURRENT_STEP, Value::from(step)),
                (keys::CURRENT_CAPABILITY, Value::from(name)),
                (keys::STEP_STARTED_AT, Value::from(timestamp())),
            ]);
            tracing::debug!(step, capability = name, "Step started");
            self.events.trigger(&Event::BeforeStep {
                capability,
                state: &current,
            });

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                checked_transform(capability, registered.contract.as_ref(), &current, reasoning)
            }))
            .unwrap_or_else(|payload| {
                Err(CapabilityError::Panicked {
                    message: panic_message(payload.as_ref()),
                })
            });

            match outcome {
                Ok(next) => {
                    let next = next.with_context([
                        (keys::LAST_CAPABILITY, Value::from(name)),
                        (keys::LAST_STEP, Value::from(step)),
                        (keys::STEP_COMPLETED_AT, Value::from(timestamp())),
                    ]);
                    tracing::debug!(
                        step,
                        capability = name,
                        payload = %next.payload_type(),
                        "Step completed"
                    );
                    self.events.trigger(&Event::AfterStep {
                        capability,
                        state: &next,
                    });
                    return (next, true);
                }
                Err(error) => {
                    tracing::warn!("Capability {name} failed at step {step}: {error}");
                    current = current.with_context([
                        (keys::ERROR, Value::from(error.to_string())),
                        (keys::ERROR_CAPABILITY, Value::from(name)),
                        (keys::ERROR_STEP, Value::from(step)),
                    ]);
                    self.events.trigger(&Event::Error {
                        error: &error,
                        capability: Some(capability),
                        state: Some(&current),
                        hook: None,
                    });
                }
            }
        }
        (current, false)
    }
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Forwards client notifications onto an orchestrator's event bus.
struct EventBridge {
    events: Weak<EventBus>,
}

impl ClientObserver for EventBridge {
    fn on_request(&self, request: &ReasoningRequest) {
        if let Some(events) = self.events.upgrade() {
            events.trigger(&Event::ReasoningRequest { request });
        }
    }

    fn on_failure(&self, error: &ReasoningError) {
        if let Some(events) = self.events.upgrade() {
            events.trigger(&Event::Error {
                error,
                capability: None,
                state: None,
                hook: None,
            });
        }
    }

    fn is_closed(&self) -> bool {
        self.events.strong_count() == 0
    }
}
