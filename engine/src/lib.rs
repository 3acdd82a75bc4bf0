//! Capability orchestration engine for waspnest.
//!
//! A run threads an immutable [`State`] through an ordered set of [`Capability`]s. Each
//! capability declares the payload type it accepts and the types it may produce; the
//! [`Orchestrator`] picks the first capability that accepts the current payload, enforces its
//! contract, records step bookkeeping in the state's context, and repeats until nothing applies
//! or the step limit is hit.
//!
//! Capabilities reach the reasoning service through the [`Reasoning`] handle they are given on
//! every call. Lifecycle subscribers registered on [`Orchestrator::events`] observe runs, steps,
//! failures and outgoing reasoning requests.

mod capability;
mod events;
mod orchestrator;
mod reasoning;

pub use capability::{Capability, CapabilityError, CapabilityExt, Named};
pub use events::{Event, EventBus, HookId, Lifecycle, SubscriberError};
pub use orchestrator::{
    DEFAULT_STEP_LIMIT, Orchestrator, OrchestratorBuilder, RunOptions, keys,
};
pub use reasoning::{AskError, AttachmentError, Reasoning};

pub use waspnest_providers::{self, ClientObserver, ReasoningClient, ReasoningError};
pub use waspnest_types::{self, ContextMap, Contract, ContractViolation, ModelId, State};
