//! Lifecycle event bus.
//!
//! Subscribers register against a [`Lifecycle`] point and are invoked in registration order.
//! A subscriber that returns an error or panics never prevents the remaining subscribers from
//! running: its failure is re-dispatched once as an [`Event::Error`]. Failures raised while an
//! error event is being delivered are logged and dropped.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

use waspnest_types::{ReasoningRequest, State};

use crate::capability::Capability;

/// Named points in a run at which subscribers are notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    BeforeRun,
    AfterRun,
    BeforeStep,
    AfterStep,
    Error,
    ReasoningRequest,
}

impl Lifecycle {
    pub const ALL: [Lifecycle; 6] = [
        Lifecycle::BeforeRun,
        Lifecycle::AfterRun,
        Lifecycle::BeforeStep,
        Lifecycle::AfterStep,
        Lifecycle::Error,
        Lifecycle::ReasoningRequest,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Lifecycle::BeforeRun => "before_run",
            Lifecycle::AfterRun => "after_run",
            Lifecycle::BeforeStep => "before_step",
            Lifecycle::AfterStep => "after_step",
            Lifecycle::Error => "error",
            Lifecycle::ReasoningRequest => "reasoning_request",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies a registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

impl HookId {
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Arguments delivered to subscribers.
#[derive(Clone, Copy)]
pub enum Event<'a> {
    BeforeRun {
        state: &'a State,
    },
    AfterRun {
        state: &'a State,
    },
    BeforeStep {
        capability: &'a dyn Capability,
        state: &'a State,
    },
    AfterStep {
        capability: &'a dyn Capability,
        state: &'a State,
    },
    Error {
        error: &'a (dyn StdError + 'static),
        capability: Option<&'a dyn Capability>,
        state: Option<&'a State>,
        /// Set when the error came from a failing subscriber.
        hook: Option<HookId>,
    },
    ReasoningRequest {
        request: &'a ReasoningRequest,
    },
}

impl Event<'_> {
    #[must_use]
    pub fn point(&self) -> Lifecycle {
        match self {
            Event::BeforeRun { .. } => Lifecycle::BeforeRun,
            Event::AfterRun { .. } => Lifecycle::AfterRun,
            Event::BeforeStep { .. } => Lifecycle::BeforeStep,
            Event::AfterStep { .. } => Lifecycle::AfterStep,
            Event::Error { .. } => Lifecycle::Error,
            Event::ReasoningRequest { .. } => Lifecycle::ReasoningRequest,
        }
    }

    /// The state carried by the event, if any.
    #[must_use]
    pub fn state(&self) -> Option<&State> {
        match self {
            Event::BeforeRun { state }
            | Event::AfterRun { state }
            | Event::BeforeStep { state, .. }
            | Event::AfterStep { state, .. } => Some(*state),
            Event::Error { state, .. } => *state,
            Event::ReasoningRequest { .. } => None,
        }
    }

    /// The capability carried by the event, if any.
    #[must_use]
    pub fn capability(&self) -> Option<&dyn Capability> {
        match self {
            Event::BeforeStep { capability, .. } | Event::AfterStep { capability, .. } => {
                Some(*capability)
            }
            Event::Error { capability, .. } => *capability,
            _ => None,
        }
    }
}

impl fmt::Debug for Event<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Event");
        out.field("point", &self.point());
        if let Some(capability) = self.capability() {
            out.field("capability", &capability.name());
        }
        if let Event::Error { error, hook, .. } = self {
            out.field("error", &error.to_string());
            out.field("hook", hook);
        }
        out.finish_non_exhaustive()
    }
}

/// A subscriber returned an error or panicked.
#[derive(Debug, Error)]
pub enum SubscriberError {
    #[error("{point} subscriber {hook} failed: {message}")]
    Failed {
        point: Lifecycle,
        hook: HookId,
        message: String,
    },
    #[error("{point} subscriber {hook} panicked: {message}")]
    Panicked {
        point: Lifecycle,
        hook: HookId,
        message: String,
    },
}

impl SubscriberError {
    #[must_use]
    pub fn hook(&self) -> HookId {
        match self {
            SubscriberError::Failed { hook, .. } | SubscriberError::Panicked { hook, .. } => *hook,
        }
    }
}

type Callback = dyn Fn(&Event<'_>) -> anyhow::Result<()> + Send + Sync;

#[derive(Clone)]
struct Subscriber {
    id: HookId,
    callback: Arc<Callback>,
}

/// Per-instance registry of lifecycle subscribers.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<Lifecycle, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<(Lifecycle, usize)> = Lifecycle::ALL
            .iter()
            .map(|point| (*point, self.subscriber_count(*point)))
            .filter(|(_, n)| *n > 0)
            .collect();
        f.debug_struct("EventBus")
            .field("subscribers", &counts)
            .finish()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a subscriber for `point`. No deduplication.
    pub fn on<F>(&self, point: Lifecycle, callback: F) -> HookId
    where
        F: Fn(&Event<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = HookId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(point)
            .or_default()
            .push(Subscriber {
                id,
                callback: Arc::new(callback),
            });
        tracing::debug!(%point, hook = %id, "Registered subscriber");
        id
    }

    #[must_use]
    pub fn subscriber_count(&self, point: Lifecycle) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&point)
            .map_or(0, Vec::len)
    }

    /// Deliver `event` to every subscriber of its point, in registration order.
    pub fn trigger(&self, event: &Event<'_>) {
        let point = event.point();
        // Snapshot so callbacks may register subscribers without deadlocking.
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&point)
            .cloned()
            .unwrap_or_default();

        for subscriber in subscribers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (subscriber.callback)(event)));
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => SubscriberError::Failed {
                    point,
                    hook: subscriber.id,
                    message: format!("{e:#}"),
                },
                Err(payload) => SubscriberError::Panicked {
                    point,
                    hook: subscriber.id,
                    message: panic_message(payload.as_ref()),
                },
            };

            if point == Lifecycle::Error {
                tracing::warn!(error = %failure, "Dropping failure raised by error subscriber");
                continue;
            }

            tracing::debug!(error = %failure, "Re-dispatching subscriber failure");
            self.trigger(&Event::Error {
                error: &failure,
                capability: None,
                state: None,
                hook: Some(subscriber.id),
            });
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
