//! Typed transformation units.

use std::fmt;

use thiserror::Error;

use waspnest_types::{Contract, ContractViolation, State, short_type_name};

use crate::reasoning::{AskError, Reasoning};

/// Failure of a single capability invocation.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error(transparent)]
    Contract(#[from] ContractViolation),
    #[error(transparent)]
    Ask(#[from] AskError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
    #[error("capability panicked: {message}")]
    Panicked { message: String },
}

/// A named, typed transformation of a [`State`].
///
/// Implementors declare what they accept and produce through [`Capability::contract`]; the
/// orchestrator resolves the contract once at registration and enforces it around every
/// [`Capability::transform`] call. Capabilities without a contract accept any payload.
///
/// ```rust
/// use serde::Serialize;
/// use waspnest_engine::{Capability, CapabilityError, CapabilityExt, Reasoning};
/// use waspnest_types::{Contract, State};
///
/// #[derive(Debug, Serialize)]
/// struct Query { text: String }
/// #[derive(Debug, Serialize)]
/// struct Shout { text: String }
///
/// struct Upper;
///
/// impl Capability for Upper {
///     fn contract(&self) -> Option<Contract> {
///         Some(Contract::of::<Query, Shout>())
///     }
///
///     fn transform(&self, state: &State, _: &Reasoning<'_>) -> Result<State, CapabilityError> {
///         let query = state.payload_as::<Query>()?;
///         Ok(state.with_payload(Shout { text: query.text.to_uppercase() }))
///     }
/// }
///
/// let state = State::new(Query { text: "hi".into() });
/// let out = Upper.apply(&state, &Reasoning::detached()).unwrap();
/// assert_eq!(out.payload_ref::<Shout>().unwrap().text, "HI");
/// assert_eq!(Upper.name(), "Upper");
/// ```
pub trait Capability: Send + Sync {
    /// Defaults to the implementing type's name without its module path.
    fn name(&self) -> &str {
        short_type_name(std::any::type_name::<Self>())
    }

    fn contract(&self) -> Option<Contract> {
        None
    }

    fn can_handle(&self, state: &State) -> bool {
        self.contract().is_none_or(|contract| contract.accepts(state))
    }

    /// Produce the next state. The incoming context should be carried over, typically via
    /// [`State::with_payload`].
    fn transform(&self, state: &State, reasoning: &Reasoning<'_>) -> Result<State, CapabilityError>;
}

pub trait CapabilityExt: Capability {
    /// Wrap the capability under a different name.
    fn named(self, name: impl Into<String>) -> Named<Self>
    where
        Self: Sized,
    {
        Named {
            name: name.into(),
            inner: self,
        }
    }

    /// Run `transform` with the capability's contract enforced on input and output.
    fn apply(&self, state: &State, reasoning: &Reasoning<'_>) -> Result<State, CapabilityError> {
        checked_transform(self, self.contract().as_ref(), state, reasoning)
    }
}

impl<C: Capability + ?Sized> CapabilityExt for C {}

pub(crate) fn checked_transform<C: Capability + ?Sized>(
    capability: &C,
    contract: Option<&Contract>,
    state: &State,
    reasoning: &Reasoning<'_>,
) -> Result<State, CapabilityError> {
    if let Some(contract) = contract {
        contract.check_input(state)?;
    }
    let next = capability.transform(state, reasoning)?;
    if let Some(contract) = contract {
        contract.check_output(&next)?;
    }
    Ok(next)
}

/// A capability registered under an explicit name.
pub struct Named<C> {
    name: String,
    inner: C,
}

impl<C> Named<C> {
    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C> fmt::Debug for Named<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Named").field("name", &self.name).finish_non_exhaustive()
    }
}

impl<C: Capability> Capability for Named<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn contract(&self) -> Option<Contract> {
        self.inner.contract()
    }

    fn can_handle(&self, state: &State) -> bool {
        self.inner.can_handle(state)
    }

    fn transform(&self, state: &State, reasoning: &Reasoning<'_>) -> Result<State, CapabilityError> {
        self.inner.transform(state, reasoning)
    }
}
