//! The immutable state threaded through an orchestration run.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::contract::ContractViolation;
use crate::record::{PayloadType, Record};

/// Execution context: timestamps, counters, error records and caller values.
pub type ContextMap = Map<String, Value>;

/// Caller-supplied auxiliary data carried alongside the payload.
pub type Metadata = Map<String, Value>;

/// An immutable (payload, context, metadata) triple.
///
/// Every "update" returns a new `State`. Payload and metadata are shared by reference with the
/// state they were derived from; the context is copied and merged. Nothing reachable from a
/// `State` can be mutated in place, so earlier snapshots never observe later changes.
#[derive(Clone)]
pub struct State {
    payload: Arc<dyn Record>,
    context: Arc<ContextMap>,
    metadata: Arc<Metadata>,
}

impl State {
    /// A state with empty context and metadata.
    pub fn new<P: Record>(payload: P) -> Self {
        Self::from_parts(payload, ContextMap::new(), Metadata::new())
    }

    pub fn from_parts<P: Record>(payload: P, context: ContextMap, metadata: Metadata) -> Self {
        Self {
            payload: Arc::new(payload),
            context: Arc::new(context),
            metadata: Arc::new(metadata),
        }
    }

    /// Shallow-merge `updates` into a copy of the context. Later keys win.
    #[must_use]
    pub fn with_context<I, K, V>(&self, updates: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut context = (*self.context).clone();
        for (key, value) in updates {
            context.insert(key.into(), value.into());
        }
        Self {
            payload: Arc::clone(&self.payload),
            context: Arc::new(context),
            metadata: Arc::clone(&self.metadata),
        }
    }

    /// Replace the payload, keeping context and metadata.
    #[must_use]
    pub fn with_payload<P: Record>(&self, payload: P) -> Self {
        Self {
            payload: Arc::new(payload),
            context: Arc::clone(&self.context),
            metadata: Arc::clone(&self.metadata),
        }
    }

    /// Replace the metadata wholesale.
    #[must_use]
    pub fn with_metadata(&self, metadata: Metadata) -> Self {
        Self {
            payload: Arc::clone(&self.payload),
            context: Arc::clone(&self.context),
            metadata: Arc::new(metadata),
        }
    }

    #[must_use]
    pub fn payload(&self) -> &dyn Record {
        &*self.payload
    }

    #[must_use]
    pub fn payload_type(&self) -> PayloadType {
        self.payload.payload_type()
    }

    /// The payload as `T`, if that is its runtime type.
    #[must_use]
    pub fn payload_ref<T: Record>(&self) -> Option<&T> {
        self.payload.as_any().downcast_ref::<T>()
    }

    /// Like [`State::payload_ref`], reporting a mismatch as a contract violation.
    pub fn payload_as<T: Record>(&self) -> Result<&T, ContractViolation> {
        self.payload_ref::<T>()
            .ok_or_else(|| ContractViolation::InputMismatch {
                expected: PayloadType::of::<T>(),
                actual: self.payload_type(),
            })
    }

    #[must_use]
    pub fn context(&self) -> &ContextMap {
        &self.context
    }

    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// True when both states share the same payload, context and metadata allocations.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
            && Arc::ptr_eq(&self.context, &other.context)
            && Arc::ptr_eq(&self.metadata, &other.metadata)
    }

    #[must_use]
    pub fn shares_payload(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("payload", &self.payload)
            .field("context", &self.context)
            .field("metadata", &self.metadata)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use serde_json::json;

    #[derive(Debug, Serialize, PartialEq)]
    struct Query {
        text: String,
    }

    fn sample_state() -> State {
        let mut context = ContextMap::new();
        context.insert("user_id".to_string(), json!("123"));
        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), json!("test"));
        State::from_parts(
            Query {
                text: "test query".to_string(),
            },
            context,
            metadata,
        )
    }

    #[test]
    fn creation_keeps_parts() {
        let state = sample_state();
        assert_eq!(
            state.payload_ref::<Query>().map(|q| q.text.as_str()),
            Some("test query")
        );
        assert_eq!(state.context().get("user_id"), Some(&json!("123")));
        assert_eq!(state.metadata().get("source"), Some(&json!("test")));
    }

    #[test]
    fn new_starts_with_empty_maps() {
        let state = State::new(Query {
            text: "test".to_string(),
        });
        assert!(state.context().is_empty());
        assert!(state.metadata().is_empty());
    }

    #[test]
    fn with_context_merges_without_touching_original() {
        let state = sample_state();
        let updated = state.with_context([("session_id", json!("abc"))]);

        assert_eq!(
            Value::Object(updated.context().clone()),
            json!({"user_id": "123", "session_id": "abc"})
        );
        assert_eq!(Value::Object(state.context().clone()), json!({"user_id": "123"}));
        assert!(updated.shares_payload(&state));
        assert_eq!(updated.metadata(), state.metadata());
    }

    #[test]
    fn with_context_later_writes_win() {
        let state = sample_state().with_context([("user_id", json!("456")), ("n", json!(1))]);
        let state = state.with_context([("n", json!(2))]);
        assert_eq!(state.context().get("user_id"), Some(&json!("456")));
        assert_eq!(state.context().get("n"), Some(&json!(2)));
    }

    #[test]
    fn with_payload_keeps_context_and_metadata() {
        let state = sample_state();
        let next = state.with_payload(Query {
            text: "other".to_string(),
        });
        assert!(!next.shares_payload(&state));
        assert_eq!(next.context(), state.context());
        assert_eq!(next.metadata(), state.metadata());
    }

    #[test]
    fn payload_as_reports_mismatch() {
        let state = State::new(json!({"text": "raw"}));
        let err = state.payload_as::<Query>().unwrap_err();
        assert!(err.to_string().contains("Query"));
        assert!(err.to_string().contains("Value"));
    }

    #[test]
    fn clones_are_pointer_equal() {
        let state = sample_state();
        assert!(state.ptr_eq(&state.clone()));
        assert!(!state.ptr_eq(&state.with_context([("k", json!(1))])));
    }
}
