//! Core domain types for waspnest.
//!
//! This crate contains pure domain types with no IO and minimal dependencies:
//!
//! - [`State`] - the immutable (payload, context, metadata) triple threaded through a run
//! - [`Record`] / [`PayloadType`] - payload values and their runtime type descriptors
//! - [`Contract`] / [`ContractViolation`] - declared capability input/output types
//! - [`ReasoningRequest`] and friends - what capabilities send to the reasoning service
//! - [`ModelId`] / [`ApiKey`] - model selection and credentials

mod contract;
mod message;
mod model;
mod record;
mod state;

pub use contract::{Contract, ContractViolation, Side, TypeList};
pub use message::{
    ChatMessage, ReasoningRequest, RequestOptions, ResponseShape, Role, StructuredResponse,
};
pub use model::{ApiKey, DEFAULT_MODEL, EmptyModelIdError, ModelId};
pub use record::{PayloadType, Record, short_type_name};
pub use state::{ContextMap, Metadata, State};
