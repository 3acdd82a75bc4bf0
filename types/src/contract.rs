//! Input/output type contracts for capabilities.

use std::fmt;

use thiserror::Error;

use crate::record::PayloadType;
use crate::state::State;

/// Which side of a transform a violation was detected on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Input,
    Output,
}

impl Side {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Side::Input => "input",
            Side::Output => "output",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payload did not satisfy a declared contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractViolation {
    #[error("expected {side} payload of type {expected}, got {actual} which is not a structured record")]
    NotStructured {
        side: Side,
        expected: String,
        actual: PayloadType,
    },
    #[error("expected input type {expected}, got {actual}")]
    InputMismatch {
        expected: PayloadType,
        actual: PayloadType,
    },
    #[error("expected output type {expected}, got {actual}")]
    OutputMismatch {
        expected: TypeList,
        actual: PayloadType,
    },
}

/// Display helper rendering `A | B | C`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeList(Vec<PayloadType>);

impl TypeList {
    #[must_use]
    pub fn types(&self) -> &[PayloadType] {
        &self.0
    }
}

impl fmt::Display for TypeList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, ty) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{ty}")?;
        }
        Ok(())
    }
}

/// Declared input type and acceptable output types of a capability.
///
/// ```rust
/// use waspnest_types::{Contract, PayloadType};
///
/// struct Query;
/// struct Short;
/// struct Detailed;
///
/// let contract = Contract::of::<Query, Short>().or::<Detailed>();
/// assert_eq!(contract.input(), PayloadType::of::<Query>());
/// assert_eq!(contract.outputs().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contract {
    input: PayloadType,
    // Never empty.
    outputs: Vec<PayloadType>,
}

impl Contract {
    #[must_use]
    pub fn of<I: 'static, O: 'static>() -> Self {
        Self {
            input: PayloadType::of::<I>(),
            outputs: vec![PayloadType::of::<O>()],
        }
    }

    /// Add an alternative output type.
    #[must_use]
    pub fn or<O: 'static>(mut self) -> Self {
        let ty = PayloadType::of::<O>();
        if !self.outputs.contains(&ty) {
            self.outputs.push(ty);
        }
        self
    }

    #[must_use]
    pub fn input(&self) -> PayloadType {
        self.input
    }

    #[must_use]
    pub fn outputs(&self) -> &[PayloadType] {
        &self.outputs
    }

    /// Whether the state's payload is of the declared input type.
    #[must_use]
    pub fn accepts(&self, state: &State) -> bool {
        state.payload_type() == self.input
    }

    #[must_use]
    pub fn produces(&self, ty: PayloadType) -> bool {
        self.outputs.contains(&ty)
    }

    pub fn check_input(&self, state: &State) -> Result<(), ContractViolation> {
        let actual = state.payload_type();
        if !state.payload().is_structured() {
            return Err(ContractViolation::NotStructured {
                side: Side::Input,
                expected: self.input.to_string(),
                actual,
            });
        }
        if actual != self.input {
            return Err(ContractViolation::InputMismatch {
                expected: self.input,
                actual,
            });
        }
        Ok(())
    }

    pub fn check_output(&self, state: &State) -> Result<(), ContractViolation> {
        let actual = state.payload_type();
        if !state.payload().is_structured() {
            return Err(ContractViolation::NotStructured {
                side: Side::Output,
                expected: self.output_list().to_string(),
                actual,
            });
        }
        if !self.produces(actual) {
            return Err(ContractViolation::OutputMismatch {
                expected: self.output_list(),
                actual,
            });
        }
        Ok(())
    }

    fn output_list(&self) -> TypeList {
        TypeList(self.outputs.clone())
    }
}
