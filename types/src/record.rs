//! Payload records and their runtime type descriptors.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::Serialize;
use serde_json::Value;

/// Strip module paths (and generic arguments) from a `std::any::type_name` string.
///
/// `waspnest::pipeline::QueryAnalyzer` becomes `QueryAnalyzer`.
#[must_use]
pub fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Runtime descriptor of a payload type.
///
/// Equality and hashing use the [`TypeId`] only; the name is carried for messages.
#[derive(Clone, Copy)]
pub struct PayloadType {
    id: TypeId,
    name: &'static str,
}

impl PayloadType {
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    #[must_use]
    pub fn id(self) -> TypeId {
        self.id
    }

    /// Fully qualified type name.
    #[must_use]
    pub fn type_name(self) -> &'static str {
        self.name
    }

    /// Type name without its module path.
    #[must_use]
    pub fn short_name(self) -> &'static str {
        short_type_name(self.name)
    }
}

impl PartialEq for PayloadType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PayloadType {}

impl Hash for PayloadType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PayloadType({})", self.name)
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// A value that can travel as a state payload.
///
/// Implemented for every `Serialize + Debug + Send + Sync + 'static` type. A record is
/// *structured* when it serializes to a JSON object; bare strings, numbers, unit structs and
/// unit enum variants are records but not structured ones.
pub trait Record: Any + fmt::Debug + Send + Sync {
    fn payload_type(&self) -> PayloadType;

    fn to_value(&self) -> Result<Value, serde_json::Error>;

    fn as_any(&self) -> &dyn Any;

    fn is_structured(&self) -> bool {
        matches!(self.to_value(), Ok(Value::Object(_)))
    }
}

impl<T> Record for T
where
    T: Serialize + fmt::Debug + Send + Sync + 'static,
{
    fn payload_type(&self) -> PayloadType {
        PayloadType::of::<T>()
    }

    fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
