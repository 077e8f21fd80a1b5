use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::Value;

/// Arguments captured at the call site of a compiled query. Bound-parameter
/// accessors and emulated skip/take bindings resolve against these on every
/// invocation.
pub type CallArgs = Vec<Value>;

/// Runtime scalar type discriminant. Doubles as the observed source type of
/// a cursor cell and as the scalar half of a conversion target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Float,
    Text,
    Boolean,
    Timestamp,
}

impl DataType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Float => "FLOAT",
            Self::Text => "TEXT",
            Self::Boolean => "BOOLEAN",
            Self::Timestamp => "TIMESTAMP",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Target type of one column mapping: a plain scalar or a registered enum.
/// Nullability lives on the column mapping, not here, so one target type
/// can serve both lifted and unlifted mappings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetType {
    Scalar(DataType),
    Enum(String),
}

impl TargetType {
    pub fn name(&self) -> String {
        match self {
            Self::Scalar(dt) => dt.name().to_string(),
            Self::Enum(name) => format!("enum {}", name),
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl From<DataType> for TargetType {
    fn from(dt: DataType) -> Self {
        Self::Scalar(dt)
    }
}
