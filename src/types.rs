//! Core types for the record store.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A single record in the store.
///
/// Records are immutable once constructed; the id is never reassigned.
/// Two records are the same record when their ids are equal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier (assigned by the store's generator).
    pub id: String,

    /// Application-defined payload.
    pub data: Value,
}

impl Record {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Decode the payload into a typed value.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Record {}

/// Declared kind of every payload in a store.
///
/// When a store is configured with a kind, `add` rejects payloads of any
/// other kind. Existing records are never re-checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl PayloadKind {
    /// Kind of an already-serialized payload.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => PayloadKind::Null,
            Value::Bool(_) => PayloadKind::Bool,
            Value::Number(_) => PayloadKind::Number,
            Value::String(_) => PayloadKind::String,
            Value::Array(_) => PayloadKind::Array,
            Value::Object(_) => PayloadKind::Object,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadKind::Null => "null",
            PayloadKind::Bool => "bool",
            PayloadKind::Number => "number",
            PayloadKind::String => "string",
            PayloadKind::Array => "array",
            PayloadKind::Object => "object",
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
