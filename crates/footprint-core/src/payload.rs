//! # Payload Model
//!
//! Plain input data for create and update operations.
//!
//! A relation slot in a payload is either an identifier of an existing record
//! (association-by-reference) or an inline object (association-by-value).
//! The two are told apart by `ChildRef`, never by inspecting runtime shape
//! after the fact.

use crate::{FootprintError, Result, Value};
use std::collections::BTreeMap;

/// One entry of a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Value(Value),
    Object(Payload),
    List(Vec<Input>),
}

/// A payload entry offered for a single relation slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildRef<'a> {
    /// Attach the existing record with this key. `Null` detaches.
    Identifier(&'a Value),
    /// Construct (or mutate) a record from this payload.
    Inline(&'a Payload),
}

impl Input {
    /// View this entry as a single child reference.
    ///
    /// Returns `FootprintError::Validation` for a list.
    pub fn as_child_ref(&self) -> Result<ChildRef<'_>> {
        match self {
            Self::Value(value) => Ok(ChildRef::Identifier(value)),
            Self::Object(payload) => Ok(ChildRef::Inline(payload)),
            Self::List(_) => Err(FootprintError::Validation(
                "Expected a single object or identifier, found a list".to_string(),
            )),
        }
    }

    /// View this entry as a list of child references.
    ///
    /// Returns `FootprintError::Validation` for anything but a list.
    pub fn as_child_refs(&self) -> Result<Vec<ChildRef<'_>>> {
        match self {
            Self::List(items) => items.iter().map(Self::as_child_ref).collect(),
            Self::Value(_) | Self::Object(_) => Err(FootprintError::Validation(
                "Expected a list of objects or identifiers".to_string(),
            )),
        }
    }
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<bool> for Input {
    fn from(b: bool) -> Self {
        Self::Value(Value::Bool(b))
    }
}

impl From<i64> for Input {
    fn from(n: i64) -> Self {
        Self::Value(Value::Int(n))
    }
}

impl From<i32> for Input {
    fn from(n: i32) -> Self {
        Self::Value(Value::from(n))
    }
}

impl From<&str> for Input {
    fn from(s: &str) -> Self {
        Self::Value(Value::text(s))
    }
}

impl From<String> for Input {
    fn from(s: String) -> Self {
        Self::Value(Value::Text(s))
    }
}

impl From<Payload> for Input {
    fn from(payload: Payload) -> Self {
        Self::Object(payload)
    }
}

/// Field name to input entry, iterated in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload(BTreeMap<String, Input>);

impl Payload {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, input: impl Into<Input>) -> Self {
        self.0.insert(name.into(), input.into());
        self
    }

    /// Builder-style insert of a list entry.
    #[must_use]
    pub fn with_list(mut self, name: impl Into<String>, items: Vec<Input>) -> Self {
        self.0.insert(name.into(), Input::List(items));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, input: Input) {
        self.0.insert(name.into(), input);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Input> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Input)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// =============================================================================
// JSON CONVERSION
// =============================================================================

/// Convert a JSON scalar into a `Value`.
///
/// Returns `FootprintError::Validation` for non-integral numbers and for
/// arrays or objects.
pub fn value_from_json(json: &serde_json::Value) -> Result<Value> {
    match json {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::String(s) => Ok(Value::Text(s.clone())),
        serde_json::Value::Number(n) => n.as_i64().map(Value::Int).ok_or_else(|| {
            FootprintError::Validation(format!("Unsupported number {n}: only integers are stored"))
        }),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => Err(
            FootprintError::Validation("Expected a scalar value".to_string()),
        ),
    }
}

impl TryFrom<&serde_json::Value> for Input {
    type Error = FootprintError;

    fn try_from(json: &serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::Array(items) => items
                .iter()
                .map(Self::try_from)
                .collect::<Result<Vec<_>>>()
                .map(Self::List),
            serde_json::Value::Object(_) => Payload::try_from(json).map(Self::Object),
            scalar => value_from_json(scalar).map(Self::Value),
        }
    }
}

impl TryFrom<&serde_json::Value> for Payload {
    type Error = FootprintError;

    fn try_from(json: &serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(map) = json else {
            return Err(FootprintError::Validation(
                "Payload must be a JSON object".to_string(),
            ));
        };
        let mut payload = Self::new();
        for (name, entry) in map {
            payload.insert(name.clone(), Input::try_from(entry)?);
        }
        Ok(payload)
    }
}

// =============================================================================
// TESTS
// =============================================================================
