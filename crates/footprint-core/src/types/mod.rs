//! # Core Type Definitions
//!
//! This module contains the value and record types every footprint operation
//! passes around:
//! - Scalar cells and primary keys (`Value`, `Key`)
//! - Entity instances and their loaded relations (`Record`, `Related`)
//! - Operation results (`Found`, `Affected`)
//! - Error types (`FootprintError`, `NotFound`)
//!
//! ## Determinism Guarantees
//!
//! - Fields and relations are kept in `BTreeMap`s, so iteration order is
//!   stable across runs
//! - No floating-point cells: numbers are `i64` only

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// =============================================================================
// SCALAR VALUES
// =============================================================================

/// A scalar cell stored in a leaf field or used in equality criteria.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum Value {
    /// Absent value. A missing field compares equal to `Null`.
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Value {
    /// Create a text value.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Interpret this value as a primary key.
    ///
    /// Accepts non-negative integers and strings holding one.
    #[must_use]
    pub fn as_key(&self) -> Option<Key> {
        match self {
            Self::Int(n) => u64::try_from(*n).ok().map(Key),
            Self::Text(s) => s.trim().parse::<u64>().ok().map(Key),
            Self::Null | Self::Bool(_) => None,
        }
    }

    /// Name of the variant, used in validation messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Text(_) => "text",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Key> for Value {
    fn from(key: Key) -> Self {
        Self::Int(i64::try_from(key.0).unwrap_or(i64::MAX))
    }
}

// =============================================================================
// PRIMARY KEYS
// =============================================================================

/// Primary-key value of a stored record.
///
/// Keys are assigned by the store, per entity type, starting at 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Key(pub u64);

impl Key {
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// RECORD
// =============================================================================

/// Lifecycle of a record relative to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordState {
    /// Built in memory, never persisted. Has no key until staged.
    New,
    /// Loaded from, or already staged into, the store.
    Managed,
    /// Stands in for an existing stored record; only the key is known.
    Reference,
}

/// Loaded contents of one relation slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    /// `toOne`: the related record, or `None` when the link is empty.
    One(Option<Box<Record>>),
    /// `toMany`: the related records in collection order.
    Many(Vec<Record>),
}

/// An entity instance.
///
/// A relation that was never loaded is absent from the record entirely,
/// which is different from a loaded-but-empty relation.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    entity: String,
    key: Option<Key>,
    state: RecordState,
    fields: BTreeMap<String, Value>,
    relations: BTreeMap<String, Related>,
}

impl Record {
    /// Create a blank, unpersisted instance of `entity`.
    #[must_use]
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            key: None,
            state: RecordState::New,
            fields: BTreeMap::new(),
            relations: BTreeMap::new(),
        }
    }

    /// Create a reference to an existing stored record.
    #[must_use]
    pub fn reference(entity: impl Into<String>, key: Key) -> Self {
        Self {
            key: Some(key),
            state: RecordState::Reference,
            ..Self::new(entity)
        }
    }

    /// Create a managed record from stored fields.
    #[must_use]
    pub fn managed(entity: impl Into<String>, key: Key, fields: BTreeMap<String, Value>) -> Self {
        Self {
            key: Some(key),
            state: RecordState::Managed,
            fields,
            ..Self::new(entity)
        }
    }

    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    #[must_use]
    pub const fn key(&self) -> Option<Key> {
        self.key
    }

    #[must_use]
    pub const fn state(&self) -> RecordState {
        self.state
    }

    #[must_use]
    pub const fn is_reference(&self) -> bool {
        matches!(self.state, RecordState::Reference)
    }

    /// Mark the record as staged in the store under `key`.
    pub fn mark_managed(&mut self, key: Key) {
        self.key = Some(key);
        self.state = RecordState::Managed;
    }

    /// Get a leaf field. Unset fields return `None`.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Set a leaf field.
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    /// All leaf fields in deterministic order.
    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Loaded relation slot, if the relation was loaded or assigned.
    #[must_use]
    pub fn related(&self, attribute: &str) -> Option<&Related> {
        self.relations.get(attribute)
    }

    /// All loaded relation slots.
    #[must_use]
    pub fn relations(&self) -> &BTreeMap<String, Related> {
        &self.relations
    }

    pub fn relations_mut(&mut self) -> impl Iterator<Item = (&String, &mut Related)> {
        self.relations.iter_mut()
    }

    pub fn set_related(&mut self, attribute: impl Into<String>, related: Related) {
        self.relations.insert(attribute.into(), related);
    }

    /// The loaded `toOne` record for `attribute`, if any.
    #[must_use]
    pub fn one(&self, attribute: &str) -> Option<&Record> {
        match self.relations.get(attribute) {
            Some(Related::One(Some(record))) => Some(record),
            _ => None,
        }
    }

    /// The loaded `toMany` collection for `attribute`. Empty when not loaded.
    #[must_use]
    pub fn many(&self, attribute: &str) -> &[Record] {
        match self.relations.get(attribute) {
            Some(Related::Many(records)) => records,
            _ => &[],
        }
    }

    /// Take the loaded `toOne` record out of its slot, leaving the slot empty.
    pub fn take_one(&mut self, attribute: &str) -> Option<Record> {
        match self.relations.get_mut(attribute) {
            Some(Related::One(slot)) => slot.take().map(|record| *record),
            _ => None,
        }
    }

    /// Take the loaded `toMany` collection out of its slot, leaving it empty.
    pub fn take_many(&mut self, attribute: &str) -> Vec<Record> {
        match self.relations.get_mut(attribute) {
            Some(Related::Many(records)) => std::mem::take(records),
            _ => Vec::new(),
        }
    }

    /// Append to a `toMany` collection, creating the slot if needed.
    ///
    /// Existing members are never replaced.
    pub fn push_many(&mut self, attribute: &str, record: Record) {
        match self.relations.get_mut(attribute) {
            Some(Related::Many(records)) => records.push(record),
            _ => {
                self.relations
                    .insert(attribute.to_string(), Related::Many(vec![record]));
            }
        }
    }
}

// =============================================================================
// OPERATION RESULTS
// =============================================================================

/// Result of `find`. The shape follows the criteria kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Found {
    /// Scalar criteria: the record with that key, if any.
    One(Option<Record>),
    /// Object criteria: every match, in key order.
    Many(Vec<Record>),
}

impl Found {
    /// Flatten into a list of records.
    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        match self {
            Self::One(record) => record.into_iter().collect(),
            Self::Many(records) => records,
        }
    }
}

/// Result of `update` and `destroy`. The shape follows the criteria kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Affected {
    One(Record),
    Many(Vec<Record>),
}

impl Affected {
    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        match self {
            Self::One(record) => vec![record],
            Self::Many(records) => records,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(records) => records.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// The three distinct causes of a not-found failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotFound {
    /// The entity type is not registered.
    #[error("Entity '{0}' not found.")]
    Entity(String),

    /// The attribute does not map to a relation on the entity type.
    #[error("Association '{attribute}' not found on '{entity}'.")]
    Association { entity: String, attribute: String },

    /// The lookup matched nothing.
    #[error("No record found with the specified criteria.")]
    Record,
}

/// Errors returned by footprint operations.
///
/// - No local recovery: every collaborator failure short-circuits the operation
/// - Collaborator failures pass through as `Validation` or `Persistence`
#[derive(Debug, Error)]
pub enum FootprintError {
    #[error("{0}")]
    NotFound(#[from] NotFound),

    /// Malformed payload or criteria.
    #[error("Validation failure: {0}")]
    Validation(String),

    /// Storage-level failure. Never retried here.
    #[error("Persistence failure: {0}")]
    Persistence(String),
}

impl FootprintError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_NOT_FOUND",
            Self::Validation(_) => "E_VALIDATION",
            Self::Persistence(_) => "E_PERSISTENCE",
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T, E = FootprintError> = std::result::Result<T, E>;

// =============================================================================
// TESTS
// =============================================================================
