//! # Mapping Registry
//!
//! Entity types, their leaf fields, and their relations.
//!
//! The registry is read-only to the footprint layer: it is built once,
//! validated, and then shared by the dispatcher and the store.
//!
//! ## Relation ownership
//!
//! The `toOne` side owns the foreign key. A `toMany` relation is the inverse
//! view of a `toOne` relation on the target type, named by `mapped_by`:
//!
//! ```text
//! List.todos (to_many, mapped_by = "list")  <->  Todo.list (to_one -> List)
//! ```

use crate::primitives::{DEFAULT_PRIMARY_KEY, MAX_NAME_LENGTH};
use crate::{FootprintError, Result, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// FIELDS
// =============================================================================

/// Storage type of a leaf field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Integer,
    Boolean,
}

impl FieldType {
    /// Check that a non-null value has this type.
    #[must_use]
    pub const fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::Text, Value::Text(_))
                | (Self::Integer, Value::Int(_))
                | (Self::Boolean, Value::Bool(_))
        )
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }
}

/// A declared leaf field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldType,
    #[serde(default)]
    pub nullable: bool,
    /// Maximum length in characters, for text fields.
    #[serde(default)]
    pub size: Option<usize>,
}

impl FieldDef {
    fn new(name: impl Into<String>, kind: FieldType) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
            size: None,
        }
    }

    #[must_use]
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Text)
    }

    #[must_use]
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    #[must_use]
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    /// Allow `Null` and absence on construction.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.nullable = true;
        self
    }

    #[must_use]
    pub fn max_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }
}

// =============================================================================
// RELATIONS
// =============================================================================

/// How many records sit on the far side of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// At most one related record.
    ToOne,
    /// An ordered collection of related records.
    ToMany,
}

/// A typed link from one entity type to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub name: String,
    pub cardinality: Cardinality,
    pub target: String,
    /// For `toMany`: the `toOne` relation on the target that points back.
    #[serde(default)]
    pub mapped_by: Option<String>,
}

impl Relation {
    #[must_use]
    pub fn to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cardinality: Cardinality::ToOne,
            target: target.into(),
            mapped_by: None,
        }
    }

    #[must_use]
    pub fn to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        mapped_by: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            cardinality: Cardinality::ToMany,
            target: target.into(),
            mapped_by: Some(mapped_by.into()),
        }
    }
}

// =============================================================================
// ENTITY TYPES
// =============================================================================

fn default_primary_key() -> String {
    DEFAULT_PRIMARY_KEY.to_string()
}

/// A named record shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityType {
    name: String,
    #[serde(default = "default_primary_key")]
    primary_key: String,
    #[serde(default)]
    fields: Vec<FieldDef>,
    #[serde(default)]
    relations: Vec<Relation>,
}

impl EntityType {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: default_primary_key(),
            fields: Vec::new(),
            relations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_primary_key(mut self, name: impl Into<String>) -> Self {
        self.primary_key = name.into();
        self
    }

    #[must_use]
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    #[must_use]
    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn relation(&self, attribute: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == attribute)
    }
}

// =============================================================================
// SCHEMA
// =============================================================================

/// The set of registered entity types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    entities: BTreeMap<String, EntityType>,
}

impl Schema {
    /// Register every entity type and validate the result as a whole.
    pub fn from_entities(entities: impl IntoIterator<Item = EntityType>) -> Result<Self> {
        let mut schema = Self::default();
        for entity in entities {
            if schema.entities.contains_key(entity.name()) {
                return Err(FootprintError::Validation(format!(
                    "Entity '{}' is registered twice",
                    entity.name()
                )));
            }
            schema.entities.insert(entity.name.clone(), entity);
        }
        schema.validate()?;
        Ok(schema)
    }

    #[must_use]
    pub fn entity(&self, name: &str) -> Option<&EntityType> {
        self.entities.get(name)
    }

    /// All entity types in name order.
    pub fn entities(&self) -> impl Iterator<Item = &EntityType> {
        self.entities.values()
    }

    /// Check names and relation consistency across the registry.
    pub fn validate(&self) -> Result<()> {
        for entity in self.entities.values() {
            check_name(entity.name())?;
            check_name(entity.primary_key())?;

            let mut seen = BTreeSet::new();
            seen.insert(entity.primary_key());
            let names = entity
                .fields
                .iter()
                .map(|f| f.name.as_str())
                .chain(entity.relations.iter().map(|r| r.name.as_str()));
            for name in names {
                check_name(name)?;
                if !seen.insert(name) {
                    return Err(FootprintError::Validation(format!(
                        "'{}.{}' is declared more than once",
                        entity.name(),
                        name
                    )));
                }
            }

            for relation in &entity.relations {
                self.validate_relation(entity, relation)?;
            }
        }
        Ok(())
    }

    fn validate_relation(&self, owner: &EntityType, relation: &Relation) -> Result<()> {
        let Some(target) = self.entity(&relation.target) else {
            return Err(FootprintError::Validation(format!(
                "Relation '{}.{}' targets unregistered entity '{}'",
                owner.name(),
                relation.name,
                relation.target
            )));
        };

        match (relation.cardinality, relation.mapped_by.as_deref()) {
            (Cardinality::ToOne, None) => Ok(()),
            (Cardinality::ToOne, Some(_)) => Err(FootprintError::Validation(format!(
                "Relation '{}.{}': mapped_by is only valid on to_many relations",
                owner.name(),
                relation.name
            ))),
            (Cardinality::ToMany, None) => Err(FootprintError::Validation(format!(
                "Relation '{}.{}': to_many relations require mapped_by",
                owner.name(),
                relation.name
            ))),
            (Cardinality::ToMany, Some(inverse)) => match target.relation(inverse) {
                Some(back)
                    if back.cardinality == Cardinality::ToOne && back.target == owner.name() =>
                {
                    Ok(())
                }
                _ => Err(FootprintError::Validation(format!(
                    "Relation '{}.{}': '{}.{}' must be a to_one relation back to '{}'",
                    owner.name(),
                    relation.name,
                    target.name(),
                    inverse,
                    owner.name()
                ))),
            },
        }
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LENGTH {
        return Err(FootprintError::Validation(format!(
            "Invalid name '{name}': must be 1..={MAX_NAME_LENGTH} bytes"
        )));
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
