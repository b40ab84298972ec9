//! # Populator
//!
//! Leaf-level field assignment. No relation traversal happens here; relation
//! entries of a payload belong to the graph builder and are skipped.

use crate::payload::{Input, Payload};
use crate::schema::{EntityType, FieldDef};
use crate::{FootprintError, Record, Result, Value};

/// Assigns the leaf fields of a payload onto a record.
pub trait Populator {
    /// Assign leaf fields of `payload` onto `existing`, or onto a blank
    /// instance of `entity` when `existing` is `None`.
    ///
    /// Malformed payloads fail with `FootprintError::Validation`.
    fn assign_fields(
        &self,
        entity: &EntityType,
        payload: &Payload,
        existing: Option<Record>,
    ) -> Result<Record>;
}

/// Schema-checked field assignment.
///
/// - Unknown names are rejected
/// - Values are checked against the declared field type and size
/// - The primary-key entry is skipped: keys are assigned by the store
/// - On construction, every non-nullable field must be present
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldPopulator;

impl FieldPopulator {
    fn check(entity: &EntityType, def: &FieldDef, value: &Value) -> Result<()> {
        if value.is_null() {
            if def.nullable {
                return Ok(());
            }
            return Err(FootprintError::Validation(format!(
                "Field '{}.{}' is not nullable",
                entity.name(),
                def.name
            )));
        }

        if !def.kind.accepts(value) {
            return Err(FootprintError::Validation(format!(
                "Field '{}.{}' expects {}, got {}",
                entity.name(),
                def.name,
                def.kind.name(),
                value.type_name()
            )));
        }

        if let (Some(size), Value::Text(text)) = (def.size, value)
            && text.chars().count() > size
        {
            return Err(FootprintError::Validation(format!(
                "Field '{}.{}' exceeds {} characters",
                entity.name(),
                def.name,
                size
            )));
        }

        Ok(())
    }
}

impl Populator for FieldPopulator {
    fn assign_fields(
        &self,
        entity: &EntityType,
        payload: &Payload,
        existing: Option<Record>,
    ) -> Result<Record> {
        let constructing = existing.is_none();
        let mut record = existing.unwrap_or_else(|| Record::new(entity.name()));

        for (name, input) in payload.iter() {
            if name == entity.primary_key() || entity.relation(name).is_some() {
                continue;
            }

            let Some(def) = entity.field(name) else {
                return Err(FootprintError::Validation(format!(
                    "Unknown field '{}' on '{}'",
                    name,
                    entity.name()
                )));
            };

            let Input::Value(value) = input else {
                return Err(FootprintError::Validation(format!(
                    "Field '{}.{}' expects a scalar value",
                    entity.name(),
                    name
                )));
            };

            Self::check(entity, def, value)?;
            record.set(name, value.clone());
        }

        if constructing {
            for def in entity.fields().iter().filter(|def| !def.nullable) {
                if record.get(&def.name).is_none() {
                    return Err(FootprintError::Validation(format!(
                        "Missing required field '{}.{}'",
                        entity.name(),
                        def.name
                    )));
                }
            }
        }

        Ok(record)
    }
}
