//! # JSON Rendering
//!
//! Parses command arguments into criteria and payloads, and renders
//! records back out as JSON objects keyed by field name.

use crate::CliError;
use footprint_core::payload::value_from_json;
use footprint_core::primitives::DEFAULT_PRIMARY_KEY;
use footprint_core::{
    Affected, Criteria, EntityType, Filter, FootprintError, Found, Payload, Record, Related,
    Schema, Value,
};
use serde_json::{Map, json};

// =============================================================================
// INPUT
// =============================================================================

/// Parse criteria: a JSON object is a filter, a JSON scalar is a key.
///
/// A bare word that is not valid JSON is taken as a text key.
pub fn parse_criteria(text: &str) -> Result<Criteria, CliError> {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Object(map)) => {
            let mut filter = Filter::new();
            for (name, value) in &map {
                filter.insert(name.clone(), value_from_json(value)?);
            }
            Ok(Criteria::Filter(filter))
        }
        Ok(serde_json::Value::Array(_)) => Err(CliError::Footprint(FootprintError::Validation(
            "Criteria must be a scalar or an object".to_string(),
        ))),
        Ok(scalar) => Ok(Criteria::Key(value_from_json(&scalar)?)),
        Err(_) => Ok(Criteria::Key(Value::text(text))),
    }
}

/// Parse a parent identifier. Same rules as scalar criteria.
pub fn parse_id(text: &str) -> Result<Value, CliError> {
    match parse_criteria(text)? {
        Criteria::Key(value) => Ok(value),
        Criteria::Filter(_) => Err(CliError::Footprint(FootprintError::Validation(
            "Parent identifier must be a scalar".to_string(),
        ))),
    }
}

/// Parse a JSON object into a payload.
pub fn parse_payload(text: &str) -> Result<Payload, CliError> {
    let json: serde_json::Value = serde_json::from_str(text)?;
    Ok(Payload::try_from(&json)?)
}

// =============================================================================
// OUTPUT
// =============================================================================

#[must_use]
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => json!(b),
        Value::Int(n) => json!(n),
        Value::Text(s) => json!(s),
    }
}

/// Render a record with its primary key first, then leaf fields, then
/// every loaded relation.
#[must_use]
pub fn record_to_json(schema: &Schema, record: &Record) -> serde_json::Value {
    let primary_key = schema
        .entity(record.entity())
        .map_or(DEFAULT_PRIMARY_KEY, EntityType::primary_key);

    let mut object = Map::new();
    if let Some(key) = record.key() {
        object.insert(primary_key.to_string(), json!(key.value()));
    }
    for (name, value) in record.fields() {
        object.insert(name.clone(), value_to_json(value));
    }
    for (name, related) in record.relations() {
        let rendered = match related {
            Related::One(Some(child)) => record_to_json(schema, child),
            Related::One(None) => serde_json::Value::Null,
            Related::Many(children) => serde_json::Value::Array(
                children
                    .iter()
                    .map(|child| record_to_json(schema, child))
                    .collect(),
            ),
        };
        object.insert(name.clone(), rendered);
    }
    serde_json::Value::Object(object)
}

fn records_to_json(schema: &Schema, records: &[Record]) -> serde_json::Value {
    serde_json::Value::Array(
        records
            .iter()
            .map(|record| record_to_json(schema, record))
            .collect(),
    )
}

/// `null` for a missing single record, an array for a filter.
#[must_use]
pub fn found_to_json(schema: &Schema, found: &Found) -> serde_json::Value {
    match found {
        Found::One(Some(record)) => record_to_json(schema, record),
        Found::One(None) => serde_json::Value::Null,
        Found::Many(records) => records_to_json(schema, records),
    }
}

#[must_use]
pub fn affected_to_json(schema: &Schema, affected: &Affected) -> serde_json::Value {
    match affected {
        Affected::One(record) => record_to_json(schema, record),
        Affected::Many(records) => records_to_json(schema, records),
    }
}

#[must_use]
pub fn error_to_json(error: &CliError) -> serde_json::Value {
    json!({
        "error": error.code(),
        "message": error.to_string(),
    })
}
