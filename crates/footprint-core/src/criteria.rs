//! # Criteria Normalizer
//!
//! Turns caller criteria into the form lookup calls take.
//!
//! - A scalar selects one record by primary key (find-one path)
//! - An object is a conjunctive equality filter (find-many path)
//!
//! Field names are not checked here. Unknown names surface from the
//! collaborator that evaluates the filter.

use crate::schema::{Cardinality, EntityType};
use crate::{FootprintError, Key, Result, Value};
use std::collections::BTreeMap;

/// Conjunctive field-equality filter: every entry must match.
pub type Filter = BTreeMap<String, Value>;

/// Caller-supplied selection criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Criteria {
    /// Primary-key value. Always targets at most one record.
    Key(Value),
    /// Field-equality filter. May match any number of records.
    Filter(Filter),
}

impl Criteria {
    /// Criteria matching every record.
    #[must_use]
    pub fn all() -> Self {
        Self::Filter(Filter::new())
    }

    /// Build a filter from `(field, value)` pairs.
    pub fn filter<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Filter(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    #[must_use]
    pub const fn is_scalar(&self) -> bool {
        matches!(self, Self::Key(_))
    }
}

impl From<Key> for Criteria {
    fn from(key: Key) -> Self {
        Self::Key(Value::from(key))
    }
}

impl From<i64> for Criteria {
    fn from(n: i64) -> Self {
        Self::Key(Value::Int(n))
    }
}

impl From<&str> for Criteria {
    fn from(s: &str) -> Self {
        Self::Key(Value::text(s))
    }
}

impl From<Filter> for Criteria {
    fn from(filter: Filter) -> Self {
        Self::Filter(filter)
    }
}

/// Lookup path selected from the criteria kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Find-one path. `None` when the scalar can never be a stored key.
    One(Option<Key>),
    Many(Filter),
}

/// The CriteriaNormalizer canonicalizes criteria. Pure transforms only.
pub struct CriteriaNormalizer;

impl CriteriaNormalizer {
    /// Select the lookup path for `criteria`.
    ///
    /// A scalar that is not a usable key selects nothing rather than failing.
    #[must_use]
    pub fn normalize(criteria: &Criteria) -> Lookup {
        match criteria {
            Criteria::Key(value) => Lookup::One(value.as_key()),
            Criteria::Filter(filter) => Lookup::Many(filter.clone()),
        }
    }

    /// Convert a value about to be stored as a foreign key.
    ///
    /// Returns `FootprintError::Validation` if the value is not a usable key.
    pub fn key(value: &Value) -> Result<Key> {
        value.as_key().ok_or_else(|| {
            FootprintError::Validation(format!("Invalid primary key value: {value}"))
        })
    }

    /// Normalize child-side criteria of an association into a filter.
    ///
    /// A scalar becomes an equality on the target's primary key. A scalar
    /// that is not a usable key stays as given and matches no record.
    #[must_use]
    pub fn child_filter(criteria: &Criteria, target: &EntityType) -> Filter {
        match criteria {
            Criteria::Key(value) => {
                let mut filter = Filter::new();
                let value = value.as_key().map_or_else(|| value.clone(), Value::from);
                filter.insert(target.primary_key().to_string(), value);
                filter
            }
            Criteria::Filter(filter) => filter.clone(),
        }
    }
}

/// Evaluate `filter` against one record of `entity`.
///
/// Names may be the primary key, a leaf field (missing reads as `Null`), or
/// a `toOne` relation (compared by foreign key). Anything else fails with
/// `FootprintError::Validation`. Used by collaborators that evaluate
/// filters in memory.
pub fn filter_matches<'a, F, L>(
    filter: &Filter,
    entity: &EntityType,
    key: Option<Key>,
    field: F,
    link: L,
) -> Result<bool>
where
    F: Fn(&str) -> Option<&'a Value>,
    L: Fn(&str) -> Option<Key>,
{
    for (name, expected) in filter {
        let matched = if name == entity.primary_key() {
            key.is_some() && expected.as_key() == key
        } else if entity.field(name).is_some() {
            field(name).unwrap_or(&Value::Null) == expected
        } else if let Some(relation) = entity.relation(name) {
            if relation.cardinality != Cardinality::ToOne {
                return Err(FootprintError::Validation(format!(
                    "Cannot filter '{}' on to_many relation '{}'",
                    entity.name(),
                    name
                )));
            }
            match link(name) {
                Some(linked) => expected.as_key() == Some(linked),
                None => expected.is_null(),
            }
        } else {
            return Err(FootprintError::Validation(format!(
                "Unknown field '{}' on '{}'",
                name,
                entity.name()
            )));
        };

        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, Relation};

    fn todo() -> EntityType {
        EntityType::new("Todo")
            .with_field(FieldDef::text("task"))
            .with_field(FieldDef::boolean("done").optional())
            .with_relation(Relation::to_one("creator", "User"))
    }

    #[test]
    fn scalar_selects_find_one() {
        assert_eq!(
            CriteriaNormalizer::normalize(&Criteria::from(3)),
            Lookup::One(Some(Key(3)))
        );
        assert_eq!(
            CriteriaNormalizer::normalize(&Criteria::from("4")),
            Lookup::One(Some(Key(4)))
        );
    }

    #[test]
    fn object_passes_through_unchanged() {
        let criteria = Criteria::filter([("unknown", 1)]);
        let Lookup::Many(filter) = CriteriaNormalizer::normalize(&criteria) else {
            unreachable!("object criteria must select find-many");
        };
        assert_eq!(filter.get("unknown"), Some(&Value::Int(1)));
    }

    #[test]
    fn unusable_scalar_selects_nothing() {
        for value in [Value::Bool(true), Value::Int(-1), Value::text("abc")] {
            assert_eq!(
                CriteriaNormalizer::normalize(&Criteria::Key(value)),
                Lookup::One(None)
            );
        }
    }

    #[test]
    fn unusable_value_is_not_a_foreign_key() {
        let result = CriteriaNormalizer::key(&Value::Int(-1));
        assert!(matches!(result, Err(FootprintError::Validation(_))));
    }

    #[test]
    fn scalar_child_criteria_targets_primary_key() {
        let filter = CriteriaNormalizer::child_filter(&Criteria::from(9), &todo());
        assert_eq!(filter.get("id"), Some(&Value::Int(9)));
    }

    #[test]
    fn unusable_child_key_matches_nothing() {
        let entity = todo();
        let filter = CriteriaNormalizer::child_filter(&Criteria::from("abc"), &entity);
        let matched = filter_matches(&filter, &entity, Some(Key(1)), |_: &str| None, |_: &str| None)
            .expect("match");
        assert!(!matched);
    }

    #[test]
    fn filter_is_conjunctive() {
        let entity = todo();
        let task = Value::text("Buy cheese");
        let field = |name: &str| (name == "task").then_some(&task);
        let no_link = |_: &str| None;

        let both = Criteria::filter([("task", Value::text("Buy cheese")), ("done", Value::Null)]);
        let Criteria::Filter(both) = both else {
            unreachable!()
        };
        assert!(filter_matches(&both, &entity, Some(Key(1)), field, no_link).expect("match"));

        let mismatch = Criteria::filter([("task", Value::text("Buy cheese")), ("done", Value::Bool(true))]);
        let Criteria::Filter(mismatch) = mismatch else {
            unreachable!()
        };
        assert!(!filter_matches(&mismatch, &entity, Some(Key(1)), field, no_link).expect("match"));
    }

    #[test]
    fn filter_compares_foreign_keys_and_rejects_unknown_names() {
        let entity = todo();
        let field = |_: &str| None;
        let link = |name: &str| (name == "creator").then_some(Key(5));

        let mut by_creator = Filter::new();
        by_creator.insert("creator".into(), Value::Int(5));
        assert!(filter_matches(&by_creator, &entity, Some(Key(1)), field, link).expect("match"));

        let mut unknown = Filter::new();
        unknown.insert("colour".into(), Value::text("red"));
        assert!(filter_matches(&unknown, &entity, Some(Key(1)), field, link).is_err());
    }
}
