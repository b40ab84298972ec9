//! # Graph Builder
//!
//! Expands a payload into an entity graph, bounded by a depth counter.
//!
//! The builder never persists anything. The returned graph is handed to the
//! manager by the caller once construction has finished.
//!
//! ## Depth
//!
//! `depth` is the number of relation levels still allowed to expand. At
//! depth 0, relation entries stop descending:
//! - on construction, a `toOne` identifier is still attached as a reference
//!   (it is a plain foreign key) and everything else is dropped
//! - on mutation, relation entries are left untouched

use crate::payload::{ChildRef, Input, Payload};
use crate::populator::Populator;
use crate::primitives::MAX_RECURSION_DEPTH;
use crate::resolver::RelationResolver;
use crate::schema::{Cardinality, EntityType, Relation, Schema};
use crate::{CriteriaNormalizer, Record, Related, Result};

/// Builds entity graphs from payloads.
pub struct GraphBuilder<'a, P: Populator> {
    schema: &'a Schema,
    populator: &'a P,
}

impl<'a, P: Populator> GraphBuilder<'a, P> {
    #[must_use]
    pub fn new(schema: &'a Schema, populator: &'a P) -> Self {
        Self { schema, populator }
    }

    /// Build an instance of `entity` from `payload`.
    ///
    /// With `existing == None` a new instance is constructed; otherwise the
    /// given instance is mutated and returned. `depth` is clamped to
    /// `MAX_RECURSION_DEPTH`.
    pub fn build(
        &self,
        entity: &EntityType,
        payload: &Payload,
        existing: Option<Record>,
        depth: u32,
    ) -> Result<Record> {
        self.build_level(entity, payload, existing, depth.min(MAX_RECURSION_DEPTH))
    }

    fn build_level(
        &self,
        entity: &EntityType,
        payload: &Payload,
        existing: Option<Record>,
        depth: u32,
    ) -> Result<Record> {
        let mutating = existing.is_some();
        let mut record = self.populator.assign_fields(entity, payload, existing)?;

        for (attribute, input) in payload.iter() {
            let Some(relation) = entity.relation(attribute) else {
                continue;
            };
            let target = RelationResolver::entity(self.schema, &relation.target)?;

            if depth == 0 {
                if !mutating {
                    Self::attach_reference_only(&mut record, relation, target, input)?;
                }
                continue;
            }

            match relation.cardinality {
                Cardinality::ToOne => {
                    let child = match input.as_child_ref()? {
                        ChildRef::Identifier(value) if value.is_null() => None,
                        ChildRef::Identifier(value) => Some(Record::reference(
                            target.name(),
                            CriteriaNormalizer::key(value)?,
                        )),
                        ChildRef::Inline(nested) => {
                            // Mutate the loaded child in place, construct otherwise.
                            let loaded = record
                                .take_one(attribute)
                                .filter(|child| !child.is_reference());
                            Some(self.build_level(target, nested, loaded, depth - 1)?)
                        }
                    };
                    record.set_related(attribute, Related::One(child.map(Box::new)));
                }
                Cardinality::ToMany => {
                    for item in input.as_child_refs()? {
                        let child = match item {
                            ChildRef::Identifier(value) => {
                                Record::reference(target.name(), CriteriaNormalizer::key(value)?)
                            }
                            ChildRef::Inline(nested) => {
                                self.build_level(target, nested, None, depth - 1)?
                            }
                        };
                        record.push_many(attribute, child);
                    }
                }
            }
        }

        Ok(record)
    }

    fn attach_reference_only(
        record: &mut Record,
        relation: &Relation,
        target: &EntityType,
        input: &Input,
    ) -> Result<()> {
        if relation.cardinality != Cardinality::ToOne {
            return Ok(());
        }
        if let ChildRef::Identifier(value) = input.as_child_ref()?
            && !value.is_null()
        {
            let reference = Record::reference(target.name(), CriteriaNormalizer::key(value)?);
            record.set_related(&relation.name, Related::One(Some(Box::new(reference))));
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::populator::FieldPopulator;
    use crate::schema::{FieldDef, Relation};
    use crate::{FootprintError, Key, RecordState, Value};

    fn schema() -> Schema {
        Schema::from_entities([
            EntityType::new("User").with_field(FieldDef::text("name")),
            EntityType::new("List")
                .with_field(FieldDef::text("name"))
                .with_relation(Relation::to_many("todos", "Todo", "list")),
            EntityType::new("Todo")
                .with_field(FieldDef::text("task"))
                .with_field(FieldDef::boolean("done").optional())
                .with_relation(Relation::to_one("list", "List"))
                .with_relation(Relation::to_one("creator", "User")),
        ])
        .expect("schema")
    }

    fn nested_list() -> Payload {
        Payload::new().with("name", "Goals").with_list(
            "todos",
            vec![
                Payload::new()
                    .with("task", "Pet all the cats")
                    .with("creator", Payload::new().with("name", "Wesley"))
                    .into(),
                Payload::new()
                    .with("task", "Water plants")
                    .with("creator", 1)
                    .into(),
            ],
        )
    }

    #[test]
    fn depth_two_materializes_three_levels() {
        let schema = schema();
        let builder = GraphBuilder::new(&schema, &FieldPopulator);
        let list = schema.entity("List").expect("list");

        let record = builder
            .build(list, &nested_list(), None, 2)
            .expect("build");

        let todos = record.many("todos");
        assert_eq!(todos.len(), 2);
        assert_eq!(todos[0].get("task"), Some(&Value::text("Pet all the cats")));

        let wesley = todos[0].one("creator").expect("creator");
        assert_eq!(wesley.state(), RecordState::New);
        assert_eq!(wesley.get("name"), Some(&Value::text("Wesley")));

        let referenced = todos[1].one("creator").expect("creator");
        assert!(referenced.is_reference());
        assert_eq!(referenced.key(), Some(Key(1)));
    }

    #[test]
    fn depth_one_leaves_grandchildren_unexpanded() {
        let schema = schema();
        let builder = GraphBuilder::new(&schema, &FieldPopulator);
        let list = schema.entity("List").expect("list");

        let record = builder
            .build(list, &nested_list(), None, 1)
            .expect("build");

        let todos = record.many("todos");
        assert_eq!(todos.len(), 2);
        assert!(todos[0].one("creator").is_none());
        // Identifiers are plain foreign keys and survive at depth 0.
        assert_eq!(
            todos[1].one("creator").and_then(Record::key),
            Some(Key(1))
        );
    }

    #[test]
    fn depth_zero_on_mutation_leaves_relations_untouched() {
        let schema = schema();
        let builder = GraphBuilder::new(&schema, &FieldPopulator);
        let todo = schema.entity("Todo").expect("todo");

        let existing = Record::managed("Todo", Key(4), Default::default());
        let payload = Payload::new().with("task", "Renamed").with("creator", 2);
        let record = builder
            .build(todo, &payload, Some(existing), 0)
            .expect("build");

        assert_eq!(record.get("task"), Some(&Value::text("Renamed")));
        assert!(record.related("creator").is_none());
    }

    #[test]
    fn to_many_appends_to_loaded_collection() {
        let schema = schema();
        let builder = GraphBuilder::new(&schema, &FieldPopulator);
        let list = schema.entity("List").expect("list");

        let mut existing = Record::managed("List", Key(1), Default::default());
        existing.push_many("todos", Record::reference("Todo", Key(7)));

        let payload = Payload::new().with_list(
            "todos",
            vec![Payload::new().with("task", "Eat cake").into()],
        );
        let record = builder
            .build(list, &payload, Some(existing), 1)
            .expect("build");

        let todos = record.many("todos");
        assert_eq!(todos.len(), 2);
        assert_eq!(todos[0].key(), Some(Key(7)));
        assert_eq!(todos[1].get("task"), Some(&Value::text("Eat cake")));
    }

    #[test]
    fn cardinality_shape_mismatch_is_rejected() {
        let schema = schema();
        let builder = GraphBuilder::new(&schema, &FieldPopulator);
        let todo = schema.entity("Todo").expect("todo");
        let list = schema.entity("List").expect("list");

        let list_for_to_one = Payload::new()
            .with("task", "x")
            .with_list("creator", vec![Input::from(1)]);
        assert!(matches!(
            builder.build(todo, &list_for_to_one, None, 1),
            Err(FootprintError::Validation(_))
        ));

        let object_for_to_many = Payload::new()
            .with("name", "x")
            .with("todos", Payload::new().with("task", "y"));
        assert!(matches!(
            builder.build(list, &object_for_to_many, None, 1),
            Err(FootprintError::Validation(_))
        ));
    }

    #[test]
    fn null_identifier_detaches_to_one() {
        let schema = schema();
        let builder = GraphBuilder::new(&schema, &FieldPopulator);
        let todo = schema.entity("Todo").expect("todo");

        let mut existing = Record::managed("Todo", Key(1), Default::default());
        existing.set_related(
            "creator",
            Related::One(Some(Box::new(Record::reference("User", Key(2))))),
        );

        let record = builder
            .build(todo, &Payload::new().with("creator", Value::Null), Some(existing), 1)
            .expect("build");
        assert_eq!(record.related("creator"), Some(&Related::One(None)));
    }
}
