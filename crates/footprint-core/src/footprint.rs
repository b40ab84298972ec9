//! # Footprint Dispatcher
//!
//! The public surface: `create`, `find`, `update`, `destroy` and their
//! association counterparts over any registered entity type.
//!
//! Every operation follows the same sequence:
//! normalize criteria -> resolve relation -> build graph -> stage -> flush.
//!
//! ## Guarantees
//!
//! - One fresh manager per operation; nothing is cached between calls
//! - At most one flush per operation, issued after all changes are staged
//! - Any collaborator failure short-circuits the operation unchanged

use crate::builder::GraphBuilder;
use crate::criteria::{Criteria, CriteriaNormalizer, Filter, Lookup, filter_matches};
use crate::manager::{Datastore, Manager, QueryBuilder};
use crate::options::{FootprintConfig, Options, Populate};
use crate::payload::Payload;
use crate::populator::{FieldPopulator, Populator};
use crate::resolver::{RelationResolver, ResolvedRelation};
use crate::schema::{Cardinality, EntityType, Schema};
use crate::{Affected, Found, Key, NotFound, Record, Related, Result, Value};
use tracing::debug;

/// Generic data-access façade over a `Datastore`.
///
/// The store, the populator and the defaults are injected; the dispatcher
/// holds no other state.
#[derive(Debug)]
pub struct Footprint<S: Datastore, P: Populator = FieldPopulator> {
    store: S,
    populator: P,
    config: FootprintConfig,
}

impl<S: Datastore> Footprint<S> {
    /// Create a dispatcher with the schema-checked populator and default
    /// configuration.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store,
            populator: FieldPopulator,
            config: FootprintConfig::default(),
        }
    }
}

impl<S: Datastore, P: Populator> Footprint<S, P> {
    /// Replace the leaf-field populator.
    #[must_use]
    pub fn with_populator<Q: Populator>(self, populator: Q) -> Footprint<S, Q> {
        Footprint {
            store: self.store,
            populator,
            config: self.config,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: FootprintConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        self.store.schema()
    }

    #[must_use]
    pub fn config(&self) -> &FootprintConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    fn builder(&self) -> GraphBuilder<'_, P> {
        GraphBuilder::new(self.store.schema(), &self.populator)
    }

    // =========================================================================
    // PRIMARY CRUD
    // =========================================================================

    /// Build `payload` into a new `entity` graph and persist it.
    ///
    /// Returns the built record with its store-assigned key.
    pub async fn create(&self, entity: &str, payload: &Payload, options: &Options) -> Result<Record> {
        let entity_type = RelationResolver::entity(self.schema(), entity)?;
        let depth = options.recursion_depth();

        let mut record = self.builder().build(entity_type, payload, None, depth)?;

        let mut manager = self.store.manager();
        manager.persist(&mut record)?;
        manager.flush().await?;

        debug!(entity, key = ?record.key(), depth, "created record");
        Ok(record)
    }

    /// Look records up. A scalar criteria returns at most one record; a
    /// filter returns every match in key order.
    pub async fn find(&self, entity: &str, criteria: &Criteria, options: &Options) -> Result<Found> {
        let entity_type = RelationResolver::entity(self.schema(), entity)?;
        let options = self.config.apply(options);
        let manager = self.store.manager();

        let found = match CriteriaNormalizer::normalize(criteria) {
            Lookup::One(Some(key)) => {
                Found::One(manager.find_one(entity_type, key, &options).await?)
            }
            Lookup::One(None) => Found::One(None),
            Lookup::Many(filter) => {
                Found::Many(manager.find_many(entity_type, &filter, &options).await?)
            }
        };

        debug!(entity, scalar = criteria.is_scalar(), "found records");
        Ok(found)
    }

    /// Apply `payload` to every record matching `criteria`.
    ///
    /// Fails `NotFound::Record` when nothing matches. The result shape
    /// mirrors the criteria kind.
    pub async fn update(
        &self,
        entity: &str,
        criteria: &Criteria,
        payload: &Payload,
        options: &Options,
    ) -> Result<Affected> {
        let entity_type = RelationResolver::entity(self.schema(), entity)?;
        let depth = options.recursion_depth();
        let lookup_options = Options {
            populate: Self::populate_for(entity_type, payload, depth),
            ..options.clone()
        };

        let mut manager = self.store.manager();
        let located = Self::locate(&manager, entity_type, criteria, &lookup_options).await?;

        let builder = self.builder();
        let mut mutate = |existing: Record| -> Result<Record> {
            let mut record = builder.build(entity_type, payload, Some(existing), depth)?;
            manager.persist(&mut record)?;
            Ok(record)
        };
        let affected = match located {
            Affected::One(record) => Affected::One(mutate(record)?),
            Affected::Many(records) => Affected::Many(
                records
                    .into_iter()
                    .map(&mut mutate)
                    .collect::<Result<Vec<_>>>()?,
            ),
        };
        manager.flush().await?;

        debug!(entity, count = affected.len(), depth, "updated records");
        Ok(affected)
    }

    /// Remove every record matching `criteria`.
    ///
    /// Fails `NotFound::Record` when nothing matches. Returns the removed
    /// records in the shape of the criteria kind.
    pub async fn destroy(&self, entity: &str, criteria: &Criteria, options: &Options) -> Result<Affected> {
        let entity_type = RelationResolver::entity(self.schema(), entity)?;

        let mut manager = self.store.manager();
        let located = Self::locate(&manager, entity_type, criteria, options).await?;

        match &located {
            Affected::One(record) => manager.remove(record)?,
            Affected::Many(records) => {
                for record in records {
                    manager.remove(record)?;
                }
            }
        }
        manager.flush().await?;

        debug!(entity, count = located.len(), "destroyed records");
        Ok(located)
    }

    // =========================================================================
    // ASSOCIATIONS
    // =========================================================================

    /// Build `payload` as a new `attribute` child of the parent record.
    ///
    /// `toMany` appends to the collection; `toOne` replaces the link.
    /// Returns the parent with the association populated.
    pub async fn create_association(
        &self,
        parent: &str,
        parent_id: &Value,
        attribute: &str,
        payload: &Payload,
        options: &Options,
    ) -> Result<Record> {
        let resolved = RelationResolver::resolve(self.schema(), parent, attribute)?;
        let key = Self::parent_key(parent_id)?;
        let depth = options.recursion_depth();

        let mut manager = self.store.manager();
        let mut record = manager
            .find_one(resolved.parent, key, &Self::populating(attribute))
            .await?
            .ok_or(NotFound::Record)?;

        let child = self.builder().build(resolved.target, payload, None, depth)?;
        match resolved.cardinality() {
            Cardinality::ToMany => record.push_many(attribute, child),
            Cardinality::ToOne => {
                record.set_related(attribute, Related::One(Some(Box::new(child))));
            }
        }

        manager.persist(&mut record)?;
        manager.flush().await?;

        debug!(parent, %key, attribute, depth, "created association");
        Ok(record)
    }

    /// Fetch the parent with `attribute` loaded and narrowed to the
    /// children matching `criteria`.
    ///
    /// Returns `None` when the parent does not exist. A scalar criteria
    /// selects the child by primary key.
    pub async fn find_association(
        &self,
        parent: &str,
        parent_id: &Value,
        attribute: &str,
        criteria: &Criteria,
        options: &Options,
    ) -> Result<Option<Record>> {
        let resolved = RelationResolver::resolve(self.schema(), parent, attribute)?;
        let Some(key) = parent_id.as_key() else {
            return Ok(None);
        };
        let manager = self.store.manager();

        Self::narrow(&manager, &resolved, key, criteria, options).await
    }

    /// Apply `values` to the children matching `criteria`.
    ///
    /// Children are built one level below the parent, at `recursive - 1`.
    /// Fails `NotFound::Record` when the parent or every child is missing.
    pub async fn update_association(
        &self,
        parent: &str,
        parent_id: &Value,
        attribute: &str,
        criteria: &Criteria,
        values: &Payload,
        options: &Options,
    ) -> Result<Record> {
        let resolved = RelationResolver::resolve(self.schema(), parent, attribute)?;
        let key = Self::parent_key(parent_id)?;
        let depth = options.recursion_depth().saturating_sub(1);

        let mut manager = self.store.manager();
        let mut record = Self::narrow(&manager, &resolved, key, criteria, options)
            .await?
            .ok_or(NotFound::Record)?;

        let builder = self.builder();
        let updated = match resolved.cardinality() {
            Cardinality::ToOne => {
                let child = record.take_one(attribute).ok_or(NotFound::Record)?;
                Related::One(Some(Box::new(builder.build(
                    resolved.target,
                    values,
                    Some(child),
                    depth,
                )?)))
            }
            Cardinality::ToMany => {
                let children = record.take_many(attribute);
                if children.is_empty() {
                    return Err(NotFound::Record.into());
                }
                Related::Many(
                    children
                        .into_iter()
                        .map(|child| builder.build(resolved.target, values, Some(child), depth))
                        .collect::<Result<Vec<_>>>()?,
                )
            }
        };
        record.set_related(attribute, updated);

        manager.persist(&mut record)?;
        manager.flush().await?;

        debug!(parent, %key, attribute, depth, "updated association");
        Ok(record)
    }

    /// Remove the children matching `criteria`. Children outside the match
    /// are never touched.
    ///
    /// Returns the parent; the association comes back empty.
    pub async fn destroy_association(
        &self,
        parent: &str,
        parent_id: &Value,
        attribute: &str,
        criteria: &Criteria,
        options: &Options,
    ) -> Result<Record> {
        let resolved = RelationResolver::resolve(self.schema(), parent, attribute)?;
        let key = Self::parent_key(parent_id)?;

        let mut manager = self.store.manager();
        let mut record = Self::narrow(&manager, &resolved, key, criteria, options)
            .await?
            .ok_or(NotFound::Record)?;

        let removed = match resolved.cardinality() {
            Cardinality::ToOne => {
                let child = record.take_one(attribute).ok_or(NotFound::Record)?;
                manager.remove(&child)?;
                // Clear the foreign key left on the parent row.
                record.set_related(attribute, Related::One(None));
                manager.persist(&mut record)?;
                1
            }
            Cardinality::ToMany => {
                let children = record.take_many(attribute);
                if children.is_empty() {
                    return Err(NotFound::Record.into());
                }
                for child in &children {
                    manager.remove(child)?;
                }
                record.set_related(attribute, Related::Many(Vec::new()));
                children.len()
            }
        };
        manager.flush().await?;

        debug!(parent, %key, attribute, removed, "destroyed association");
        Ok(record)
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    /// A parent id that can never be a stored key names no record.
    fn parent_key(parent_id: &Value) -> Result<Key> {
        parent_id.as_key().ok_or_else(|| NotFound::Record.into())
    }

    fn populating(attribute: &str) -> Options {
        Options::new().with_populate(Populate::Attribute(attribute.to_string()))
    }

    /// Relations to load before mutating: inline children can only be
    /// mutated in place if they were loaded.
    fn populate_for(entity: &EntityType, payload: &Payload, depth: u32) -> Populate {
        let touches_relation = payload
            .iter()
            .any(|(name, _)| entity.relation(name).is_some());
        if depth > 0 && touches_relation {
            Populate::All
        } else {
            Populate::None
        }
    }

    /// Look up the records `update` and `destroy` act on.
    async fn locate(
        manager: &S::Manager,
        entity: &EntityType,
        criteria: &Criteria,
        options: &Options,
    ) -> Result<Affected> {
        match CriteriaNormalizer::normalize(criteria) {
            Lookup::One(Some(key)) => manager
                .find_one(entity, key, options)
                .await?
                .map(Affected::One)
                .ok_or_else(|| NotFound::Record.into()),
            Lookup::One(None) => Err(NotFound::Record.into()),
            Lookup::Many(filter) => {
                let found = manager.find_many(entity, &filter, options).await?;
                if found.is_empty() {
                    return Err(NotFound::Record.into());
                }
                Ok(Affected::Many(found))
            }
        }
    }

    /// The parent with its association narrowed to `criteria`, read through
    /// the operation's own manager.
    async fn narrow(
        manager: &S::Manager,
        resolved: &ResolvedRelation<'_>,
        key: Key,
        criteria: &Criteria,
        options: &Options,
    ) -> Result<Option<Record>> {
        let attribute = resolved.attribute();
        let child_filter = CriteriaNormalizer::child_filter(criteria, resolved.target);

        match resolved.cardinality() {
            Cardinality::ToOne => {
                let Some(mut record) = manager
                    .find_one(resolved.parent, key, &Self::populating(attribute))
                    .await?
                else {
                    return Ok(None);
                };

                let linked = record.one(attribute).and_then(Record::key);
                if let Some(child_key) = linked
                    && !child_filter.is_empty()
                {
                    // Relations of the child are needed to compare foreign keys.
                    let loaded = Options::new().with_populate(Populate::All);
                    let child = manager
                        .find_one(resolved.target, child_key, &loaded)
                        .await?;
                    let matched = match &child {
                        Some(child) => filter_matches(
                            &child_filter,
                            resolved.target,
                            child.key(),
                            |name: &str| child.get(name),
                            |name: &str| child.one(name).and_then(Record::key),
                        )?,
                        None => false,
                    };
                    if !matched {
                        record.set_related(attribute, Related::One(None));
                    }
                }
                Ok(Some(record))
            }
            Cardinality::ToMany => {
                let mut parent_filter = Filter::new();
                parent_filter.insert(resolved.parent.primary_key().to_string(), Value::from(key));

                let query = QueryBuilder::new(resolved.parent.name(), "parent")
                    .filter(parent_filter)
                    .join(attribute, "child")
                    .filter_joined(child_filter)
                    .limit(options.limit)
                    .offset(options.offset)
                    .build();

                Ok(manager.get_result(&query).await?.into_iter().next())
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, Relation};
    use crate::storage::RedbStore;
    use crate::FootprintError;

    fn footprint() -> Footprint<RedbStore> {
        let schema = Schema::from_entities([
            EntityType::new("User").with_field(FieldDef::text("name").max_size(24)),
            EntityType::new("List")
                .with_field(FieldDef::text("name"))
                .with_relation(Relation::to_many("todos", "Todo", "list")),
            EntityType::new("Todo")
                .with_field(FieldDef::text("task"))
                .with_field(FieldDef::boolean("done").optional())
                .with_relation(Relation::to_one("list", "List"))
                .with_relation(Relation::to_one("creator", "User")),
        ])
        .expect("schema");
        Footprint::new(RedbStore::in_memory(schema).expect("store"))
    }

    #[tokio::test]
    async fn unregistered_entity_is_not_found() {
        let footprint = footprint();
        let result = footprint
            .create("Cake", &Payload::new(), &Options::new())
            .await;
        assert!(matches!(
            result,
            Err(FootprintError::NotFound(NotFound::Entity(_)))
        ));
    }

    #[tokio::test]
    async fn update_mirrors_criteria_shape() {
        let footprint = footprint();
        for name in ["Raphaela", "Isaac"] {
            footprint
                .create("User", &Payload::new().with("name", name), &Options::new())
                .await
                .expect("create");
        }

        let one = footprint
            .update(
                "User",
                &Criteria::from(1),
                &Payload::new().with("name", "Rapha"),
                &Options::new(),
            )
            .await
            .expect("update");
        assert!(matches!(one, Affected::One(_)));

        let many = footprint
            .update(
                "User",
                &Criteria::filter([("name", "Isaac")]),
                &Payload::new().with("name", "Ike"),
                &Options::new(),
            )
            .await
            .expect("update");
        assert!(matches!(many, Affected::Many(ref records) if records.len() == 1));
    }

    #[tokio::test]
    async fn empty_multi_match_rejects() {
        let footprint = footprint();
        let result = footprint
            .destroy("User", &Criteria::filter([("name", "Nobody")]), &Options::new())
            .await;
        assert!(matches!(
            result,
            Err(FootprintError::NotFound(NotFound::Record))
        ));
    }

    #[tokio::test]
    async fn to_one_association_respects_child_criteria() {
        let footprint = footprint();
        let todo = Payload::new()
            .with("task", "Save the galaxy")
            .with("creator", Payload::new().with("name", "Frank"));
        footprint
            .create("Todo", &todo, &Options::new())
            .await
            .expect("create");

        let miss = footprint
            .find_association(
                "Todo",
                &Value::Int(1),
                "creator",
                &Criteria::filter([("name", "Isaac")]),
                &Options::new(),
            )
            .await
            .expect("find")
            .expect("todo");
        assert!(miss.one("creator").is_none());

        let update = footprint
            .update_association(
                "Todo",
                &Value::Int(1),
                "creator",
                &Criteria::filter([("name", "Isaac")]),
                &Payload::new().with("name", "Ike"),
                &Options::new(),
            )
            .await;
        assert!(matches!(
            update,
            Err(FootprintError::NotFound(NotFound::Record))
        ));
    }
}
