//! # Relation Resolver
//!
//! Looks up entity types and relations in the mapping registry.
//!
//! Resolution is recomputed on every call. The registry is immutable for the
//! lifetime of a store, so there is nothing to invalidate.

use crate::schema::{Cardinality, EntityType, Relation, Schema};
use crate::{NotFound, Result};

/// A relation together with both ends of it.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedRelation<'a> {
    pub parent: &'a EntityType,
    pub relation: &'a Relation,
    pub target: &'a EntityType,
}

impl ResolvedRelation<'_> {
    #[must_use]
    pub fn cardinality(&self) -> Cardinality {
        self.relation.cardinality
    }

    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.relation.name
    }
}

/// The RelationResolver maps names to registry entries.
///
/// Each failure is a distinct `NotFound` cause, so callers can tell a
/// missing entity type from a missing association.
pub struct RelationResolver;

impl RelationResolver {
    /// Resolve a registered entity type.
    ///
    /// Returns `NotFound::Entity` if `name` is not registered.
    pub fn entity<'a>(schema: &'a Schema, name: &str) -> Result<&'a EntityType> {
        schema
            .entity(name)
            .ok_or_else(|| NotFound::Entity(name.to_string()).into())
    }

    /// Resolve `attribute` on `parent` to a relation and its target type.
    ///
    /// Returns:
    /// - `NotFound::Entity` if `parent` is not registered
    /// - `NotFound::Association` if `attribute` is not a relation on it
    /// - `NotFound::Entity` if the relation's target is not registered
    pub fn resolve<'a>(
        schema: &'a Schema,
        parent: &str,
        attribute: &str,
    ) -> Result<ResolvedRelation<'a>> {
        let parent = Self::entity(schema, parent)?;
        let relation = parent
            .relation(attribute)
            .ok_or_else(|| NotFound::Association {
                entity: parent.name().to_string(),
                attribute: attribute.to_string(),
            })?;
        let target = Self::entity(schema, &relation.target)?;

        Ok(ResolvedRelation {
            parent,
            relation,
            target,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
