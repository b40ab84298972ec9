//! # Manager Contracts
//!
//! The persistence collaborator the dispatcher talks through.
//!
//! A `Datastore` hands out one `Manager` per logical operation. The manager
//! is a unit of work: `persist` and `remove` only stage changes, and a single
//! `flush` applies everything staged.

use crate::criteria::Filter;
use crate::options::Options;
use crate::schema::{EntityType, Schema};
use crate::{Key, Record, Result};

// =============================================================================
// QUERY BUILDER
// =============================================================================

/// A related collection joined onto the root of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    /// Relation attribute on the root entity type.
    pub attribute: String,
    pub alias: String,
    /// Filter applied to joined records.
    pub filter: Filter,
}

/// A built query: root records matching `filter`, optionally with one
/// relation loaded and filtered.
///
/// When a join is present, `limit` and `offset` page the joined collection
/// of each root record; otherwise they page the root records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub entity: String,
    pub alias: String,
    /// Leaf fields kept on root records. `None` keeps every field.
    pub select: Option<Vec<String>>,
    pub filter: Filter,
    pub join: Option<Join>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Fluent construction of a `Query`.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    #[must_use]
    pub fn new(entity: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            query: Query {
                entity: entity.into(),
                alias: alias.into(),
                select: None,
                filter: Filter::new(),
                join: None,
                limit: None,
                offset: None,
            },
        }
    }

    /// Restrict the leaf fields returned on root records. The primary key
    /// is always returned.
    #[must_use]
    pub fn select<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        self.query.select = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Add equality conditions on the root records.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.query.filter.extend(filter);
        self
    }

    /// Load `attribute` on every root record.
    #[must_use]
    pub fn join(mut self, attribute: impl Into<String>, alias: impl Into<String>) -> Self {
        self.query.join = Some(Join {
            attribute: attribute.into(),
            alias: alias.into(),
            filter: Filter::new(),
        });
        self
    }

    /// Add equality conditions on the joined records. No-op without a join.
    #[must_use]
    pub fn filter_joined(mut self, filter: Filter) -> Self {
        if let Some(join) = self.query.join.as_mut() {
            join.filter.extend(filter);
        }
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.query.limit = limit;
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: Option<usize>) -> Self {
        self.query.offset = offset;
        self
    }

    #[must_use]
    pub fn build(self) -> Query {
        self.query
    }
}

// =============================================================================
// COLLABORATOR TRAITS
// =============================================================================

/// Request-scoped unit of work over a store.
///
/// All fallible operations return `FootprintError::Validation` for bad
/// filters and `FootprintError::Persistence` for storage failures.
pub trait Manager {
    /// Fetch one record by primary key, honouring `options.populate`.
    async fn find_one(
        &self,
        entity: &EntityType,
        key: Key,
        options: &Options,
    ) -> Result<Option<Record>>;

    /// Fetch every record matching `filter`, in key order, honouring
    /// `options.populate`, `options.limit` and `options.offset`.
    async fn find_many(
        &self,
        entity: &EntityType,
        filter: &Filter,
        options: &Options,
    ) -> Result<Vec<Record>>;

    /// Execute a built query.
    async fn get_result(&self, query: &Query) -> Result<Vec<Record>>;

    /// Stage `record` and every loaded relation under it for the next flush.
    ///
    /// New records receive their key here.
    fn persist(&mut self, record: &mut Record) -> Result<()>;

    /// Stage removal of `record` for the next flush.
    fn remove(&mut self, record: &Record) -> Result<()>;

    /// Apply everything staged. Either all of it lands or none of it does.
    async fn flush(&mut self) -> Result<()>;
}

/// A store that hands out request-scoped managers.
pub trait Datastore {
    type Manager: Manager;

    /// The mapping registry the store was opened with.
    fn schema(&self) -> &Schema;

    /// Open a fresh unit of work.
    fn manager(&self) -> Self::Manager;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;

    #[test]
    fn builder_collects_root_and_joined_filters() {
        let mut parent = Filter::new();
        parent.insert("id".into(), Value::Int(2));
        let mut child = Filter::new();
        child.insert("done".into(), Value::Bool(true));

        let query = QueryBuilder::new("List", "p")
            .filter(parent)
            .join("todos", "c")
            .filter_joined(child)
            .limit(Some(1))
            .build();

        assert_eq!(query.filter.get("id"), Some(&Value::Int(2)));
        let join = query.join.expect("join");
        assert_eq!(join.attribute, "todos");
        assert_eq!(join.filter.get("done"), Some(&Value::Bool(true)));
        assert_eq!(query.limit, Some(1));
    }

    #[test]
    fn select_defaults_to_every_field() {
        let query = QueryBuilder::new("Todo", "t").build();
        assert!(query.select.is_none());

        let query = QueryBuilder::new("Todo", "t").select(["task"]).build();
        assert_eq!(query.select, Some(vec!["task".to_string()]));
    }

    #[test]
    fn joined_filter_without_join_is_ignored() {
        let mut child = Filter::new();
        child.insert("done".into(), Value::Bool(true));

        let query = QueryBuilder::new("List", "p").filter_joined(child).build();
        assert!(query.join.is_none());
    }
}
