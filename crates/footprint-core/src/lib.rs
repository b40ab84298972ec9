//! # footprint-core
//!
//! A generic data-access façade - THE FOOTPRINT LAYER.
//!
//! Uniform create/find/update/destroy operations, plus their nested
//! association variants, over any set of mapped entity types. Callers never
//! write type-specific queries.
//!
//! ## Components (leaf-first)
//!
//! - `criteria` - Criteria Normalizer: scalar key vs equality filter
//! - `resolver` - Relation Resolver: attribute -> cardinality + target type
//! - `builder` - Graph Builder: payload -> entity graph, bounded depth
//! - `footprint` - Operation Dispatcher: the public operations
//!
//! ## Collaborators
//!
//! - `schema` - the mapping registry
//! - `populator` - leaf-level field assignment
//! - `manager` - unit of work and query builder contracts
//! - `storage` - a reference collaborator backed by redb
//!
//! ## Architectural Constraints
//!
//! - The dispatcher holds no state between calls
//! - Exactly one flush per mutating operation
//! - Relation expansion is always bounded by `MAX_RECURSION_DEPTH`

// =============================================================================
// MODULES
// =============================================================================

pub mod builder;
pub mod criteria;
pub mod footprint;
pub mod manager;
pub mod options;
pub mod payload;
pub mod populator;
pub mod primitives;
pub mod resolver;
pub mod schema;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Affected, FootprintError, Found, Key, NotFound, Record, RecordState, Related, Result, Value,
};

// =============================================================================
// RE-EXPORTS: Footprint Engine
// =============================================================================

pub use builder::GraphBuilder;
pub use criteria::{Criteria, CriteriaNormalizer, Filter, Lookup, filter_matches};
pub use footprint::Footprint;
pub use options::{FootprintConfig, Options, Populate};
pub use payload::{ChildRef, Input, Payload};
pub use resolver::{RelationResolver, ResolvedRelation};

// =============================================================================
// RE-EXPORTS: Collaborators
// =============================================================================

pub use manager::{Datastore, Join, Manager, Query, QueryBuilder};
pub use populator::{FieldPopulator, Populator};
pub use schema::{Cardinality, EntityType, FieldDef, FieldType, Relation, Schema};
pub use storage::{RedbManager, RedbStore};
