//! # Footprint Primitives
//!
//! Hardcoded runtime constants for the footprint layer.
//! These are compiled into the binary and are immutable at runtime.

/// Relation levels the graph builder expands when the caller gives no
/// `recursive` option: immediate children only, never grandchildren.
pub const DEFAULT_RECURSION: u32 = 1;

/// Upper bound on relation levels the graph builder will ever expand.
///
/// - Payloads come from untrusted callers
/// - Mappings may be self-referential
/// - Any requested depth above this is clamped
pub const MAX_RECURSION_DEPTH: u32 = 16;

/// Default page size for multi-record lookups when the caller gives none.
pub const DEFAULT_LIMIT: usize = 100;

/// Name used for the primary-key field when a mapping does not declare one.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Maximum length of an entity, field or relation name.
///
/// Names longer than this are rejected when a schema is registered.
pub const MAX_NAME_LENGTH: usize = 64;
