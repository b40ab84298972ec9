//! # Storage
//!
//! Reference collaborator implementations of the manager contracts.

mod redb_store;

pub use redb_store::{RedbManager, RedbStore};
