//! Tests for TOML configuration loading.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use footprint::CliError;
use footprint::config::{Action, Actions, AppConfig};
use footprint_core::{Cardinality, FootprintError};
use std::path::Path;

const TODO_APP: &str = r#"
database = "todo.redb"

[footprint]
default_limit = 25
populate = true

[actions]
destroy = false
destroy_association = false

[[entity]]
name = "User"
fields = [{ name = "name", type = "text", size = 24 }]

[[entity]]
name = "List"
fields = [
    { name = "name", type = "text" },
    { name = "done", type = "boolean", nullable = true },
]
relations = [{ name = "todos", cardinality = "to_many", target = "Todo", mapped_by = "list" }]

[[entity]]
name = "Todo"
fields = [
    { name = "task", type = "text" },
    { name = "done", type = "boolean", nullable = true },
]
relations = [
    { name = "list", cardinality = "to_one", target = "List" },
    { name = "creator", cardinality = "to_one", target = "User" },
]
"#;

// =============================================================================
// PARSING
// =============================================================================

#[test]
fn test_full_config_parses() {
    let config = AppConfig::parse(TODO_APP).unwrap();

    assert_eq!(config.database.as_deref(), Some(Path::new("todo.redb")));
    assert_eq!(config.footprint.default_limit, Some(25));
    assert!(config.footprint.populate);
    assert_eq!(config.entities.len(), 3);

    let schema = config.schema().unwrap();
    let todos = schema.entity("List").unwrap().relation("todos").unwrap();
    assert_eq!(todos.cardinality, Cardinality::ToMany);
    assert_eq!(todos.mapped_by.as_deref(), Some("list"));
    assert_eq!(schema.entity("User").unwrap().primary_key(), "id");
}

#[test]
fn test_empty_config_uses_defaults() {
    let config = AppConfig::parse("").unwrap();

    assert!(config.database.is_none());
    assert_eq!(config.footprint.default_limit, Some(100));
    assert!(!config.footprint.populate);
    assert_eq!(config.actions, Actions::default());
    assert!(config.entities.is_empty());
}

#[test]
fn test_unknown_key_rejected() {
    let result = AppConfig::parse("databse = \"typo.redb\"");
    assert!(matches!(result, Err(CliError::Config(_))));
}

#[test]
fn test_inconsistent_mapping_rejected() {
    let text = r#"
[[entity]]
name = "List"
relations = [{ name = "todos", cardinality = "to_many", target = "Todo", mapped_by = "list" }]
"#;
    let config = AppConfig::parse(text).unwrap();
    assert!(matches!(
        config.schema(),
        Err(CliError::Footprint(FootprintError::Validation(_)))
    ));
}

// =============================================================================
// ACTIONS
// =============================================================================

#[test]
fn test_actions_toggle_individually() {
    let config = AppConfig::parse(TODO_APP).unwrap();

    assert!(config.actions.allows(Action::Create));
    assert!(config.actions.allows(Action::FindAssociation));
    assert!(!config.actions.allows(Action::Destroy));
    assert!(!config.actions.allows(Action::DestroyAssociation));

    let refused = config.actions.ensure(Action::Destroy).unwrap_err();
    assert_eq!(refused.to_string(), "Action 'destroy' is disabled");
    assert_eq!(refused.code(), "E_DISABLED");
}

// =============================================================================
// DATABASE PATH
// =============================================================================

#[test]
fn test_cli_database_overrides_config() {
    let config = AppConfig::parse(TODO_APP).unwrap();

    assert_eq!(
        config.database_path(Some(Path::new("other.redb"))).unwrap(),
        Path::new("other.redb")
    );
    assert_eq!(config.database_path(None).unwrap(), Path::new("todo.redb"));
}

#[test]
fn test_missing_database_is_config_error() {
    let config = AppConfig::parse("").unwrap();
    let error = config.database_path(None).unwrap_err();
    assert_eq!(error.to_string(), "Configuration error: No store configured");
}

// =============================================================================
// FILE LOADING
// =============================================================================

#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("footprint.toml");
    std::fs::write(&path, TODO_APP).unwrap();

    let config = AppConfig::load(&path).unwrap();
    assert_eq!(config.entities.len(), 3);
}

#[test]
fn test_load_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let result = AppConfig::load(&dir.path().join("absent.toml"));
    assert!(matches!(result, Err(CliError::Config(_))));
}
