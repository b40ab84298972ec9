//! # Configuration
//!
//! The TOML file the CLI is started with.
//!
//! ```toml
//! database = "footprint.redb"
//!
//! [footprint]
//! default_limit = 100
//! populate = false
//!
//! [actions]
//! destroy = false
//!
//! [[entity]]
//! name = "User"
//! fields = [{ name = "name", type = "text", size = 24 }]
//! ```

use crate::CliError;
use footprint_core::{EntityType, FootprintConfig, Schema};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Maximum configuration file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// ACTIONS
// =============================================================================

/// A footprint operation, as named in the `[actions]` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Find,
    Update,
    Destroy,
    CreateAssociation,
    FindAssociation,
    UpdateAssociation,
    DestroyAssociation,
}

impl Action {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Find => "find",
            Self::Update => "update",
            Self::Destroy => "destroy",
            Self::CreateAssociation => "create_association",
            Self::FindAssociation => "find_association",
            Self::UpdateAssociation => "update_association",
            Self::DestroyAssociation => "destroy_association",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-action switches. Every action is enabled unless turned off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Actions {
    pub create: bool,
    pub find: bool,
    pub update: bool,
    pub destroy: bool,
    pub create_association: bool,
    pub find_association: bool,
    pub update_association: bool,
    pub destroy_association: bool,
}

impl Default for Actions {
    fn default() -> Self {
        Self {
            create: true,
            find: true,
            update: true,
            destroy: true,
            create_association: true,
            find_association: true,
            update_association: true,
            destroy_association: true,
        }
    }
}

impl Actions {
    #[must_use]
    pub const fn allows(&self, action: Action) -> bool {
        match action {
            Action::Create => self.create,
            Action::Find => self.find,
            Action::Update => self.update,
            Action::Destroy => self.destroy,
            Action::CreateAssociation => self.create_association,
            Action::FindAssociation => self.find_association,
            Action::UpdateAssociation => self.update_association,
            Action::DestroyAssociation => self.destroy_association,
        }
    }

    /// Fail with `CliError::Disabled` if `action` is switched off.
    pub fn ensure(&self, action: Action) -> Result<(), CliError> {
        if self.allows(action) {
            Ok(())
        } else {
            Err(CliError::Disabled(action))
        }
    }
}

// =============================================================================
// APP CONFIG
// =============================================================================

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Path of the redb database. `--database` overrides it.
    pub database: Option<PathBuf>,
    pub footprint: FootprintConfig,
    pub actions: Actions,
    /// Entity mappings, one `[[entity]]` table each.
    #[serde(rename = "entity")]
    pub entities: Vec<EntityType>,
}

impl AppConfig {
    /// Read and parse a configuration file.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            CliError::Config(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(CliError::Config(format!(
                "File size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }

        let text = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, CliError> {
        toml::from_str(text).map_err(|e| CliError::Config(e.to_string()))
    }

    /// Validated mapping registry built from the `[[entity]]` tables.
    pub fn schema(&self) -> Result<Schema, CliError> {
        Ok(Schema::from_entities(self.entities.iter().cloned())?)
    }

    /// The database path: the override if given, else the configured one.
    pub fn database_path(&self, cli_override: Option<&Path>) -> Result<PathBuf, CliError> {
        cli_override
            .map(Path::to_path_buf)
            .or_else(|| self.database.clone())
            .ok_or_else(|| CliError::Config("No store configured".to_string()))
    }
}
