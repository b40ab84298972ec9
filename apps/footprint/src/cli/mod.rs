//! # Footprint CLI Module
//!
//! This module implements the CLI interface for footprint.
//!
//! ## Available Commands
//!
//! - `create` / `find` / `update` / `destroy` - primary operations
//! - `create-association` / `find-association` / `update-association` /
//!   `destroy-association` - operations on one relation of a parent record
//! - `schema` - print the loaded entity mappings
//! - `status` - count stored records per entity type
//!
//! Criteria, identifiers and payloads are given as JSON.

mod commands;

use clap::{Args, Parser, Subcommand};
use footprint_core::{Options, Populate};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Footprint - uniform create/find/update/destroy over mapped entity types.
#[derive(Parser, Debug)]
#[command(name = "footprint")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration
    #[arg(short, long, global = true, default_value = "footprint.toml")]
    pub config: PathBuf,

    /// Path to the redb database (overrides the configuration)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every footprint command.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionArgs {
    /// Relation levels to expand when building graphs (default 1)
    #[arg(short, long)]
    pub recursive: Option<u32>,

    /// Eager-load relations: "all", "none" or a relation name
    #[arg(short, long)]
    pub populate: Option<String>,

    /// Maximum number of records
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Number of records to skip
    #[arg(short, long)]
    pub offset: Option<usize>,
}

impl OptionArgs {
    /// Convert to footprint options.
    #[must_use]
    pub fn to_options(&self) -> Options {
        let populate = match self.populate.as_deref() {
            None | Some("none" | "false") => Populate::None,
            Some("all" | "true") => Populate::All,
            Some(attribute) => Populate::Attribute(attribute.to_string()),
        };
        Options {
            recursive: self.recursive,
            populate,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a record (and nested children) from a JSON payload
    Create {
        entity: String,
        payload: String,
        #[command(flatten)]
        options: OptionArgs,
    },

    /// Find records by key or JSON filter
    Find {
        entity: String,
        #[arg(default_value = "{}")]
        criteria: String,
        #[command(flatten)]
        options: OptionArgs,
    },

    /// Update every record matching the criteria
    Update {
        entity: String,
        criteria: String,
        payload: String,
        #[command(flatten)]
        options: OptionArgs,
    },

    /// Destroy every record matching the criteria
    Destroy {
        entity: String,
        criteria: String,
        #[command(flatten)]
        options: OptionArgs,
    },

    /// Create a child on a relation of a parent record
    CreateAssociation {
        parent: String,
        parent_id: String,
        attribute: String,
        payload: String,
        #[command(flatten)]
        options: OptionArgs,
    },

    /// Find a parent record with one relation narrowed by criteria
    FindAssociation {
        parent: String,
        parent_id: String,
        attribute: String,
        #[arg(default_value = "{}")]
        criteria: String,
        #[command(flatten)]
        options: OptionArgs,
    },

    /// Update the children matching the criteria
    UpdateAssociation {
        parent: String,
        parent_id: String,
        attribute: String,
        criteria: String,
        values: String,
        #[command(flatten)]
        options: OptionArgs,
    },

    /// Destroy the children matching the criteria
    DestroyAssociation {
        parent: String,
        parent_id: String,
        attribute: String,
        criteria: String,
        #[command(flatten)]
        options: OptionArgs,
    },

    /// Print the loaded entity mappings
    Schema,

    /// Count stored records per entity type
    Status,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments, printing the JSON result.
pub async fn execute(cli: Cli) -> Result<(), crate::CliError> {
    let context = Context::open(&cli.config, cli.database.as_deref())?;
    let output = run(&context, &cli.command).await?;

    let text = if cli.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{text}");
    Ok(())
}
