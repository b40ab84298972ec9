//! # footprint
//!
//! Command-line front end for `footprint-core`.
//!
//! - `config` - TOML configuration: store path, defaults, toggles, mappings
//! - `render` - JSON in (criteria, payloads) and out (records, errors)
//! - `cli` - argument parsing and command execution

pub mod cli;
pub mod config;
pub mod error;
pub mod render;

pub use error::CliError;
