//! # CLI Errors

use crate::config::Action;
use footprint_core::FootprintError;
use thiserror::Error;

/// Errors surfaced by the command-line front end.
#[derive(Debug, Error)]
pub enum CliError {
    /// Missing, unreadable or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A footprint operation failed.
    #[error(transparent)]
    Footprint(#[from] FootprintError),

    /// Malformed JSON argument.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The action is switched off in the `[actions]` table.
    #[error("Action '{0}' is disabled")]
    Disabled(Action),
}

impl CliError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "E_CONFIG",
            Self::Footprint(e) => e.code(),
            Self::Json(_) => "E_JSON",
            Self::Disabled(_) => "E_DISABLED",
        }
    }
}
