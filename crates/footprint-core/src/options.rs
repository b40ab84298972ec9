//! # Operation Options
//!
//! Per-call options and the process-wide footprint defaults.

use crate::primitives::{DEFAULT_LIMIT, DEFAULT_RECURSION, MAX_RECURSION_DEPTH};
use serde::{Deserialize, Serialize};

/// Which relations a lookup eager-loads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Populate {
    #[default]
    None,
    All,
    Attribute(String),
}

impl Populate {
    #[must_use]
    pub fn includes(&self, attribute: &str) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Attribute(name) => name == attribute,
        }
    }
}

/// Options accepted by every footprint operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    /// Relation levels the graph builder expands. Defaults to 1.
    pub recursive: Option<u32>,
    pub populate: Populate,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Options {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_recursive(mut self, depth: u32) -> Self {
        self.recursive = Some(depth);
        self
    }

    #[must_use]
    pub fn with_populate(mut self, populate: Populate) -> Self {
        self.populate = populate;
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Effective graph-builder depth, clamped to `MAX_RECURSION_DEPTH`.
    #[must_use]
    pub fn recursion_depth(&self) -> u32 {
        self.recursive
            .unwrap_or(DEFAULT_RECURSION)
            .min(MAX_RECURSION_DEPTH)
    }
}

/// Footprint-wide defaults, usually loaded from the `[footprint]` table of
/// the app configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FootprintConfig {
    /// Page size applied to multi-record `find` when the caller gives none.
    pub default_limit: Option<usize>,
    /// Eager-load every relation on `find` when the caller does not choose.
    pub populate: bool,
}

impl Default for FootprintConfig {
    fn default() -> Self {
        Self {
            default_limit: Some(DEFAULT_LIMIT),
            populate: false,
        }
    }
}

impl FootprintConfig {
    /// Fill in defaults the caller left unset, for a `find` call.
    #[must_use]
    pub fn apply(&self, options: &Options) -> Options {
        let mut applied = options.clone();
        if applied.limit.is_none() {
            applied.limit = self.default_limit;
        }
        if self.populate && applied.populate == Populate::None {
            applied.populate = Populate::All;
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recursion_defaults_to_one() {
        assert_eq!(Options::new().recursion_depth(), 1);
    }

    #[test]
    fn explicit_zero_is_honoured() {
        assert_eq!(Options::new().with_recursive(0).recursion_depth(), 0);
    }

    #[test]
    fn recursion_is_clamped() {
        let options = Options::new().with_recursive(u32::MAX);
        assert_eq!(options.recursion_depth(), MAX_RECURSION_DEPTH);
    }

    #[test]
    fn config_fills_unset_options_only() {
        let config = FootprintConfig {
            default_limit: Some(10),
            populate: true,
        };

        let applied = config.apply(&Options::new());
        assert_eq!(applied.limit, Some(10));
        assert_eq!(applied.populate, Populate::All);

        let explicit = Options::new()
            .with_limit(2)
            .with_populate(Populate::Attribute("todos".into()));
        let applied = config.apply(&explicit);
        assert_eq!(applied.limit, Some(2));
        assert!(applied.populate.includes("todos"));
        assert!(!applied.populate.includes("creator"));
    }
}
