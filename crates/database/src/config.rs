//! Indexer configuration.

use serde::{Deserialize, Serialize};
use tessera_core::Result;

/// Default bound on fixpoint rounds per propagation.
pub const DEFAULT_MAX_FIXPOINT_ROUNDS: usize = 10_000;

/// Tunables of an [`Indexer`](crate::Indexer).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Maximum breadth-first trigger rounds before propagation gives up
    /// with `NonConvergent`; `None` never gives up.
    pub max_fixpoint_rounds: Option<usize>,
    /// Whether snapshots include the tables backing views.
    pub serialize_views: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            max_fixpoint_rounds: Some(DEFAULT_MAX_FIXPOINT_ROUNDS),
            serialize_views: false,
        }
    }
}

impl IndexerConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fixpoint round bound.
    pub fn max_fixpoint_rounds(mut self, rounds: Option<usize>) -> Self {
        self.max_fixpoint_rounds = rounds;
        self
    }

    /// Sets whether snapshots include view tables.
    pub fn serialize_views(mut self, enabled: bool) -> Self {
        self.serialize_views = enabled;
        self
    }

    /// Parses a configuration from JSON; absent keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
