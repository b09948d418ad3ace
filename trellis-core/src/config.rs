//! Engine Configuration
//!
//! [`EngineConfig`] collects the tunables for a graph and its value cache.
//! It deserialises from JSON so hosts can keep it alongside their own
//! settings; every field has a default.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default value cache budget: 512 MiB.
pub const DEFAULT_CACHE_MEMORY_LIMIT: usize = 512 * 1024 * 1024;

/// Default number of transactions kept on the undo stack.
pub const DEFAULT_UNDO_DEPTH: usize = 100;

/// Configuration for a [`crate::graph::Graph`] and its [`crate::compute::ValueCache`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound, in bytes, on memory held by cached computed values.
    pub cache_memory_limit: usize,

    /// Maximum number of undoable transactions. The oldest are dropped first.
    pub undo_depth: usize,

    /// Memoise plug hashes between mutations. Disabling recomputes every
    /// hash from scratch, which is only useful when debugging `affects()`.
    pub hash_memo: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_memory_limit: DEFAULT_CACHE_MEMORY_LIMIT,
            undo_depth: DEFAULT_UNDO_DEPTH,
            hash_memo: true,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_cache_memory_limit(mut self, bytes: usize) -> Self {
        self.cache_memory_limit = bytes;
        self
    }

    pub fn with_undo_depth(mut self, depth: usize) -> Self {
        self.undo_depth = depth;
        self
    }

    pub fn with_hash_memo(mut self, enabled: bool) -> Self {
        self.hash_memo = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config = EngineConfig::from_json(r#"{ "undo_depth": 5 }"#).unwrap();
        assert_eq!(config.undo_depth, 5);
        assert_eq!(config.cache_memory_limit, DEFAULT_CACHE_MEMORY_LIMIT);
        assert!(config.hash_memo);
    }

    #[test]
    fn malformed_json_is_a_serialisation_error() {
        assert!(EngineConfig::from_json("{ nope").is_err());
    }
}
