//! Deterministic cache key derivation.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde_json::{Map, Value};

/// Cache key for one logical call: operation name plus a digest of the
/// full parameter set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    operation: String,
    params_hash: u64,
}

impl CacheKey {
    /// Derives the key for `operation` called with `params`.
    ///
    /// `serde_json` maps iterate in sorted key order (at every nesting
    /// level), so the serialized form is canonical and two logically
    /// identical parameter sets produce the same key.
    pub fn new(operation: &str, params: &Map<String, Value>) -> Self {
        let canonical = Value::Object(params.clone()).to_string();
        let mut hasher = DefaultHasher::new();
        canonical.hash(&mut hasher);

        Self {
            operation: operation.to_string(),
            params_hash: hasher.finish(),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{:016x}", self.operation, self.params_hash)
    }
}
