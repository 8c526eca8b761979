//! Fallback target matching.
//!
//! # Responsibilities
//! - Compile rule patterns into a matchable form
//! - Match request targets of the form `{endpoint_id}/{operation}`
//!
//! # Design Decisions
//! - Exact match, or prefix match via a trailing `*`
//! - Matching is case-sensitive
//! - No regex to guarantee O(n) matching

/// Builds the target string rule patterns are matched against.
pub fn request_target(endpoint_id: &str, operation: &str) -> String {
    format!("{endpoint_id}/{operation}")
}

/// A compiled rule pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetPattern {
    /// Matches one target exactly (`"geo/features"`).
    Exact(String),
    /// Matches any target with the prefix (`"geo/*"`, `"geo-*"`).
    Prefix(String),
}

impl TargetPattern {
    /// Compile a pattern string. A trailing `*` turns the rest of the
    /// pattern into a prefix; anything else is matched literally.
    pub fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => Self::Prefix(prefix.to_string()),
            None => Self::Exact(pattern.to_string()),
        }
    }

    /// Returns true if the target matches this pattern.
    pub fn matches(&self, target: &str) -> bool {
        match self {
            Self::Exact(expected) => target == expected,
            Self::Prefix(prefix) => target.starts_with(prefix.as_str()),
        }
    }
}
