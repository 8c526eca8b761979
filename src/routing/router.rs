//! Fallback resolution.
//!
//! # Responsibilities
//! - Store compiled fallback rules
//! - Resolve the ordered candidate list for a failed target
//! - Apply operation rewrites (strip/add prefix) per candidate
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - First matching rule wins; later rules are not merged in
//! - Resolution is pure config lookup: circuit and rate limit state
//!   never change which candidates come back
//! - No match resolves to an empty candidate list rather than an error

use crate::config::FallbackRuleConfig;
use crate::routing::matcher::{request_target, TargetPattern};

/// A resolved fallback candidate: the endpoint to redirect to, and the
/// operation name rewritten for that endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackCandidate {
    pub endpoint_id: String,
    pub operation: String,
}

/// One candidate from a rule, before the operation rewrite is applied.
#[derive(Debug, Clone)]
struct CandidateRewrite {
    endpoint_id: String,
    strip_prefix: Option<String>,
    add_prefix: Option<String>,
}

impl CandidateRewrite {
    /// Rewrite the original operation for this candidate. `strip_prefix`
    /// is applied before `add_prefix`; a strip prefix that does not match
    /// leaves the operation untouched.
    fn apply(&self, operation: &str) -> FallbackCandidate {
        let mut operation = operation.to_string();
        if let Some(prefix) = &self.strip_prefix {
            if let Some(rest) = operation.strip_prefix(prefix.as_str()) {
                operation = rest.to_string();
            }
        }
        if let Some(prefix) = &self.add_prefix {
            operation = format!("{prefix}{operation}");
        }
        FallbackCandidate {
            endpoint_id: self.endpoint_id.clone(),
            operation,
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    pattern: TargetPattern,
    candidates: Vec<CandidateRewrite>,
}

/// Resolves fallback candidates for failed requests.
///
/// Built once from configuration and shared read-only. Deciding whether a
/// candidate is actually usable (circuit state, rate budget) is left to
/// the caller, which runs its full pipeline against each candidate.
#[derive(Debug, Clone, Default)]
pub struct FallbackRouter {
    rules: Vec<CompiledRule>,
}

impl FallbackRouter {
    /// Compile fallback rules, preserving configuration order.
    pub fn from_config(rules: &[FallbackRuleConfig]) -> Self {
        let rules = rules
            .iter()
            .map(|rule| CompiledRule {
                pattern: TargetPattern::parse(&rule.pattern),
                candidates: rule
                    .candidates
                    .iter()
                    .map(|candidate| CandidateRewrite {
                        endpoint_id: candidate.endpoint.clone(),
                        strip_prefix: candidate.strip_prefix.clone(),
                        add_prefix: candidate.add_prefix.clone(),
                    })
                    .collect(),
            })
            .collect();
        Self { rules }
    }

    /// Resolve the ordered candidate list for a target.
    ///
    /// The first rule whose pattern matches supplies all candidates. An
    /// unmatched target resolves to an empty list.
    pub fn resolve(&self, endpoint_id: &str, operation: &str) -> Vec<FallbackCandidate> {
        let target = request_target(endpoint_id, operation);
        self.rules
            .iter()
            .find(|rule| rule.pattern.matches(&target))
            .map(|rule| {
                rule.candidates
                    .iter()
                    .map(|candidate| candidate.apply(operation))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of compiled rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if no rules are configured.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::FallbackCandidateConfig;

    fn rule(pattern: &str, candidates: Vec<FallbackCandidateConfig>) -> FallbackRuleConfig {
        FallbackRuleConfig {
            pattern: pattern.to_string(),
            candidates,
        }
    }

    fn candidate(endpoint: &str) -> FallbackCandidateConfig {
        FallbackCandidateConfig {
            endpoint: endpoint.to_string(),
            strip_prefix: None,
            add_prefix: None,
        }
    }

    #[test]
    fn test_resolve_returns_candidates_in_rule_order() {
        let router = FallbackRouter::from_config(&[rule(
            "geo/*",
            vec![candidate("geo-fallback"), candidate("geo-archive")],
        )]);

        let candidates = router.resolve("geo", "features");
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].endpoint_id, "geo-fallback");
        assert_eq!(candidates[0].operation, "features");
        assert_eq!(candidates[1].endpoint_id, "geo-archive");
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let router = FallbackRouter::from_config(&[
            rule("geo/features", vec![candidate("geo-exact")]),
            rule("geo/*", vec![candidate("geo-wide")]),
        ]);

        let exact = router.resolve("geo", "features");
        assert_eq!(exact[0].endpoint_id, "geo-exact");

        // Falls through to the broader rule, not merged with the first.
        let other = router.resolve("geo", "lookup");
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].endpoint_id, "geo-wide");
    }

    #[test]
    fn test_unmatched_target_resolves_empty() {
        let router = FallbackRouter::from_config(&[rule("geo/*", vec![candidate("geo-fallback")])]);

        assert!(router.resolve("billing", "charge").is_empty());
    }

    #[test]
    fn test_operation_rewrite_strips_then_prepends() {
        let router = FallbackRouter::from_config(&[rule(
            "maps/*",
            vec![FallbackCandidateConfig {
                endpoint: "maps-v2".to_string(),
                strip_prefix: Some("v1/".to_string()),
                add_prefix: Some("v2/".to_string()),
            }],
        )]);

        let candidates = router.resolve("maps", "v1/tiles");
        assert_eq!(candidates[0].operation, "v2/tiles");

        // A strip prefix that does not match leaves the operation alone.
        let candidates = router.resolve("maps", "tiles");
        assert_eq!(candidates[0].operation, "v2/tiles");
    }

    #[test]
    fn test_empty_config_resolves_nothing() {
        let router = FallbackRouter::from_config(&[]);
        assert!(router.is_empty());
        assert!(router.resolve("geo", "features").is_empty());
    }
}
