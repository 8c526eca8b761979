//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (fallback rules reference existing endpoints)
//! - Validate value ranges (thresholds >= 1, windows > 0)
//! - Enforce the probe-timeout bound (at most half the smallest request timeout)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RouterConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use url::Url;

use crate::config::schema::RouterConfig;

/// One semantic violation found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    NoEndpoints,
    DuplicateEndpointId(String),
    EmptyAddressList(String),
    InvalidAddress {
        endpoint: String,
        address: String,
        reason: String,
    },
    InvalidValue {
        field: String,
        reason: String,
    },
    EmptyFallbackRule(String),
    UnknownFallbackEndpoint {
        pattern: String,
        endpoint: String,
    },
    ProbeTimeoutTooLong {
        probe_timeout_ms: u64,
        limit_ms: u64,
    },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::NoEndpoints => write!(f, "no endpoints configured"),
            ValidationError::DuplicateEndpointId(id) => {
                write!(f, "duplicate endpoint id '{}'", id)
            }
            ValidationError::EmptyAddressList(id) => {
                write!(f, "endpoint '{}' has no addresses", id)
            }
            ValidationError::InvalidAddress {
                endpoint,
                address,
                reason,
            } => write!(
                f,
                "endpoint '{}' address '{}' is invalid: {}",
                endpoint, address, reason
            ),
            ValidationError::InvalidValue { field, reason } => {
                write!(f, "{}: {}", field, reason)
            }
            ValidationError::EmptyFallbackRule(pattern) => {
                write!(f, "fallback rule '{}' has no candidates", pattern)
            }
            ValidationError::UnknownFallbackEndpoint { pattern, endpoint } => {
                write!(
                    f,
                    "fallback rule '{}' references unknown endpoint '{}'",
                    pattern, endpoint
                )
            }
            ValidationError::ProbeTimeoutTooLong {
                probe_timeout_ms,
                limit_ms,
            } => write!(
                f,
                "health.probe_timeout_ms {} exceeds half the smallest request timeout ({}ms)",
                probe_timeout_ms, limit_ms
            ),
        }
    }
}

/// Validate a parsed configuration, collecting every violation.
pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.endpoints.is_empty() {
        errors.push(ValidationError::NoEndpoints);
    }

    let mut seen_ids = HashSet::new();
    for endpoint in &config.endpoints {
        if !seen_ids.insert(endpoint.id.as_str()) {
            errors.push(ValidationError::DuplicateEndpointId(endpoint.id.clone()));
        }

        if endpoint.addresses.is_empty() {
            errors.push(ValidationError::EmptyAddressList(endpoint.id.clone()));
        }
        for address in &endpoint.addresses {
            match Url::parse(address) {
                Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
                Ok(url) => errors.push(ValidationError::InvalidAddress {
                    endpoint: endpoint.id.clone(),
                    address: address.clone(),
                    reason: format!("unsupported scheme '{}'", url.scheme()),
                }),
                Err(e) => errors.push(ValidationError::InvalidAddress {
                    endpoint: endpoint.id.clone(),
                    address: address.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        if endpoint.failure_threshold == 0 {
            errors.push(invalid(
                format!("endpoints.{}.failure_threshold", endpoint.id),
                "must be at least 1",
            ));
        }
        if endpoint.reset_timeout_ms == 0 {
            errors.push(invalid(
                format!("endpoints.{}.reset_timeout_ms", endpoint.id),
                "must be greater than 0",
            ));
        }
        if endpoint.request_timeout_ms == 0 {
            errors.push(invalid(
                format!("endpoints.{}.request_timeout_ms", endpoint.id),
                "must be greater than 0",
            ));
        }
        if endpoint.rate_limit.max_requests == 0 {
            errors.push(invalid(
                format!("endpoints.{}.rate_limit.max_requests", endpoint.id),
                "must be at least 1",
            ));
        }
        if endpoint.rate_limit.window_ms == 0 {
            errors.push(invalid(
                format!("endpoints.{}.rate_limit.window_ms", endpoint.id),
                "must be greater than 0",
            ));
        }
        if !endpoint.probe_path.starts_with('/') {
            errors.push(invalid(
                format!("endpoints.{}.probe_path", endpoint.id),
                "must start with '/'",
            ));
        }
    }

    let known_ids: HashSet<&str> = config.endpoints.iter().map(|e| e.id.as_str()).collect();
    for rule in &config.fallback_rules {
        if rule.pattern.is_empty() {
            errors.push(invalid("fallback_rules.pattern", "must not be empty"));
        }
        if rule.candidates.is_empty() {
            errors.push(ValidationError::EmptyFallbackRule(rule.pattern.clone()));
        }
        for candidate in &rule.candidates {
            if !known_ids.contains(candidate.endpoint.as_str()) {
                errors.push(ValidationError::UnknownFallbackEndpoint {
                    pattern: rule.pattern.clone(),
                    endpoint: candidate.endpoint.clone(),
                });
            }
        }
    }

    if config.cache.capacity == 0 {
        errors.push(invalid("cache.capacity", "must be at least 1"));
    }

    if config.health.enabled {
        if config.health.interval_secs == 0 {
            errors.push(invalid("health.interval_secs", "must be greater than 0"));
        }
        if config.health.probe_timeout_ms == 0 {
            errors.push(invalid("health.probe_timeout_ms", "must be greater than 0"));
        }
        // Probes must be cheaper than real calls.
        if let Some(smallest) = config.endpoints.iter().map(|e| e.request_timeout_ms).min() {
            let limit_ms = smallest / 2;
            if config.health.probe_timeout_ms > limit_ms {
                errors.push(ValidationError::ProbeTimeoutTooLong {
                    probe_timeout_ms: config.health.probe_timeout_ms,
                    limit_ms,
                });
            }
        }
    }

    if config.retry.base_delay_ms == 0 {
        errors.push(invalid("retry.base_delay_ms", "must be greater than 0"));
    }
    if config.retry.max_delay_ms < config.retry.base_delay_ms {
        errors.push(invalid(
            "retry.max_delay_ms",
            "must be at least retry.base_delay_ms",
        ));
    }

    match config.observability.log_format.as_str() {
        "pretty" | "json" => {}
        other => errors.push(invalid(
            "observability.log_format",
            format!("'{}' is not one of: pretty, json", other),
        )),
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(invalid(
            "observability.metrics_address",
            "not a valid socket address",
        ));
    }
    if config
        .server
        .bind_address
        .parse::<std::net::SocketAddr>()
        .is_err()
    {
        errors.push(invalid("server.bind_address", "not a valid socket address"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.into(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{EndpointConfig, FallbackCandidateConfig, FallbackRuleConfig};

    fn endpoint(id: &str) -> EndpointConfig {
        let toml = format!("id = \"{}\"\naddresses = [\"http://127.0.0.1:9000\"]", id);
        toml::from_str(&toml).unwrap()
    }

    fn base_config() -> RouterConfig {
        RouterConfig {
            endpoints: vec![endpoint("geo")],
            ..RouterConfig::default()
        }
    }

    #[test]
    fn test_minimal_config_is_valid() {
        assert!(validate_config(&base_config()).is_ok());
    }

    #[test]
    fn test_empty_config_is_rejected() {
        let errors = validate_config(&RouterConfig::default()).unwrap_err();
        assert!(errors.contains(&ValidationError::NoEndpoints));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let mut config = base_config();
        config.endpoints.push(endpoint("geo"));
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::DuplicateEndpointId(id) if id == "geo")));
    }

    #[test]
    fn test_bad_address_scheme_is_rejected() {
        let mut config = base_config();
        config.endpoints[0].addresses = vec!["ftp://files.example.com".to_string()];
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidAddress { .. })));
    }

    #[test]
    fn test_fallback_rule_must_reference_known_endpoint() {
        let mut config = base_config();
        config.fallback_rules.push(FallbackRuleConfig {
            pattern: "geo/*".to_string(),
            candidates: vec![FallbackCandidateConfig {
                endpoint: "missing".to_string(),
                strip_prefix: None,
                add_prefix: None,
            }],
        });
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::UnknownFallbackEndpoint { endpoint, .. } if endpoint == "missing"
        )));
    }

    #[test]
    fn test_probe_timeout_bounded_by_request_timeout() {
        let mut config = base_config();
        config.endpoints[0].request_timeout_ms = 3_000;
        config.health.probe_timeout_ms = 2_000;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::ProbeTimeoutTooLong { limit_ms: 1_500, .. }
        )));
    }

    #[test]
    fn test_collects_multiple_errors() {
        let mut config = base_config();
        config.endpoints[0].failure_threshold = 0;
        config.endpoints[0].rate_limit.window_ms = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.len() >= 2);
    }
}
