//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the router.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CachePriority;

/// Root configuration for the resilient request router.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouterConfig {
    /// Gateway server configuration (bind address).
    pub server: ServerConfig,

    /// Upstream endpoint definitions.
    pub endpoints: Vec<EndpointConfig>,

    /// Ordered fallback rules mapping request targets to alternate endpoints.
    pub fallback_rules: Vec<FallbackRuleConfig>,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Active health probing settings.
    pub health: HealthConfig,

    /// Backoff tuning shared by all endpoints.
    pub retry: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

impl RouterConfig {
    /// Looks up an endpoint definition by id.
    pub fn endpoint(&self, id: &str) -> Option<&EndpointConfig> {
        self.endpoints.iter().find(|e| e.id == id)
    }
}

/// Gateway server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Total time budget for one gateway request in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 60,
        }
    }
}

/// One logical upstream service.
///
/// `addresses[0]` is the primary; any further entries are same-service
/// mirrors rotated through on retry. Cross-service fallback is configured
/// separately via [`FallbackRuleConfig`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// Unique endpoint identifier (e.g., "geo-api", "tile-provider-a").
    pub id: String,

    /// Base addresses, index 0 = primary.
    pub addresses: Vec<String>,

    /// Path probed by the health monitor.
    #[serde(default = "default_probe_path")]
    pub probe_path: String,

    /// Consecutive failures before the circuit opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long an open circuit stays open before auto-reset, in milliseconds.
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,

    /// Per-call timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Retries after the first attempt (total attempts = max_retries + 1).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Outbound request budget for this endpoint.
    #[serde(default)]
    pub rate_limit: RateBudgetConfig,

    /// TTL applied to responses cached for this endpoint, in milliseconds.
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    /// Eviction priority of this endpoint's cached responses.
    #[serde(default)]
    pub cache_priority: CachePriority,
}

impl EndpointConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

fn default_probe_path() -> String {
    "/health".to_string()
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout_ms() -> u64 {
    30_000
}

fn default_request_timeout_ms() -> u64 {
    8_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_cache_ttl_ms() -> u64 {
    300_000
}

/// Fixed-window request budget.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateBudgetConfig {
    /// Requests admitted per window.
    pub max_requests: u32,

    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl Default for RateBudgetConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window_ms: 60_000,
        }
    }
}

impl RateBudgetConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// One fallback rule: requests whose target matches `pattern` may be
/// retried against the listed candidates, in order. Rules are checked in
/// config order; the first match wins.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FallbackRuleConfig {
    /// Target pattern, exact ("geo/features") or trailing-wildcard ("geo/*").
    /// Targets have the form "{endpoint_id}/{operation}".
    pub pattern: String,

    /// Alternate endpoints tried when the matched endpoint fails.
    pub candidates: Vec<FallbackCandidateConfig>,
}

/// One fallback candidate with its address-rewrite rule.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FallbackCandidateConfig {
    /// Endpoint id the request is redirected to.
    pub endpoint: String,

    /// Leading path segment removed from the operation before redirecting.
    #[serde(default)]
    pub strip_prefix: Option<String>,

    /// Leading path segment prepended after `strip_prefix` is applied.
    #[serde(default)]
    pub add_prefix: Option<String>,
}

/// Response cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of retained entries.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 500 }
    }
}

/// Active health probing settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Enable the background health monitor.
    pub enabled: bool,

    /// Probe interval in seconds.
    pub interval_secs: u64,

    /// Probe timeout in milliseconds. Must be at most half the smallest
    /// endpoint request timeout; validation rejects anything larger.
    pub probe_timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            probe_timeout_ms: 2_000,
        }
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Backoff tuning for in-call retries.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 250,
            max_delay_ms: 4_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("pretty" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the /admin routes on the gateway server.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}
