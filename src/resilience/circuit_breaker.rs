//! Circuit breaker for upstream protection.
//!
//! # States
//! - Healthy/Degraded: circuit closed, calls pass through
//! - CircuitOpen: upstream assumed down, calls skip straight to fallback
//!
//! # State Transitions
//! ```text
//! Healthy → Degraded: any failure below the threshold
//! Degraded → CircuitOpen: consecutive_failures reaches failure_threshold
//! any → CircuitOpen: remote "too many requests" (trip)
//! CircuitOpen → Healthy: reset_timeout elapses (failure streak cleared)
//! any → Healthy: one success
//! ```
//!
//! # Design Decisions
//! - Per-endpoint breaker state, stored on the endpoint record
//! - The timed reopen is applied lazily on read; no timer task per endpoint
//! - No half-open probing state; the health monitor plays that role by
//!   probing endpoints that are not open

use std::sync::Arc;
use std::time::Duration;

use crate::endpoint::EndpointRegistry;
use crate::observability::metrics;

/// Id-keyed facade over the per-endpoint breaker records.
#[derive(Clone)]
pub struct CircuitBreaker {
    registry: Arc<EndpointRegistry>,
}

impl CircuitBreaker {
    pub fn new(registry: Arc<EndpointRegistry>) -> Self {
        Self { registry }
    }

    /// Pure read used to decide whether to attempt an endpoint at all.
    /// Unknown ids read as closed.
    pub fn is_open(&self, endpoint_id: &str) -> bool {
        self.registry
            .get(endpoint_id)
            .is_some_and(|e| e.is_circuit_open())
    }

    pub fn record_success(&self, endpoint_id: &str, response_time: Option<Duration>) {
        if let Some(endpoint) = self.registry.get(endpoint_id) {
            if endpoint.record_success(response_time) {
                tracing::info!(endpoint = %endpoint_id, "Circuit closed after successful call");
            }
        }
    }

    pub fn record_failure(&self, endpoint_id: &str, error: &str) {
        if let Some(endpoint) = self.registry.get(endpoint_id) {
            if endpoint.record_failure(error) {
                tracing::warn!(
                    endpoint = %endpoint_id,
                    threshold = endpoint.failure_threshold,
                    error = %error,
                    "Circuit opened"
                );
                metrics::record_breaker_open(endpoint_id);
            }
        }
    }

    /// Opens the circuit immediately, bypassing the failure threshold.
    pub fn trip(&self, endpoint_id: &str, error: &str) {
        if let Some(endpoint) = self.registry.get(endpoint_id) {
            if endpoint.trip(error) {
                tracing::warn!(
                    endpoint = %endpoint_id,
                    error = %error,
                    "Circuit opened by remote rate limit"
                );
                metrics::record_breaker_open(endpoint_id);
            }
        }
    }

    /// Operator reset of one endpoint. Returns false for unknown ids.
    pub fn reset(&self, endpoint_id: &str) -> bool {
        match self.registry.get(endpoint_id) {
            Some(endpoint) => {
                endpoint.reset();
                tracing::info!(endpoint = %endpoint_id, "Endpoint reset by operator");
                true
            }
            None => false,
        }
    }
}
