//! A single upstream service and its health record.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::cache::CachePriority;
use crate::config::schema::{EndpointConfig, RateBudgetConfig};

/// Endpoint health state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointState {
    Healthy,
    /// At least one recent failure, circuit still closed.
    Degraded,
    CircuitOpen,
}

#[derive(Debug)]
struct Health {
    state: EndpointState,
    consecutive_failures: u32,
    circuit_opened_at: Option<Instant>,
    last_error: Option<String>,
    last_response_time: Option<Duration>,
}

/// One logical upstream service.
///
/// `addresses[0]` is the primary; further entries are mirrors rotated
/// through on retry.
#[derive(Debug)]
pub struct ServiceEndpoint {
    pub id: String,
    addresses: Vec<String>,
    pub probe_path: String,
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub rate_limit: RateBudgetConfig,
    pub cache_ttl: Duration,
    pub cache_priority: CachePriority,
    health: Mutex<Health>,
}

impl ServiceEndpoint {
    pub fn from_config(config: &EndpointConfig) -> Self {
        Self {
            id: config.id.clone(),
            addresses: config
                .addresses
                .iter()
                .map(|a| a.trim_end_matches('/').to_string())
                .collect(),
            probe_path: config.probe_path.clone(),
            failure_threshold: config.failure_threshold.max(1),
            reset_timeout: config.reset_timeout(),
            request_timeout: config.request_timeout(),
            max_retries: config.max_retries,
            rate_limit: config.rate_limit.clone(),
            cache_ttl: config.cache_ttl(),
            cache_priority: config.cache_priority,
            health: Mutex::new(Health {
                state: EndpointState::Healthy,
                consecutive_failures: 0,
                circuit_opened_at: None,
                last_error: None,
                last_response_time: None,
            }),
        }
    }

    pub fn primary_address(&self) -> &str {
        &self.addresses[0]
    }

    /// Address used for a given attempt; retries rotate through mirrors.
    pub fn address_for(&self, attempt: u32) -> &str {
        &self.addresses[attempt as usize % self.addresses.len()]
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// True while the circuit is open. The timed auto-reset is applied
    /// lazily here: once `reset_timeout` has elapsed the record heals to
    /// Healthy with the failure streak cleared.
    pub fn is_circuit_open(&self) -> bool {
        let mut health = self.health.lock().expect("endpoint mutex poisoned");
        self.apply_auto_reset(&mut health);
        health.state == EndpointState::CircuitOpen
    }

    /// Clears the failure streak and restores Healthy. Returns true when
    /// this closed an open circuit.
    pub fn record_success(&self, response_time: Option<Duration>) -> bool {
        let mut health = self.health.lock().expect("endpoint mutex poisoned");
        let was_open = health.state == EndpointState::CircuitOpen;
        health.state = EndpointState::Healthy;
        health.consecutive_failures = 0;
        health.circuit_opened_at = None;
        if response_time.is_some() {
            health.last_response_time = response_time;
        }
        was_open
    }

    /// Counts one failure. Returns true when this failure opened the
    /// circuit.
    pub fn record_failure(&self, error: &str) -> bool {
        let mut health = self.health.lock().expect("endpoint mutex poisoned");
        self.apply_auto_reset(&mut health);
        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        health.last_error = Some(error.to_string());

        if health.state != EndpointState::CircuitOpen
            && health.consecutive_failures >= self.failure_threshold
        {
            health.state = EndpointState::CircuitOpen;
            health.circuit_opened_at = Some(Instant::now());
            return true;
        }
        if health.state == EndpointState::Healthy {
            health.state = EndpointState::Degraded;
        }
        false
    }

    /// Opens the circuit immediately (remote told us to back off).
    /// Returns true when the circuit was not already open.
    pub fn trip(&self, error: &str) -> bool {
        let mut health = self.health.lock().expect("endpoint mutex poisoned");
        health.last_error = Some(error.to_string());
        if health.state == EndpointState::CircuitOpen {
            return false;
        }
        health.state = EndpointState::CircuitOpen;
        // Keep the open-state invariant: failures never below threshold
        // while the circuit is open.
        health.consecutive_failures = health.consecutive_failures.max(self.failure_threshold);
        health.circuit_opened_at = Some(Instant::now());
        true
    }

    /// Operator reset: Healthy, zero failures, diagnostics cleared.
    pub fn reset(&self) {
        let mut health = self.health.lock().expect("endpoint mutex poisoned");
        health.state = EndpointState::Healthy;
        health.consecutive_failures = 0;
        health.circuit_opened_at = None;
        health.last_error = None;
    }

    pub fn record_response_time(&self, response_time: Duration) {
        let mut health = self.health.lock().expect("endpoint mutex poisoned");
        health.last_response_time = Some(response_time);
    }

    /// Records a failure description without touching the breaker
    /// counters. Used for client errors, which are not retried and do
    /// not indicate upstream trouble.
    pub fn note_error(&self, error: &str) {
        let mut health = self.health.lock().expect("endpoint mutex poisoned");
        health.last_error = Some(error.to_string());
    }

    pub fn snapshot(&self) -> EndpointSnapshot {
        let mut health = self.health.lock().expect("endpoint mutex poisoned");
        self.apply_auto_reset(&mut health);
        EndpointSnapshot {
            state: health.state,
            consecutive_failures: health.consecutive_failures,
            last_error: health.last_error.clone(),
            last_response_time_ms: health.last_response_time.map(|d| d.as_millis() as u64),
        }
    }

    fn apply_auto_reset(&self, health: &mut Health) {
        if health.state != EndpointState::CircuitOpen {
            return;
        }
        let expired = health
            .circuit_opened_at
            .is_some_and(|opened| opened.elapsed() >= self.reset_timeout);
        if expired {
            health.state = EndpointState::Healthy;
            health.consecutive_failures = 0;
            health.circuit_opened_at = None;
            tracing::info!(endpoint = %self.id, "Circuit closed after reset timeout");
        }
    }
}

/// Point-in-time view of one endpoint for the admin status map.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointSnapshot {
    pub state: EndpointState,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_response_time_ms: Option<u64>,
}
