//! Fixed-window rate limiting for outbound calls.
//!
//! Each endpoint has its own budget of `max_requests` per `window_ms`.
//! Windows reset lazily on the first acquisition after the boundary;
//! bursts right at a boundary are a known imprecision of the scheme.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::schema::{EndpointConfig, RateBudgetConfig};
use crate::observability::metrics;

struct FixedWindow {
    window_start: Instant,
    count: u32,
}

impl FixedWindow {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            count: 0,
        }
    }

    fn try_acquire(&mut self, max_requests: u32, window: Duration) -> bool {
        let now = Instant::now();
        if now.duration_since(self.window_start) >= window {
            self.window_start = now;
            self.count = 0;
        }

        if self.count < max_requests {
            self.count += 1;
            true
        } else {
            false
        }
    }
}

/// Per-endpoint fixed-window limiter.
pub struct RateLimiter {
    windows: DashMap<String, FixedWindow>,
    budgets: HashMap<String, RateBudgetConfig>,
}

impl RateLimiter {
    pub fn from_config(endpoints: &[EndpointConfig]) -> Self {
        Self {
            windows: DashMap::new(),
            budgets: endpoints
                .iter()
                .map(|e| (e.id.clone(), e.rate_limit.clone()))
                .collect(),
        }
    }

    /// Spends one request from the endpoint's budget. Rejection leaves the
    /// window untouched. Endpoints without a configured budget always pass.
    pub fn try_acquire(&self, endpoint_id: &str) -> bool {
        let Some(budget) = self.budgets.get(endpoint_id) else {
            return true;
        };

        let admitted = self
            .windows
            .entry(endpoint_id.to_string())
            .or_insert_with(FixedWindow::new)
            .try_acquire(budget.max_requests, budget.window());

        if !admitted {
            tracing::warn!(
                endpoint = %endpoint_id,
                max_requests = budget.max_requests,
                window_ms = budget.window_ms,
                "Rate limit exceeded"
            );
            metrics::record_rate_limited(endpoint_id);
        }
        admitted
    }

    /// Remaining budget as `(limit, remaining)` for an endpoint with a
    /// configured budget. A missing window means nothing was spent yet.
    pub fn budget_view(&self, endpoint_id: &str) -> Option<(u32, u32)> {
        let budget = self.budgets.get(endpoint_id)?;
        let spent = self
            .windows
            .get(endpoint_id)
            .map(|w| {
                if w.window_start.elapsed() >= budget.window() {
                    0
                } else {
                    w.count
                }
            })
            .unwrap_or(0);
        Some((
            budget.max_requests,
            budget.max_requests.saturating_sub(spent),
        ))
    }

    /// Time until the current window rolls over, if the budget is spent.
    pub fn retry_after(&self, endpoint_id: &str) -> Option<Duration> {
        let budget = self.budgets.get(endpoint_id)?;
        let window = self.windows.get(endpoint_id)?;
        let elapsed = window.window_start.elapsed();
        if window.count >= budget.max_requests && elapsed < budget.window() {
            Some(budget.window() - elapsed)
        } else {
            None
        }
    }

    /// Drops the endpoint's current window (operator reset).
    pub fn reset(&self, endpoint_id: &str) {
        self.windows.remove(endpoint_id);
    }

    /// Drops every window.
    pub fn reset_all(&self) {
        self.windows.clear();
    }
}
