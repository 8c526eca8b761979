//! Request orchestration.
//!
//! # Responsibilities
//! - Run the resilience pipeline for one logical call
//! - Order the layers: cache, circuit breaker, rate limit, timed call
//!   with retries, fallback chain, stale cache, degraded placeholder
//! - Expose the administrative surface (status, cache clear, endpoint
//!   reset, global bypass)
//!
//! # Data Flow
//! ```text
//! execute(operation, params, endpoint)
//!     1. fresh cache hit            → return Fresh
//!     2. circuit open               → fallback chain
//!     3. rate budget exhausted      → fallback chain (breaker untouched)
//!     4. timed call, retries with backoff across mirror addresses
//!        success                    → record, write through, return Fresh
//!        retries exhausted          → one breaker failure, fallback chain
//!     5. per fallback candidate     → same cache/breaker/budget/call steps
//!     6. stale cache entry          → return Stale
//!     7. nothing left               → return Degraded (never an error)
//! ```
//!
//! # Design Decisions
//! - One failure per exhausted retry cycle reaches the breaker, not one
//!   per attempt
//! - Remote "too many requests" opens the circuit at once; the local
//!   budget is a separate resource and is not charged
//! - Client errors fail fast to the fallback chain without penalizing
//!   the breaker
//! - Concurrent misses for one key are coalesced behind a single flight

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::time;
use url::Url;

use crate::cache::{CacheKey, CacheStats, ResponseCache};
use crate::config::schema::RetryConfig;
use crate::config::RouterConfig;
use crate::endpoint::{EndpointRegistry, EndpointSnapshot, ServiceEndpoint};
use crate::executor::inflight::{Flight, InflightMap};
use crate::executor::response::{ResponseStatus, RouterError, RouterResponse};
use crate::observability::metrics;
use crate::resilience::retries::{classify_status, classify_transport_error};
use crate::resilience::{calculate_backoff, CircuitBreaker, FailureKind, RateLimiter};
use crate::routing::FallbackRouter;
use crate::transport::{Transport, TransportRequest};

/// The composition root of the crate: one value owning every resilience
/// layer, built from configuration with an injected transport.
pub struct ResilienceRouter<T: Transport> {
    registry: Arc<EndpointRegistry>,
    breaker: CircuitBreaker,
    limiter: RateLimiter,
    cache: ResponseCache,
    fallbacks: FallbackRouter,
    transport: Arc<T>,
    retry: RetryConfig,
    inflight: InflightMap,
    totals: RequestTotals,
    disabled: AtomicBool,
    started_at: Instant,
}

/// One call attempt's terminal failure, after classification.
struct CallFailure {
    kind: FailureKind,
    error: String,
}

impl<T: Transport> ResilienceRouter<T> {
    pub fn from_config(config: &RouterConfig, transport: Arc<T>) -> Self {
        let registry = Arc::new(EndpointRegistry::from_config(&config.endpoints));
        tracing::info!(
            endpoints = registry.len(),
            fallback_rules = config.fallback_rules.len(),
            cache_capacity = config.cache.capacity,
            "Building resilience router"
        );
        Self {
            breaker: CircuitBreaker::new(Arc::clone(&registry)),
            limiter: RateLimiter::from_config(&config.endpoints),
            cache: ResponseCache::new(config.cache.capacity),
            fallbacks: FallbackRouter::from_config(&config.fallback_rules),
            transport,
            retry: config.retry.clone(),
            inflight: InflightMap::new(),
            totals: RequestTotals::default(),
            disabled: AtomicBool::new(false),
            started_at: Instant::now(),
            registry,
        }
    }

    /// Execute one logical call. Resolves to a response for every
    /// upstream outcome; the only error is a caller mistake.
    pub async fn execute(
        &self,
        operation: &str,
        params: &Map<String, Value>,
        endpoint_id: &str,
    ) -> Result<RouterResponse, RouterError> {
        let started = Instant::now();
        let Some(endpoint) = self.registry.get(endpoint_id) else {
            return Err(RouterError::UnknownEndpoint(endpoint_id.to_string()));
        };

        if self.disabled.load(Ordering::Relaxed) {
            let response = self.passthrough(&endpoint, operation, params).await;
            return Ok(self.finish(response, endpoint_id, started));
        }

        let key = CacheKey::new(operation, params);
        if let Some(hit) = self.cache.get(&key, false) {
            let response = RouterResponse::fresh(hit.payload, hit.source_endpoint);
            return Ok(self.finish(response, endpoint_id, started));
        }

        let response = match self.inflight.join(&key) {
            Flight::Follower(mut rx) => match rx.recv().await {
                Ok(response) => response,
                // Leader went away without an answer; run it ourselves.
                Err(_) => self.run_pipeline(&endpoint, operation, params).await,
            },
            Flight::Leader(guard) => {
                let response = self.run_pipeline(&endpoint, operation, params).await;
                guard.complete(response.clone());
                response
            }
        };
        Ok(self.finish(response, endpoint_id, started))
    }

    /// Steps 2 through 7: requested endpoint, fallback chain, stale
    /// cache, degraded placeholder.
    async fn run_pipeline(
        &self,
        endpoint: &Arc<ServiceEndpoint>,
        operation: &str,
        params: &Map<String, Value>,
    ) -> RouterResponse {
        if let Some(response) = self.attempt(endpoint, operation, params).await {
            return response;
        }

        let candidates = self.fallbacks.resolve(&endpoint.id, operation);
        for candidate in &candidates {
            let Some(alternate) = self.registry.get(&candidate.endpoint_id) else {
                tracing::warn!(
                    endpoint = %candidate.endpoint_id,
                    "Fallback candidate not configured, skipping"
                );
                continue;
            };
            if let Some(response) = self.attempt(&alternate, &candidate.operation, params).await {
                tracing::info!(
                    from = %endpoint.id,
                    to = %alternate.id,
                    operation = %candidate.operation,
                    "Served by fallback"
                );
                metrics::record_fallback(&endpoint.id, &alternate.id);
                self.totals.fallback_serves.fetch_add(1, Ordering::Relaxed);
                return response;
            }
        }

        // Stale reads cover the original key and any rewritten ones.
        let mut keys = vec![CacheKey::new(operation, params)];
        for candidate in &candidates {
            let key = CacheKey::new(&candidate.operation, params);
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        for key in &keys {
            if let Some(hit) = self.cache.get(key, true) {
                tracing::info!(
                    endpoint = %endpoint.id,
                    operation = %operation,
                    age_secs = hit.age.as_secs(),
                    "Serving stale cache entry"
                );
                return RouterResponse::stale(hit.payload, hit.source_endpoint);
            }
        }

        tracing::warn!(
            endpoint = %endpoint.id,
            operation = %operation,
            "Returning degraded response"
        );
        RouterResponse::degraded(
            endpoint.id.as_str(),
            "no live, fallback, or cached data available",
        )
    }

    /// Cache, breaker, rate budget, then the timed call, against one
    /// endpoint. `None` means move on to the next candidate.
    async fn attempt(
        &self,
        endpoint: &Arc<ServiceEndpoint>,
        operation: &str,
        params: &Map<String, Value>,
    ) -> Option<RouterResponse> {
        let key = CacheKey::new(operation, params);
        if let Some(hit) = self.cache.get(&key, false) {
            return Some(RouterResponse::fresh(hit.payload, hit.source_endpoint));
        }

        if self.breaker.is_open(&endpoint.id) {
            tracing::debug!(endpoint = %endpoint.id, "Circuit open, skipping endpoint");
            return None;
        }

        if !self.limiter.try_acquire(&endpoint.id) {
            // Local budget exhausted. Not a remote failure, so the
            // breaker is left alone.
            self.totals.rate_limited.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        match self.call_with_retries(endpoint, operation, params).await {
            Ok((payload, elapsed)) => {
                self.breaker.record_success(&endpoint.id, Some(elapsed));
                self.cache.put(
                    key,
                    payload.clone(),
                    endpoint.cache_ttl,
                    endpoint.cache_priority,
                    &endpoint.id,
                );
                Some(RouterResponse::fresh(payload, endpoint.id.as_str()))
            }
            Err(failure) => {
                match failure.kind {
                    FailureKind::Transient => {
                        self.breaker.record_failure(&endpoint.id, &failure.error)
                    }
                    FailureKind::RateLimited => self.breaker.trip(&endpoint.id, &failure.error),
                    FailureKind::Client => endpoint.note_error(&failure.error),
                }
                None
            }
        }
    }

    /// Step 4: bounded call with retries. Retries rotate through the
    /// endpoint's mirror addresses with exponential backoff between
    /// attempts. Non-retryable failures return at once.
    async fn call_with_retries(
        &self,
        endpoint: &ServiceEndpoint,
        operation: &str,
        params: &Map<String, Value>,
    ) -> Result<(Value, Duration), CallFailure> {
        let mut last = CallFailure {
            kind: FailureKind::Transient,
            error: "no attempt made".to_string(),
        };

        for attempt in 0..=endpoint.max_retries {
            let delay = calculate_backoff(attempt, self.retry.base_delay_ms, self.retry.max_delay_ms);
            if !delay.is_zero() {
                time::sleep(delay).await;
            }

            let address = endpoint.address_for(attempt);
            let url = match build_url(address, operation, params) {
                Ok(url) => url,
                Err(reason) => {
                    return Err(CallFailure {
                        kind: FailureKind::Client,
                        error: reason,
                    });
                }
            };

            let request = TransportRequest::get(&url, endpoint.request_timeout);
            let started = Instant::now();
            let failure = match time::timeout(endpoint.request_timeout, self.transport.call(request))
                .await
            {
                Ok(Ok(response)) => match classify_status(response.status) {
                    None => match parse_payload(&response.body) {
                        Ok(payload) => return Ok((payload, started.elapsed())),
                        Err(reason) => CallFailure {
                            kind: FailureKind::Transient,
                            error: reason,
                        },
                    },
                    Some(kind) => CallFailure {
                        kind,
                        error: format!("status {} from {url}", response.status),
                    },
                },
                Ok(Err(e)) => CallFailure {
                    kind: classify_transport_error(&e),
                    error: e.to_string(),
                },
                Err(_) => CallFailure {
                    kind: FailureKind::Transient,
                    error: format!("no response from {url} within {:?}", endpoint.request_timeout),
                },
            };

            tracing::debug!(
                endpoint = %endpoint.id,
                attempt,
                error = %failure.error,
                "Call attempt failed"
            );
            if !failure.kind.is_retryable() {
                return Err(failure);
            }
            last = failure;
        }

        Err(last)
    }

    /// Bypass mode: one direct call, no resilience bookkeeping. Still
    /// resolves to a well-formed envelope.
    async fn passthrough(
        &self,
        endpoint: &Arc<ServiceEndpoint>,
        operation: &str,
        params: &Map<String, Value>,
    ) -> RouterResponse {
        let url = match build_url(endpoint.primary_address(), operation, params) {
            Ok(url) => url,
            Err(reason) => return RouterResponse::degraded(endpoint.id.as_str(), &reason),
        };

        let request = TransportRequest::get(&url, endpoint.request_timeout);
        match time::timeout(endpoint.request_timeout, self.transport.call(request)).await {
            Ok(Ok(response)) if classify_status(response.status).is_none() => {
                match parse_payload(&response.body) {
                    Ok(payload) => RouterResponse::fresh(payload, endpoint.id.as_str()),
                    Err(reason) => RouterResponse::degraded(endpoint.id.as_str(), &reason),
                }
            }
            Ok(Ok(response)) => RouterResponse::degraded(
                endpoint.id.as_str(),
                &format!("status {} from {url}", response.status),
            ),
            Ok(Err(e)) => RouterResponse::degraded(endpoint.id.as_str(), &e.to_string()),
            Err(_) => RouterResponse::degraded(
                endpoint.id.as_str(),
                &format!("no response from {url} within {:?}", endpoint.request_timeout),
            ),
        }
    }

    /// Stamp latency and record the outcome. Every response leaves
    /// through here.
    fn finish(&self, mut response: RouterResponse, requested: &str, started: Instant) -> RouterResponse {
        response.took_ms = started.elapsed().as_millis() as u64;
        self.totals.record(response.status);
        metrics::record_request(requested, response.status.as_str(), started);
        response
    }

    /// Operator status view.
    pub fn status(&self) -> RouterStatus {
        RouterStatus {
            disabled: self.disabled.load(Ordering::Relaxed),
            uptime_secs: self.started_at.elapsed().as_secs(),
            inflight: self.inflight.len(),
            endpoints: self.registry.snapshot(),
            totals: self.totals.snapshot(),
            cache: self.cache.stats(),
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Operator reset of one endpoint: circuit closed, failure streak
    /// and rate window dropped. False if the id is unknown.
    pub fn reset_endpoint(&self, endpoint_id: &str) -> bool {
        let known = self.breaker.reset(endpoint_id);
        if known {
            self.limiter.reset(endpoint_id);
        }
        known
    }

    /// Bypass the resilience layer globally. Cached entries are dropped
    /// and every endpoint record is restored to Healthy, so re-enabling
    /// starts from a clean slate.
    pub fn disable(&self) {
        self.disabled.store(true, Ordering::Relaxed);
        self.cache.clear();
        self.registry.reset_all();
        self.limiter.reset_all();
        tracing::warn!("Resilience layer disabled, calls pass straight through");
    }

    pub fn enable(&self) {
        self.disabled.store(false, Ordering::Relaxed);
        tracing::info!("Resilience layer enabled");
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Relaxed)
    }

    /// Time until the endpoint's rate window rolls over, if its budget
    /// is currently spent. Drives Retry-After on the gateway.
    pub fn rate_retry_after(&self, endpoint_id: &str) -> Option<Duration> {
        self.limiter.retry_after(endpoint_id)
    }

    /// `(limit, remaining)` for the endpoint's current rate window.
    pub fn rate_budget_view(&self, endpoint_id: &str) -> Option<(u32, u32)> {
        self.limiter.budget_view(endpoint_id)
    }

    /// Shared endpoint table, for wiring up the health monitor.
    pub fn registry(&self) -> Arc<EndpointRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn breaker(&self) -> CircuitBreaker {
        self.breaker.clone()
    }
}

/// GET URL for one operation: `{address}/{operation}` plus params as a
/// query string. Param maps iterate key-sorted, so logically identical
/// calls produce identical URLs.
fn build_url(address: &str, operation: &str, params: &Map<String, Value>) -> Result<String, String> {
    let joined = format!("{}/{}", address, operation.trim_start_matches('/'));
    let mut url = Url::parse(&joined).map_err(|e| format!("invalid request URL {joined}: {e}"))?;
    if !params.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in params {
            match value {
                Value::String(s) => pairs.append_pair(name, s),
                other => pairs.append_pair(name, &other.to_string()),
            };
        }
    }
    Ok(url.into())
}

fn parse_payload(body: &[u8]) -> Result<Value, String> {
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| format!("invalid JSON payload: {e}"))
}

#[derive(Default)]
struct RequestTotals {
    requests: AtomicU64,
    fresh: AtomicU64,
    stale: AtomicU64,
    degraded: AtomicU64,
    fallback_serves: AtomicU64,
    rate_limited: AtomicU64,
}

impl RequestTotals {
    fn record(&self, status: ResponseStatus) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let bucket = match status {
            ResponseStatus::Fresh => &self.fresh,
            ResponseStatus::Stale => &self.stale,
            ResponseStatus::Degraded => &self.degraded,
        };
        bucket.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> TotalsSnapshot {
        TotalsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            fresh: self.fresh.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
            fallback_serves: self.fallback_serves.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
        }
    }
}

/// Aggregate request counters since startup.
#[derive(Debug, Clone, Serialize)]
pub struct TotalsSnapshot {
    pub requests: u64,
    pub fresh: u64,
    pub stale: u64,
    pub degraded: u64,
    pub fallback_serves: u64,
    pub rate_limited: u64,
}

/// Everything `getStatus` reports.
#[derive(Debug, Serialize)]
pub struct RouterStatus {
    pub disabled: bool,
    pub uptime_secs: u64,
    pub inflight: usize,
    pub endpoints: BTreeMap<String, EndpointSnapshot>,
    pub totals: TotalsSnapshot,
    pub cache: CacheStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::EndpointState;
    use crate::transport::tests::MockTransport;
    use crate::transport::{TransportError, TransportResponse};
    use serde_json::json;
    use std::future::Future;
    use std::sync::atomic::AtomicU32;
    use tokio::sync::Semaphore;

    fn router_with(config: &str) -> (Arc<MockTransport>, ResilienceRouter<MockTransport>) {
        let config: RouterConfig = toml::from_str(config).unwrap();
        let transport = Arc::new(MockTransport::new());
        let router = ResilienceRouter::from_config(&config, transport.clone());
        (transport, router)
    }

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    const GEO_WITH_FALLBACK: &str = r#"
        [retry]
        base_delay_ms = 1
        max_delay_ms = 2

        [[endpoints]]
        id = "geo"
        addresses = ["http://geo.test"]
        failure_threshold = 3
        max_retries = 0

        [[endpoints]]
        id = "geo-fallback"
        addresses = ["http://geo-fb.test"]
        max_retries = 0

        [[fallback_rules]]
        pattern = "geo/*"
        [[fallback_rules.candidates]]
        endpoint = "geo-fallback"
    "#;

    #[tokio::test]
    async fn test_fresh_cache_hit_skips_the_network() {
        let (transport, router) = router_with(GEO_WITH_FALLBACK);
        transport.respond("http://geo.test", 200, json!({"features": [1]}));

        let p = params(json!({"bbox": "1,2,3,4"}));
        let first = router.execute("features", &p, "geo").await.unwrap();
        let second = router.execute("features", &p, "geo").await.unwrap();

        assert_eq!(first.status, ResponseStatus::Fresh);
        assert_eq!(second.status, ResponseStatus::Fresh);
        assert_eq!(second.source_endpoint, "geo");
        assert_eq!(second.payload, json!({"features": [1]}));
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_open_breaker_routes_straight_to_fallback() {
        let (transport, router) = router_with(GEO_WITH_FALLBACK);
        transport.fail(
            "http://geo.test",
            TransportError::Timeout(Duration::from_millis(40)),
        );
        transport.respond("http://geo-fb.test", 200, json!({"features": []}));

        let geo_calls = |t: &MockTransport| {
            t.calls()
                .iter()
                .filter(|u| u.starts_with("http://geo.test"))
                .count()
        };

        // Three timeout cycles open the circuit; each is still served
        // by the fallback.
        for i in 1..=3 {
            let response = router
                .execute("features", &params(json!({"i": i})), "geo")
                .await
                .unwrap();
            assert_eq!(response.source_endpoint, "geo-fallback");
        }
        assert_eq!(geo_calls(&transport), 3);
        assert!(router.registry().get("geo").unwrap().is_circuit_open());

        // Fourth call: the primary is not attempted at all.
        let response = router
            .execute("features", &params(json!({"i": 4})), "geo")
            .await
            .unwrap();
        assert_eq!(geo_calls(&transport), 3);
        assert_eq!(response.status, ResponseStatus::Fresh);
        assert_eq!(response.source_endpoint, "geo-fallback");
        assert_eq!(response.payload, json!({"features": []}));
    }

    #[tokio::test]
    async fn test_fallback_candidates_are_tried_in_rule_order() {
        let (transport, router) = router_with(
            r#"
            [retry]
            base_delay_ms = 1
            max_delay_ms = 2

            [[endpoints]]
            id = "geo"
            addresses = ["http://geo.test"]
            max_retries = 0

            [[endpoints]]
            id = "fb-one"
            addresses = ["http://fb-one.test"]
            max_retries = 0

            [[endpoints]]
            id = "fb-two"
            addresses = ["http://fb-two.test"]
            max_retries = 0

            [[fallback_rules]]
            pattern = "geo/*"
            [[fallback_rules.candidates]]
            endpoint = "fb-one"
            [[fallback_rules.candidates]]
            endpoint = "fb-two"
        "#,
        );
        transport.fail("http://geo.test", TransportError::Connect("down".into()));
        transport.fail("http://fb-one.test", TransportError::Connect("down".into()));
        transport.respond("http://fb-two.test", 200, json!({"ok": true}));

        let response = router
            .execute("features", &params(json!({})), "geo")
            .await
            .unwrap();
        assert_eq!(response.source_endpoint, "fb-two");

        let calls = transport.calls();
        let first = calls.iter().position(|u| u.starts_with("http://fb-one.test"));
        let second = calls.iter().position(|u| u.starts_with("http://fb-two.test"));
        assert!(first.unwrap() < second.unwrap());
    }

    #[tokio::test]
    async fn test_degraded_when_every_source_is_exhausted() {
        let (transport, router) = router_with(GEO_WITH_FALLBACK);
        transport.fail("http://", TransportError::Connect("all down".into()));

        let response = router
            .execute("features", &params(json!({"q": 9})), "geo")
            .await
            .unwrap();

        assert_eq!(response.status, ResponseStatus::Degraded);
        assert_eq!(response.source_endpoint, "geo");
        assert_eq!(response.payload["degraded"], true);
        assert!(response.payload["reason"].is_string());
    }

    #[tokio::test]
    async fn test_expired_entry_is_served_stale_when_nothing_lives() {
        let (transport, router) = router_with(
            r#"
            [[endpoints]]
            id = "geo"
            addresses = ["http://geo.test"]
            max_retries = 0
            cache_ttl_ms = 30

            [endpoints.rate_limit]
            max_requests = 1
            window_ms = 60000
        "#,
        );
        transport.respond("http://geo.test", 200, json!({"features": [7]}));

        let p = params(json!({"tile": "4/8/5"}));
        let first = router.execute("features", &p, "geo").await.unwrap();
        assert_eq!(first.status, ResponseStatus::Fresh);

        tokio::time::sleep(Duration::from_millis(60)).await;

        // Budget is spent and the entry has expired; the stale copy is
        // all that is left.
        let second = router.execute("features", &p, "geo").await.unwrap();
        assert_eq!(second.status, ResponseStatus::Stale);
        assert_eq!(second.payload, json!({"features": [7]}));
        assert_eq!(second.source_endpoint, "geo");
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_local_rate_reject_falls_back_without_breaker_penalty() {
        let (transport, router) = router_with(
            r#"
            [[endpoints]]
            id = "geo"
            addresses = ["http://geo.test"]
            max_retries = 0

            [endpoints.rate_limit]
            max_requests = 1
            window_ms = 60000

            [[endpoints]]
            id = "geo-fallback"
            addresses = ["http://geo-fb.test"]
            max_retries = 0

            [[fallback_rules]]
            pattern = "geo/*"
            [[fallback_rules.candidates]]
            endpoint = "geo-fallback"
        "#,
        );
        transport.respond("http://geo.test", 200, json!({"n": 1}));
        transport.respond("http://geo-fb.test", 200, json!({"n": 2}));

        let first = router
            .execute("features", &params(json!({"a": 1})), "geo")
            .await
            .unwrap();
        assert_eq!(first.source_endpoint, "geo");

        let second = router
            .execute("features", &params(json!({"a": 2})), "geo")
            .await
            .unwrap();
        assert_eq!(second.source_endpoint, "geo-fallback");
        assert_eq!(second.status, ResponseStatus::Fresh);

        let snap = router.registry().get("geo").unwrap().snapshot();
        assert_eq!(snap.consecutive_failures, 0);
        assert_eq!(snap.state, EndpointState::Healthy);
        assert_eq!(router.status().totals.rate_limited, 1);
        // The primary was only called once; the reject made no attempt.
        assert_eq!(
            transport
                .calls()
                .iter()
                .filter(|u| u.starts_with("http://geo.test"))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_remote_429_trips_the_breaker_at_once() {
        let (transport, router) = router_with(
            r#"
            [[endpoints]]
            id = "geo"
            addresses = ["http://geo.test"]
            failure_threshold = 4
            max_retries = 2

            [[endpoints]]
            id = "geo-fallback"
            addresses = ["http://geo-fb.test"]
            max_retries = 0

            [[fallback_rules]]
            pattern = "geo/*"
            [[fallback_rules.candidates]]
            endpoint = "geo-fallback"
        "#,
        );
        transport.respond("http://geo.test", 429, json!({"error": "slow down"}));
        transport.respond("http://geo-fb.test", 200, json!({"ok": true}));

        let response = router
            .execute("features", &params(json!({"x": 1})), "geo")
            .await
            .unwrap();
        assert_eq!(response.source_endpoint, "geo-fallback");

        // No retries against a 429, and the circuit opens without
        // reaching the failure threshold.
        assert_eq!(
            transport
                .calls()
                .iter()
                .filter(|u| u.starts_with("http://geo.test"))
                .count(),
            1
        );
        let endpoint = router.registry().get("geo").unwrap();
        assert!(endpoint.is_circuit_open());
        assert_eq!(endpoint.snapshot().state, EndpointState::CircuitOpen);
    }

    #[tokio::test]
    async fn test_client_errors_fail_fast_without_breaker_penalty() {
        // Retries are allowed here to prove none happen on a 404.
        let (transport, router) = router_with(
            r#"
            [retry]
            base_delay_ms = 1
            max_delay_ms = 2

            [[endpoints]]
            id = "geo"
            addresses = ["http://geo.test"]
            max_retries = 2

            [[endpoints]]
            id = "geo-fallback"
            addresses = ["http://geo-fb.test"]
            max_retries = 0

            [[fallback_rules]]
            pattern = "geo/*"
            [[fallback_rules.candidates]]
            endpoint = "geo-fallback"
        "#,
        );
        transport.respond("http://geo.test", 404, json!({"error": "no such op"}));
        transport.respond("http://geo-fb.test", 200, json!({"ok": true}));

        let response = router
            .execute("features", &params(json!({"x": 1})), "geo")
            .await
            .unwrap();
        assert_eq!(response.source_endpoint, "geo-fallback");

        assert_eq!(
            transport
                .calls()
                .iter()
                .filter(|u| u.starts_with("http://geo.test"))
                .count(),
            1
        );
        let snap = router.registry().get("geo").unwrap().snapshot();
        assert_eq!(snap.state, EndpointState::Healthy);
        assert_eq!(snap.consecutive_failures, 0);
        assert!(snap.last_error.unwrap().contains("404"));
    }

    #[tokio::test]
    async fn test_transient_errors_retry_then_count_one_breaker_failure() {
        let (transport, router) = router_with(
            r#"
            [retry]
            base_delay_ms = 1
            max_delay_ms = 2

            [[endpoints]]
            id = "geo"
            addresses = ["http://geo.test"]
            max_retries = 2

            [[endpoints]]
            id = "geo-fallback"
            addresses = ["http://geo-fb.test"]
            max_retries = 0

            [[fallback_rules]]
            pattern = "geo/*"
            [[fallback_rules.candidates]]
            endpoint = "geo-fallback"
        "#,
        );
        transport.respond("http://geo.test", 500, json!({"error": "boom"}));
        transport.respond("http://geo-fb.test", 200, json!({"ok": true}));

        let response = router
            .execute("features", &params(json!({"x": 1})), "geo")
            .await
            .unwrap();
        assert_eq!(response.source_endpoint, "geo-fallback");

        // Initial attempt plus two retries, then a single failure on
        // the breaker for the whole cycle.
        assert_eq!(
            transport
                .calls()
                .iter()
                .filter(|u| u.starts_with("http://geo.test"))
                .count(),
            3
        );
        assert_eq!(
            router
                .registry()
                .get("geo")
                .unwrap()
                .snapshot()
                .consecutive_failures,
            1
        );
    }

    #[tokio::test]
    async fn test_retries_rotate_through_mirror_addresses() {
        let (transport, router) = router_with(
            r#"
            [retry]
            base_delay_ms = 1
            max_delay_ms = 2

            [[endpoints]]
            id = "tiles"
            addresses = ["http://tiles-a.test", "http://tiles-b.test"]
            max_retries = 1
        "#,
        );
        transport.fail("http://", TransportError::Connect("down".into()));

        let response = router
            .execute("tile", &params(json!({"z": 3})), "tiles")
            .await
            .unwrap();
        assert_eq!(response.status, ResponseStatus::Degraded);

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("http://tiles-a.test"));
        assert!(calls[1].starts_with("http://tiles-b.test"));
    }

    #[tokio::test]
    async fn test_unknown_endpoint_is_a_caller_error() {
        let (_transport, router) = router_with(GEO_WITH_FALLBACK);
        let result = router.execute("features", &params(json!({})), "nope").await;
        assert_eq!(
            result.unwrap_err(),
            RouterError::UnknownEndpoint("nope".to_string())
        );
    }

    #[tokio::test]
    async fn test_fallback_responses_are_cached_under_the_rewritten_key() {
        let (transport, router) = router_with(
            r#"
            [[endpoints]]
            id = "maps"
            addresses = ["http://maps.test"]
            failure_threshold = 1
            max_retries = 0

            [[endpoints]]
            id = "maps-v2"
            addresses = ["http://maps-v2.test"]
            max_retries = 0

            [[fallback_rules]]
            pattern = "maps/*"
            [[fallback_rules.candidates]]
            endpoint = "maps-v2"
            add_prefix = "v2/"
        "#,
        );
        transport.fail("http://maps.test", TransportError::Connect("gone".into()));
        transport.respond("http://maps-v2.test", 200, json!({"tiles": [1, 2]}));

        let p = params(json!({"z": 5}));
        let first = router.execute("tiles", &p, "maps").await.unwrap();
        assert_eq!(first.source_endpoint, "maps-v2");

        // The second call finds the rewritten-operation entry while
        // resolving candidates; no new upstream call is made.
        let second = router.execute("tiles", &p, "maps").await.unwrap();
        assert_eq!(second.status, ResponseStatus::Fresh);
        assert_eq!(second.source_endpoint, "maps-v2");
        assert_eq!(
            transport
                .calls()
                .iter()
                .filter(|u| u.starts_with("http://maps-v2.test"))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_disabled_router_calls_straight_through() {
        let (transport, router) = router_with(GEO_WITH_FALLBACK);
        transport.respond("http://geo.test", 200, json!({"live": 1}));
        router.disable();

        let p = params(json!({"q": 1}));
        let first = router.execute("features", &p, "geo").await.unwrap();
        assert_eq!(first.status, ResponseStatus::Fresh);
        assert_eq!(first.source_endpoint, "geo");

        // No cache while bypassed: the identical call goes out again.
        router.execute("features", &p, "geo").await.unwrap();
        assert_eq!(transport.calls().len(), 2);

        router.enable();
        assert!(!router.is_disabled());
    }

    #[tokio::test]
    async fn test_disabling_drops_cache_and_heals_endpoints() {
        let (transport, router) = router_with(GEO_WITH_FALLBACK);
        transport.respond("http://geo.test", 200, json!({"n": 1}));

        router
            .execute("features", &params(json!({"a": 1})), "geo")
            .await
            .unwrap();
        router.registry().get("geo").unwrap().trip("too many requests");

        router.disable();

        let status = router.status();
        assert!(status.disabled);
        assert_eq!(status.cache.entries, 0);
        assert_eq!(status.endpoints["geo"].state, EndpointState::Healthy);
    }

    #[tokio::test]
    async fn test_reset_endpoint_closes_the_circuit() {
        let (transport, router) = router_with(
            r#"
            [[endpoints]]
            id = "geo"
            addresses = ["http://geo.test"]
            failure_threshold = 1
            max_retries = 0
        "#,
        );
        transport.fail("http://geo.test", TransportError::Connect("down".into()));

        router
            .execute("features", &params(json!({})), "geo")
            .await
            .unwrap();
        assert!(router.registry().get("geo").unwrap().is_circuit_open());

        assert!(router.reset_endpoint("geo"));
        let snap = router.registry().get("geo").unwrap().snapshot();
        assert_eq!(snap.state, EndpointState::Healthy);
        assert_eq!(snap.consecutive_failures, 0);

        assert!(!router.reset_endpoint("nope"));
    }

    #[tokio::test]
    async fn test_status_reports_totals_and_cache_counters() {
        let (transport, router) = router_with(
            r#"
            [[endpoints]]
            id = "geo"
            addresses = ["http://geo.test"]
            max_retries = 0

            [[endpoints]]
            id = "down"
            addresses = ["http://down.test"]
            max_retries = 0
        "#,
        );
        transport.respond("http://geo.test", 200, json!({"n": 1}));
        transport.fail("http://down.test", TransportError::Connect("down".into()));

        let p = params(json!({"a": 1}));
        router.execute("features", &p, "geo").await.unwrap();
        router.execute("features", &p, "geo").await.unwrap();
        router
            .execute("features", &params(json!({"b": 2})), "down")
            .await
            .unwrap();

        let status = router.status();
        assert_eq!(status.totals.requests, 3);
        assert_eq!(status.totals.fresh, 2);
        assert_eq!(status.totals.degraded, 1);
        assert_eq!(status.totals.fallback_serves, 0);
        assert_eq!(status.cache.entries, 1);
        assert_eq!(status.cache.hits, 1);
        assert!(!status.disabled);
        assert!(status.endpoints.contains_key("geo"));
        assert!(status.endpoints.contains_key("down"));
    }

    struct GateTransport {
        release: Semaphore,
        calls: AtomicU32,
    }

    impl Transport for GateTransport {
        fn call(
            &self,
            _request: TransportRequest,
        ) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            async move {
                let _permit = self.release.acquire().await.unwrap();
                Ok(TransportResponse {
                    status: 200,
                    body: br#"{"gated": true}"#.to_vec(),
                })
            }
        }
    }

    #[tokio::test]
    async fn test_concurrent_identical_misses_share_one_upstream_call() {
        let config: RouterConfig = toml::from_str(
            r#"
            [[endpoints]]
            id = "geo"
            addresses = ["http://geo.test"]
            max_retries = 0
        "#,
        )
        .unwrap();
        let transport = Arc::new(GateTransport {
            release: Semaphore::new(0),
            calls: AtomicU32::new(0),
        });
        let router = Arc::new(ResilienceRouter::from_config(&config, transport.clone()));

        let p = params(json!({"q": "berlin"}));
        let spawn_call = |router: Arc<ResilienceRouter<GateTransport>>, p: Map<String, Value>| {
            tokio::spawn(async move { router.execute("lookup", &p, "geo").await.unwrap() })
        };

        let first = spawn_call(router.clone(), p.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = spawn_call(router.clone(), p.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;

        transport.release.add_permits(4);

        let a = first.await.unwrap();
        let b = second.await.unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.status, ResponseStatus::Fresh);
        assert_eq!(b.status, ResponseStatus::Fresh);
        assert_eq!(a.payload, b.payload);
    }
}
