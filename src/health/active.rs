//! Active endpoint probing.
//!
//! # Responsibilities
//! - Periodically probe each endpoint's health path
//! - Feed probe outcomes into the circuit breaker
//! - Record probe latency and up/down gauges

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;
use tokio::time;

use crate::config::schema::HealthConfig;
use crate::endpoint::{EndpointRegistry, ServiceEndpoint};
use crate::observability::metrics;
use crate::resilience::CircuitBreaker;
use crate::transport::{Transport, TransportRequest};

/// Background prober. Runs until the shutdown channel fires.
pub struct HealthMonitor<T: Transport> {
    registry: Arc<EndpointRegistry>,
    breaker: CircuitBreaker,
    transport: Arc<T>,
    config: HealthConfig,
}

impl<T: Transport> HealthMonitor<T> {
    pub fn new(
        registry: Arc<EndpointRegistry>,
        breaker: CircuitBreaker,
        transport: Arc<T>,
        config: HealthConfig,
    ) -> Self {
        Self {
            registry,
            breaker,
            transport,
            config,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health probes disabled");
            return;
        }

        tracing::info!(
            interval_secs = self.config.interval_secs,
            endpoints = self.registry.len(),
            "Health monitor starting"
        );

        let mut ticker = time::interval(self.config.interval());
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.probe_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every endpoint whose circuit is closed. Open circuits heal
    /// through the breaker's timed reset, not through probing.
    async fn probe_all(&self) {
        for endpoint in self.registry.all() {
            if endpoint.is_circuit_open() {
                tracing::debug!(endpoint = %endpoint.id, "Skipping probe, circuit open");
                continue;
            }
            self.probe(&endpoint).await;
        }
    }

    async fn probe(&self, endpoint: &ServiceEndpoint) {
        let url = format!("{}{}", endpoint.primary_address(), endpoint.probe_path);
        let request = TransportRequest::get(&url, self.config.probe_timeout());
        let started = Instant::now();

        let outcome = match time::timeout(self.config.probe_timeout(), self.transport.call(request))
            .await
        {
            Ok(Ok(response)) if response.ok() => Ok(started.elapsed()),
            Ok(Ok(response)) => Err(format!("probe returned status {}", response.status)),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "no probe response within {:?}",
                self.config.probe_timeout()
            )),
        };

        match outcome {
            Ok(elapsed) => {
                self.breaker.record_success(&endpoint.id, Some(elapsed));
                metrics::record_probe_duration(&endpoint.id, elapsed);
                metrics::record_endpoint_up(&endpoint.id, true);
            }
            Err(error) => {
                tracing::warn!(endpoint = %endpoint.id, url = %url, error = %error, "Probe failed");
                self.breaker.record_failure(&endpoint.id, &error);
                metrics::record_endpoint_up(&endpoint.id, false);
            }
        }
    }
}
