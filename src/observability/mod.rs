//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! executor / cache / breaker / health
//!     → logging.rs (structured events, pretty or JSON)
//!     → metrics.rs (breakwater_* counters, gauges, histograms)
//!
//! Scrape path:
//!     Prometheus → metrics listener (own port, outside the gateway)
//! ```
//!
//! # Design Decisions
//! - Log format and level come from config; RUST_LOG overrides both
//! - Recording helpers take plain strs so callers never build label
//!   maps by hand
//! - The exporter listener is separate from the gateway listener, so
//!   scrapes bypass the request pipeline entirely

pub mod logging;
pub mod metrics;
