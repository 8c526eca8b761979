//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active probes (active.rs):
//!     Periodic timer
//!     → GET {primary_address}{probe_path} per closed-circuit endpoint
//!     → CircuitBreaker.record_success / record_failure
//!
//! Passive signals:
//!     Request path outcomes (executor)
//!     → Same breaker records, per call result
//! ```
//!
//! # Design Decisions
//! - Active and passive signals feed one shared breaker record
//! - Probes use a short timeout so a hung upstream cannot stall the loop
//! - Endpoints with an open circuit are left to the timed reset

pub mod active;

pub use active::HealthMonitor;
