//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to an upstream endpoint:
//!     → rate_limit.rs (spend from the endpoint's fixed-window budget)
//!     → circuit_breaker.rs (skip the endpoint entirely while open)
//!     → attempt with deadline; on failure: retries.rs classifies,
//!       backoff.rs paces the next attempt
//!     → exhausted retries feed the breaker, then fallback takes over
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Only transient failures are retried; client errors fail fast
//! - Circuit breaker prevents hammering a down upstream
//! - A remote "too many requests" opens the circuit immediately

pub mod backoff;
pub mod circuit_breaker;
pub mod rate_limit;
pub mod retries;

pub use backoff::calculate_backoff;
pub use circuit_breaker::CircuitBreaker;
pub use rate_limit::RateLimiter;
pub use retries::FailureKind;
