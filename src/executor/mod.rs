//! Request execution subsystem.
//!
//! # Data Flow
//! ```text
//! execute(operation, params, endpoint)
//!     → router.rs (cache → breaker → rate limit → timed call/retries
//!                  → fallback chain → stale cache → degraded)
//!     → inflight.rs (coalesce concurrent misses per cache key)
//!     → response.rs (Fresh | Stale | Degraded envelope)
//! ```
//!
//! # Design Decisions
//! - Every upstream outcome resolves to an envelope; `execute` only
//!   errors on caller mistakes (unknown endpoint id)
//! - The transport is a constructor parameter, so the whole pipeline
//!   runs against scripted upstreams in tests

pub mod inflight;
pub mod response;
pub mod router;

pub use response::{ResponseStatus, RouterError, RouterResponse};
pub use router::{ResilienceRouter, RouterStatus, TotalsSnapshot};
