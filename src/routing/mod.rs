//! Fallback routing subsystem.
//!
//! # Data Flow
//! ```text
//! Failed request (endpoint id, operation)
//!     → router.rs (first matching rule)
//!     → matcher.rs (evaluate target patterns)
//!     → Return: ordered FallbackCandidates with rewritten operations
//!
//! Rule Compilation (at startup):
//!     FallbackRuleConfig[]
//!     → Compile patterns (exact targets, trailing-`*` prefixes)
//!     → Freeze as immutable FallbackRouter
//! ```
//!
//! # Design Decisions
//! - Rules compiled at startup, immutable at runtime
//! - First match wins (configuration order)
//! - Resolution is static config lookup; circuit and rate limit state
//!   only affect whether the executor can use a candidate, never which
//!   candidates come back
//! - Deterministic: same target always resolves to the same candidates

pub mod matcher;
pub mod router;

pub use matcher::TargetPattern;
pub use router::{FallbackCandidate, FallbackRouter};
