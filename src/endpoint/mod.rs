//! Upstream endpoint records.
//!
//! # Responsibilities
//! - Represent one logical upstream service and its addresses
//! - Track per-endpoint health (state, failure streak, circuit timer)
//! - Expose status snapshots for the admin surface
//!
//! # Design Decisions
//! - One mutex per endpoint around the whole health record; breaker
//!   transitions read and write several fields and must see them together
//! - The lock is never held across an await
//! - Records are created from config and live for the process; only
//!   operator actions reset them

pub mod registry;
pub mod service;

pub use registry::EndpointRegistry;
pub use service::{EndpointSnapshot, EndpointState, ServiceEndpoint};
