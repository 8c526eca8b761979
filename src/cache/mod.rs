//! TTL response cache.
//!
//! # Responsibilities
//! - Keep the last successful payload per logical call (operation + params)
//! - Serve fresh hits without any network interaction
//! - Serve expired entries on explicit stale reads, as a last resort
//! - Evict under capacity pressure: Normal priority before High, then
//!   oldest-inserted first
//!
//! # Design Decisions
//! - Keys are deterministic over the full parameter set, so logically
//!   identical calls share a slot regardless of parameter field order
//! - Keys carry no endpoint id: any endpoint answering the same operation
//!   and params refreshes the same slot
//! - One mutex around the whole store; eviction needs map + insertion
//!   order updated together

pub mod key;
pub mod store;

pub use key::CacheKey;
pub use store::{CachePriority, CacheStats, CachedResponse, ResponseCache};
