//! HTTP gateway subsystem.
//!
//! # Data Flow
//! ```text
//! POST /v1/execute {operation, params, endpoint}
//!     |
//!     v
//! server.rs (decode, pin current config generation)
//!     |
//!     v
//! executor (cache / rate limit / breaker / retries / fallback)
//!     |
//!     v
//! envelope {status, payload, source_endpoint, took_ms}
//!
//! GET /health  -> gateway liveness, never touches upstreams
//! /admin/*     -> administrative surface, bearer auth
//! ```

pub mod server;

pub use server::{AppState, GatewayInner, GatewayServer};
