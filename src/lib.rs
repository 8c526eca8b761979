//! Breakwater is a resilient request router for unreliable upstream HTTP
//! services.
//!
//! The crate sits between application code and a set of flaky upstreams
//! (geospatial APIs, tile providers) and makes calls to them survivable:
//! circuit breakers, fixed-window rate limiting, TTL response caching with
//! stale reads, and ordered fallback chains. Callers always get a
//! well-formed result tagged `fresh`, `stale` or `degraded`, never a hard
//! failure, when an upstream is down.
//!
//! The top-level value is [`executor::ResilienceRouter`], owned by the
//! composition root and handed around by `Arc`. The outbound HTTP
//! primitive is injected as a [`transport::Transport`] implementation.

pub mod admin;
pub mod cache;
pub mod config;
pub mod endpoint;
pub mod executor;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod transport;

pub use config::schema::RouterConfig;
pub use executor::{ResilienceRouter, ResponseStatus, RouterError, RouterResponse};
pub use lifecycle::Shutdown;
pub use transport::{HttpTransport, Transport};
