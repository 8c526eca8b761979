//! Response envelope and caller-facing errors.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// How the payload was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// Live upstream response, or a cache entry inside its TTL.
    Fresh,
    /// Expired cache entry served because nothing live was available.
    Stale,
    /// Placeholder payload; every source was exhausted.
    Degraded,
}

impl ResponseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Stale => "stale",
            Self::Degraded => "degraded",
        }
    }
}

/// What every `execute` call resolves to. Upstream trouble is folded into
/// `status`, never surfaced as an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterResponse {
    pub status: ResponseStatus,
    pub payload: Value,
    /// Endpoint that produced the payload. For degraded responses this is
    /// the endpoint the caller asked for.
    pub source_endpoint: String,
    pub took_ms: u64,
}

impl RouterResponse {
    pub fn fresh(payload: Value, source_endpoint: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Fresh,
            payload,
            source_endpoint: source_endpoint.into(),
            took_ms: 0,
        }
    }

    pub fn stale(payload: Value, source_endpoint: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Stale,
            payload,
            source_endpoint: source_endpoint.into(),
            took_ms: 0,
        }
    }

    /// Well-formed placeholder for a call nothing could serve.
    pub fn degraded(source_endpoint: impl Into<String>, reason: &str) -> Self {
        Self {
            status: ResponseStatus::Degraded,
            payload: json!({ "degraded": true, "reason": reason }),
            source_endpoint: source_endpoint.into(),
            took_ms: 0,
        }
    }
}

/// Caller mistakes. Everything an upstream can do wrong is absorbed into
/// a stale or degraded [`RouterResponse`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_lowercase() {
        let response = RouterResponse::fresh(json!({"n": 1}), "geo");
        let wire = serde_json::to_value(&response).unwrap();
        assert_eq!(wire["status"], "fresh");
        assert_eq!(wire["source_endpoint"], "geo");
        assert_eq!(wire["took_ms"], 0);
    }

    #[test]
    fn test_degraded_payload_is_tagged() {
        let response = RouterResponse::degraded("geo", "nothing available");
        assert_eq!(response.payload["degraded"], true);
        assert_eq!(response.payload["reason"], "nothing available");
        assert_eq!(response.status.as_str(), "degraded");
    }
}
