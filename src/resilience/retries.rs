//! Failure classification for retry and breaker decisions.
//!
//! # Responsibilities
//! - Decide whether a failed attempt is worth retrying
//! - Decide what a failure means for the endpoint's circuit
//!
//! # Design Decisions
//! - Classification is structural (status codes, transport error shape),
//!   never string matching on messages
//! - 4xx is the caller's fault, not the upstream's: no retry, no breaker
//!   penalty
//! - 429 is its own class; the remote's budget is a distinct resource
//!   from ours and opens the circuit immediately

use crate::transport::TransportError;

/// What kind of failure one call attempt produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeout, connection trouble or a 5xx: retry, then penalize the
    /// breaker on exhaustion.
    Transient,
    /// 4xx other than 429: the request itself is bad for this endpoint.
    Client,
    /// Remote "too many requests".
    RateLimited,
}

impl FailureKind {
    pub fn is_retryable(self) -> bool {
        self == FailureKind::Transient
    }

    /// Whether retry exhaustion with this kind counts toward the
    /// failure threshold.
    pub fn penalizes_breaker(self) -> bool {
        self == FailureKind::Transient
    }
}

/// Classifies an HTTP status. `None` means success.
pub fn classify_status(status: u16) -> Option<FailureKind> {
    match status {
        200..=299 => None,
        429 => Some(FailureKind::RateLimited),
        400..=499 => Some(FailureKind::Client),
        500..=599 => Some(FailureKind::Transient),
        // Anything else (stray 1xx/3xx after redirect handling) is not an
        // upstream failure; treat like a client-side problem.
        _ => Some(FailureKind::Client),
    }
}

pub fn classify_transport_error(error: &TransportError) -> FailureKind {
    match error {
        TransportError::Timeout(_) | TransportError::Connect(_) | TransportError::Other(_) => {
            FailureKind::Transient
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_classification() {
        assert_eq!(classify_status(200), None);
        assert_eq!(classify_status(204), None);
        assert_eq!(classify_status(404), Some(FailureKind::Client));
        assert_eq!(classify_status(400), Some(FailureKind::Client));
        assert_eq!(classify_status(429), Some(FailureKind::RateLimited));
        assert_eq!(classify_status(500), Some(FailureKind::Transient));
        assert_eq!(classify_status(503), Some(FailureKind::Transient));
    }

    #[test]
    fn test_transport_errors_are_transient() {
        let timeout = TransportError::Timeout(Duration::from_secs(1));
        let connect = TransportError::Connect("refused".to_string());
        assert_eq!(classify_transport_error(&timeout), FailureKind::Transient);
        assert_eq!(classify_transport_error(&connect), FailureKind::Transient);
    }

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(FailureKind::Transient.is_retryable());
        assert!(!FailureKind::Client.is_retryable());
        assert!(!FailureKind::RateLimited.is_retryable());
    }

    #[test]
    fn test_breaker_penalty_rules() {
        assert!(FailureKind::Transient.penalizes_breaker());
        assert!(!FailureKind::Client.penalizes_breaker());
        assert!(!FailureKind::RateLimited.penalizes_breaker());
    }
}
