//! Outbound transport abstraction.
//!
//! # Responsibilities
//! - Define the one raw HTTP primitive the router is allowed to use
//! - Map transport-level failures into a small error taxonomy
//! - Provide the production implementation on top of reqwest
//!
//! # Design Decisions
//! - The primitive is injected at router construction; call sites never
//!   reach for a global client
//! - Any HTTP response, whatever its status, is a successful transport
//!   call; the executor classifies statuses
//! - Errors are only network-shaped: timeout, connect, other

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// One outbound request, fully addressed.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
}

impl TransportRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: vec![("accept".to_string(), "application/json".to_string())],
            body: None,
            timeout,
        }
    }
}

/// A response as seen by the transport: status plus raw body.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Errors that can occur before an HTTP response exists.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// No response within the per-call deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Could not reach the remote at all.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Anything else the underlying client reports.
    #[error("transport failure: {0}")]
    Other(String),
}

/// The raw-call primitive. The router never assumes anything about an
/// implementation beyond: it eventually resolves with a status-carrying
/// response, or it fails with a [`TransportError`].
pub trait Transport: Send + Sync + 'static {
    fn call(
        &self,
        request: TransportRequest,
    ) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send;
}

/// Production transport backed by a shared reqwest client.
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for HttpTransport {
    fn call(
        &self,
        request: TransportRequest,
    ) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send {
        let client = self.client.clone();
        async move {
            let method = reqwest::Method::from_bytes(request.method.as_bytes())
                .map_err(|e| TransportError::Other(e.to_string()))?;

            let mut builder = client
                .request(method, &request.url)
                .timeout(request.timeout);
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| map_reqwest_error(e, request.timeout))?;
            let status = response.status().as_u16();
            let body = response
                .bytes()
                .await
                .map_err(|e| map_reqwest_error(e, request.timeout))?
                .to_vec();

            Ok(TransportResponse { status, body })
        }
    }
}

fn map_reqwest_error(e: reqwest::Error, timeout: Duration) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(timeout)
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Scripted transport for pipeline tests: URL-prefix rules checked in
    /// order, every call recorded.
    #[derive(Default)]
    pub struct MockTransport {
        rules: Mutex<Vec<(String, Result<TransportResponse, TransportError>)>>,
        calls: Mutex<Vec<String>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Any call whose URL starts with `prefix` gets this JSON response.
        pub fn respond(&self, prefix: &str, status: u16, body: serde_json::Value) {
            self.rules.lock().unwrap().push((
                prefix.to_string(),
                Ok(TransportResponse {
                    status,
                    body: body.to_string().into_bytes(),
                }),
            ));
        }

        /// Any call whose URL starts with `prefix` fails with `error`.
        pub fn fail(&self, prefix: &str, error: TransportError) {
            self.rules.lock().unwrap().push((prefix.to_string(), Err(error)));
        }

        /// URLs called so far, in order.
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Transport for MockTransport {
        fn call(
            &self,
            request: TransportRequest,
        ) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send {
            self.calls.lock().unwrap().push(request.url.clone());
            let result = self
                .rules
                .lock()
                .unwrap()
                .iter()
                .find(|(prefix, _)| request.url.starts_with(prefix))
                .map(|(_, result)| result.clone())
                .unwrap_or_else(|| {
                    Err(TransportError::Connect(format!(
                        "no mock rule for {}",
                        request.url
                    )))
                });
            async move { result }
        }
    }

    #[tokio::test]
    async fn test_mock_matches_by_prefix_and_records_calls() {
        let mock = MockTransport::new();
        mock.respond("http://geo", 200, serde_json::json!({"ok": true}));

        let hit = mock
            .call(TransportRequest::get(
                "http://geo/features",
                Duration::from_secs(1),
            ))
            .await
            .unwrap();
        assert!(hit.ok());

        let miss = mock
            .call(TransportRequest::get(
                "http://other/x",
                Duration::from_secs(1),
            ))
            .await;
        assert!(matches!(miss, Err(TransportError::Connect(_))));

        assert_eq!(mock.calls(), vec!["http://geo/features", "http://other/x"]);
    }

    #[test]
    fn test_ok_covers_2xx_only() {
        let ok = TransportResponse { status: 204, body: vec![] };
        let not = TransportResponse { status: 404, body: vec![] };
        assert!(ok.ok());
        assert!(!not.ok());
    }
}
