//! Network relay
//!
//! Performs the HTTP requests modules ask for. The relay runs on the
//! multi-threaded worker runtime; results are handed back to the engine
//! thread by the dispatcher. Non-2xx statuses are not failures: the body
//! is returned as-is and the status is only logged.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::core::config::RelayConfig;
use crate::core::error::{BridgeError, Result};
use crate::protocol::{HttpMethod, RequestPayload};

/// Executes one module HTTP ask and returns the response body
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    async fn execute(&self, request: RequestPayload) -> Result<String>;
}

/// reqwest-backed relay
#[derive(Debug, Clone)]
pub struct HttpRelay {
    client: reqwest::Client,
}

impl HttpRelay {
    pub fn new(config: &RelayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .user_agent(config.user_agent.as_str())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| {
                BridgeError::Initialization(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl RequestExecutor for HttpRelay {
    async fn execute(&self, request: RequestPayload) -> Result<String> {
        let method = request.http_method()?;
        let url = Url::parse(&request.url)
            .map_err(|e| BridgeError::InvalidUrl(format!("{}: {}", request.url, e)))?;

        let mut builder = match method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
            HttpMethod::Put => self.client.put(url),
            HttpMethod::Delete => self.client.delete(url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if method != HttpMethod::Get {
            if let Some(body) = request.body {
                builder = builder.body(body);
            }
        }

        let response = builder.send().await.map_err(|e| {
            warn!(
                req_id = %request.request_id,
                url = %request.url,
                error = %e,
                "Relay request failed"
            );
            // Bad header names or values from the module surface as builder errors
            if e.is_builder() {
                BridgeError::InvalidRequest(e.to_string())
            } else {
                BridgeError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(req_id = %request.request_id, url = %request.url, %status, "Non-success status");
        }

        let text = response
            .text()
            .await
            .map_err(|e| BridgeError::Transport(format!("Failed to read body: {}", e)))?;

        debug!(
            req_id = %request.request_id,
            %method,
            %status,
            len = text.len(),
            "Relay request completed"
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn relay() -> HttpRelay {
        HttpRelay::new(&RelayConfig::default()).unwrap()
    }

    fn request(method: &str, url: String) -> RequestPayload {
        let mut request = RequestPayload::http_get("1", url);
        request.method = method.to_string();
        request
    }

    #[tokio::test]
    async fn test_get_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(header("referer", "https://example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let mut req = request("GET", format!("{}/search", server.uri()));
        req.headers
            .insert("Referer".to_string(), "https://example.com".to_string());

        assert_eq!(relay().execute(req).await.unwrap(), "<html>ok</html>");
    }

    #[tokio::test]
    async fn test_post_sends_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api"))
            .and(body_string("q=batman"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(1)
            .mount(&server)
            .await;

        let mut req = request("post", format!("{}/api", server.uri()));
        req.body = Some("q=batman".to_string());

        assert_eq!(relay().execute(req).await.unwrap(), "[]");
    }

    #[tokio::test]
    async fn test_error_status_is_not_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
            .mount(&server)
            .await;

        let req = request("GET", format!("{}/missing", server.uri()));
        assert_eq!(relay().execute(req).await.unwrap(), "not here");
    }

    #[tokio::test]
    async fn test_unsupported_method_rejected_before_io() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let req = request("PATCH", format!("{}/x", server.uri()));
        let err = relay().execute(req).await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidMethod(ref m) if m == "PATCH"));
    }

    #[tokio::test]
    async fn test_invalid_header_is_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut req = request("GET", format!("{}/x", server.uri()));
        req.headers
            .insert("bad header".to_string(), "value".to_string());

        let err = relay().execute(req).await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidRequest(_)));
        assert_eq!(err.kind(), crate::core::error::ErrorKind::Protocol);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let err = relay()
            .execute(request("GET", "not a url".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let err = relay()
            .execute(request("GET", "http://127.0.0.1:1/gone".to_string()))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
