// HTTP operation handler
// Replays deferred HTTP writes described by an "http" operation payload
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use syncq_core::port::{OperationError, OperationHandler};

/// Kind the handler is registered under
pub const HTTP_OPERATION_KIND: &str = "http";

/// Payload of an "http" operation
///
/// ```json
/// { "method": "POST", "url": "https://api.example.com/notes",
///   "headers": { "Authorization": "Bearer ..." }, "body": { "text": "hi" } }
/// ```
///
/// A string `body` is sent as-is; any other JSON body is sent as
/// `application/json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequestSpec {
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

impl HttpRequestSpec {
    /// Parse and check an operation payload
    pub fn from_payload(payload: &serde_json::Value) -> Result<Self, OperationError> {
        let spec: Self = serde_json::from_value(payload.clone())
            .map_err(|e| OperationError::Permanent(format!("Invalid http payload: {}", e)))?;

        if !(spec.url.starts_with("http://") || spec.url.starts_with("https://")) {
            return Err(OperationError::Permanent(format!(
                "Unsupported URL '{}'",
                spec.url
            )));
        }
        spec.method()?;
        Ok(spec)
    }

    fn method(&self) -> Result<Method, OperationError> {
        Method::from_bytes(self.method.to_ascii_uppercase().as_bytes()).map_err(|_| {
            OperationError::Permanent(format!("Invalid HTTP method '{}'", self.method))
        })
    }
}

/// Map a response status to the queue's failure classification
///
/// 2xx succeeds; 408, 429 and 5xx are worth retrying; any other status is
/// a permanent rejection.
pub fn classify_status(status: StatusCode) -> Result<(), OperationError> {
    if status.is_success() {
        return Ok(());
    }

    let retryable = status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS;

    if retryable {
        Err(OperationError::Transient(format!("HTTP {}", status)))
    } else {
        Err(OperationError::Permanent(format!("HTTP {}", status)))
    }
}

/// Sends deferred HTTP requests with reqwest
pub struct HttpOperationHandler {
    client: Client,
}

impl HttpOperationHandler {
    /// Create a handler whose requests give up after `request_timeout`
    pub fn new(request_timeout: Duration) -> Result<Self, OperationError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| OperationError::Permanent(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OperationHandler for HttpOperationHandler {
    async fn execute(&self, payload: &serde_json::Value) -> Result<(), OperationError> {
        let spec = HttpRequestSpec::from_payload(payload)?;
        let method = spec.method()?;

        let mut request = self.client.request(method, &spec.url);
        for (name, value) in &spec.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request = match &spec.body {
            None => request,
            Some(serde_json::Value::String(text)) => request.body(text.clone()),
            Some(json) => request.json(json),
        };

        let response = request.send().await.map_err(|e| {
            warn!(url = %spec.url, error = %e, "HTTP request failed");
            if e.is_builder() {
                OperationError::Permanent(format!("Invalid request: {}", e))
            } else {
                OperationError::Transient(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status();
        debug!(method = %spec.method, url = %spec.url, status = status.as_u16(), "HTTP request replayed");
        classify_status(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve a single request with the given status line, returning the URL
    async fn one_shot_server(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = vec![0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status_line
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        format!("http://{}/notes", addr)
    }

    fn handler() -> HttpOperationHandler {
        HttpOperationHandler::new(Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::OK).is_ok());
        assert!(classify_status(StatusCode::NO_CONTENT).is_ok());
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE),
            Err(OperationError::Transient(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            Err(OperationError::Transient(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::REQUEST_TIMEOUT),
            Err(OperationError::Transient(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY),
            Err(OperationError::Permanent(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND),
            Err(OperationError::Permanent(_))
        ));
    }

    #[test]
    fn test_payload_parsing() {
        let spec = HttpRequestSpec::from_payload(&json!({
            "method": "post",
            "url": "https://api.example.com/notes",
            "headers": { "X-Client": "syncq" },
            "body": { "text": "hello" }
        }))
        .unwrap();
        assert_eq!(spec.headers.get("X-Client").map(String::as_str), Some("syncq"));
        assert_eq!(spec.method().unwrap(), Method::POST);
    }

    #[test]
    fn test_malformed_payload_is_permanent() {
        let missing_url = HttpRequestSpec::from_payload(&json!({ "method": "GET" }));
        assert!(matches!(missing_url, Err(OperationError::Permanent(_))));

        let bad_scheme =
            HttpRequestSpec::from_payload(&json!({ "method": "GET", "url": "ftp://host/file" }));
        assert!(matches!(bad_scheme, Err(OperationError::Permanent(_))));

        let bad_method =
            HttpRequestSpec::from_payload(&json!({ "method": "GE T", "url": "http://host/" }));
        assert!(matches!(bad_method, Err(OperationError::Permanent(_))));
    }

    #[tokio::test]
    async fn test_execute_success() {
        let url = one_shot_server("201 Created").await;
        let result = handler()
            .execute(&json!({ "method": "POST", "url": url, "body": { "text": "hi" } }))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_execute_server_error_is_transient() {
        let url = one_shot_server("503 Service Unavailable").await;
        let result = handler()
            .execute(&json!({ "method": "PUT", "url": url, "body": "raw text" }))
            .await;
        assert!(matches!(result, Err(OperationError::Transient(_))));
    }

    #[tokio::test]
    async fn test_execute_client_error_is_permanent() {
        let url = one_shot_server("400 Bad Request").await;
        let result = handler()
            .execute(&json!({ "method": "DELETE", "url": url }))
            .await;
        assert!(matches!(result, Err(OperationError::Permanent(_))));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = handler()
            .execute(&json!({ "method": "GET", "url": format!("http://{}/", addr) }))
            .await;
        assert!(matches!(result, Err(OperationError::Transient(_))));
    }
}
