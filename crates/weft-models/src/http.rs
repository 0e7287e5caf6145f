//! HTTP implementation of `ApiCaller`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::{debug, error, warn};
use weft_abstraction::{ApiCaller, ApiRequest, HttpMethod, ServiceError};

/// Largest number of response body bytes kept in error messages.
const MAX_ERROR_BODY: usize = 2048;

/// `ApiCaller` that performs real HTTP requests with reqwest.
#[derive(Debug, Clone, Default)]
pub struct HttpApiCaller {
    client: Client,
}

impl HttpApiCaller {
    /// Creates a caller with a default client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a caller whose requests time out after `timeout`.
    ///
    /// # Errors
    /// Returns `ServiceError::Request` if the client cannot be built.
    pub fn with_timeout(timeout: Duration) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Request(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

#[async_trait]
impl ApiCaller for HttpApiCaller {
    async fn call(&self, request: &ApiRequest) -> Result<Value, ServiceError> {
        debug!(method = %request.method, url = %request.url, "Performing API call");

        let mut builder = self.client.request(Self::method(request.method), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            error!(url = %request.url, error = %e, "API call failed to send");
            ServiceError::Request(e.to_string())
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            ServiceError::Request(format!("Failed to read response body: {}", e))
        })?;

        if !status.is_success() {
            warn!(url = %request.url, status = %status, "API call returned error status");
            let mut body = text;
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(ServiceError::Response { status: status.as_u16(), body });
        }

        if text.is_empty() {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_call_decodes_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/items")
            .match_header("x-token", "abc")
            .match_body(mockito::Matcher::Json(json!({"name": "widget"})))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 7}"#)
            .create_async()
            .await;

        let mut request = ApiRequest::new(HttpMethod::Post, format!("{}/items", server.url()));
        request.headers.insert("x-token".to_string(), "abc".to_string());
        request.body = Some(json!({"name": "widget"}));

        let value = HttpApiCaller::new().call(&request).await.unwrap();
        assert_eq!(value, json!({"id": 7}));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_call_returns_plain_text_as_string() {
        let mut server = mockito::Server::new_async().await;
        let _mock =
            server.mock("GET", "/ping").with_status(200).with_body("pong").create_async().await;

        let request = ApiRequest::new(HttpMethod::Get, format!("{}/ping", server.url()));
        let value = HttpApiCaller::new().call(&request).await.unwrap();
        assert_eq!(value, Value::String("pong".to_string()));
    }

    #[tokio::test]
    async fn test_call_maps_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock =
            server.mock("GET", "/missing").with_status(404).with_body("nope").create_async().await;

        let request = ApiRequest::new(HttpMethod::Get, format!("{}/missing", server.url()));
        let err = HttpApiCaller::new().call(&request).await.unwrap_err();
        assert_eq!(err, ServiceError::Response { status: 404, body: "nope".to_string() });
    }

    #[tokio::test]
    async fn test_call_unreachable_host() {
        let request = ApiRequest::new(HttpMethod::Get, "http://127.0.0.1:1/unreachable");
        let err = HttpApiCaller::new().call(&request).await.unwrap_err();
        assert!(matches!(err, ServiceError::Request(_)));
    }
}
