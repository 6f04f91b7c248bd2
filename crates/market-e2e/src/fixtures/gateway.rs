//! Shared HTTP plumbing for the gateway clients.
//!
//! Every service is reached through the gateway under its routable id
//! (`/<service-id>/api/...`). Clients check the exact status an endpoint is
//! documented to return and surface anything else as
//! [`GatewayError::UnexpectedStatus`] with a sanitized body.

use crate::services::ServiceDescriptor;
use regex::Regex;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

/// Maximum length for error body in error messages.
const MAX_ERROR_BODY_LEN: usize = 256;

/// Per-request timeout for scenario calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Password fields in JSON bodies (`"password": "..."`).
static PASSWORD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"(password|passwordHash|password_hash)"\s*:\s*"[^"]*""#).unwrap()
});

/// Sanitize error response body to remove sensitive data.
///
/// Redacts password fields (services sometimes echo the rejected request) and
/// truncates long bodies to MAX_ERROR_BODY_LEN.
pub(crate) fn sanitize_error_body(body: &str) -> String {
    let sanitized = PASSWORD_PATTERN.replace_all(body, r#""$1":"[REDACTED]""#);

    if sanitized.len() > MAX_ERROR_BODY_LEN {
        let mut end = MAX_ERROR_BODY_LEN;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...[truncated]", sanitized.get(..end).unwrap_or_default())
    } else {
        sanitized.into_owned()
    }
}

/// Gateway client errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Expected status {expected}, got {status}: {body}")]
    UnexpectedStatus {
        expected: u16,
        status: u16,
        body: String,
    },

    #[error("JSON deserialization failed: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// One page of a paginated listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,

    #[serde(default)]
    pub page: Option<u32>,

    #[serde(default)]
    pub page_size: Option<u32>,

    #[serde(default)]
    pub total_elements: Option<u64>,
}

/// HTTP client bound to one service's API prefix behind the gateway.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    base_url: String,
    http_client: Client,
}

impl GatewayClient {
    /// Create a client for `<gateway_url>/<service_id>/api`.
    pub fn new(gateway_url: &str, service: &ServiceDescriptor) -> Self {
        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            base_url: service.api_base(gateway_url),
            http_client,
        }
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the HTTP client for custom requests.
    pub fn http_client(&self) -> &Client {
        &self.http_client
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.http_client.get(self.url(path))
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.http_client.post(self.url(path))
    }

    pub fn put(&self, path: &str) -> RequestBuilder {
        self.http_client.put(self.url(path))
    }

    pub fn delete(&self, path: &str) -> RequestBuilder {
        self.http_client.delete(self.url(path))
    }

    /// Send and return only the status, for error-path assertions.
    pub async fn status_of(&self, request: RequestBuilder) -> Result<StatusCode, GatewayError> {
        Ok(request.send().await?.status())
    }

    /// Send, require `expected`, and parse the JSON body.
    pub async fn expect_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        expected: StatusCode,
    ) -> Result<T, GatewayError> {
        let response = request.send().await?;
        let response = check_status(response, expected).await?;

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Send and require `expected`, ignoring the body.
    pub async fn expect_status(
        &self,
        request: RequestBuilder,
        expected: StatusCode,
    ) -> Result<(), GatewayError> {
        let response = request.send().await?;
        check_status(response, expected).await?;
        Ok(())
    }
}

async fn check_status(response: Response, expected: StatusCode) -> Result<Response, GatewayError> {
    let status = response.status();

    if status != expected {
        let body = response.text().await.unwrap_or_default();
        return Err(GatewayError::UnexpectedStatus {
            expected: expected.as_u16(),
            status: status.as_u16(),
            body: sanitize_error_body(&body),
        });
    }

    Ok(response)
}
