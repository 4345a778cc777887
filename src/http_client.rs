use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Url};
use std::time::Duration;

use crate::error::TransportError;
use crate::graphql::{GraphQLBody, GraphQLRequest, GraphQLResponse};

/// The "send request" primitive the authentication layer is built on
///
/// Implementations own serialization and the wire; auth headers arrive already set
/// on `request.headers`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: GraphQLRequest) -> Result<GraphQLResponse, TransportError>;
}

/// GraphQL-over-HTTP transport
pub struct HttpTransport {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// GraphQL endpoint every operation is POSTed to
    endpoint: Url,
}

impl HttpTransport {
    /// Create a new transport for an endpoint
    pub fn new(endpoint: &str, connect_timeout: u64, request_timeout: u64) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("Invalid GraphQL endpoint: {}", endpoint))?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout))
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: GraphQLRequest) -> Result<GraphQLResponse, TransportError> {
        tracing::debug!(
            operation = %request.operation_name,
            url = %self.endpoint,
            "Sending GraphQL request"
        );

        let mut headers = request.headers.clone();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let result = self
            .client
            .post(self.endpoint.clone())
            .headers(headers)
            .json(&request)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                let kind = error_kind(&e);
                tracing::warn!(
                    error_kind = kind,
                    error = %e,
                    operation = %request.operation_name,
                    url = %self.endpoint,
                    "HTTP request error"
                );
                return Err(TransportError::Network {
                    kind: kind.to_string(),
                    message: e.to_string(),
                });
            }
        };

        let status = response.status();
        let text = response.text().await.map_err(|e| TransportError::Network {
            kind: error_kind(&e).to_string(),
            message: e.to_string(),
        })?;

        tracing::debug!(status = %status, "Received HTTP response");

        // GraphQL servers often answer errors with a non-2xx status and a regular body
        match serde_json::from_str::<GraphQLBody>(&text) {
            Ok(body) => Ok(GraphQLResponse::from_body(status.as_u16(), body)),
            Err(_) if !status.is_success() => {
                tracing::error!(
                    status = status.as_u16(),
                    url = %self.endpoint,
                    response_body = %text,
                    "HTTP request failed with error response"
                );
                Err(TransportError::Http {
                    status: status.as_u16(),
                    body: text,
                })
            }
            Err(e) => Err(TransportError::Network {
                kind: "decode_error".to_string(),
                message: format!("Invalid GraphQL response body: {}", e),
            }),
        }
    }
}

/// Categorize the error for better debugging
fn error_kind(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connection_failed"
    } else if e.is_request() {
        "request_error"
    } else if e.is_body() {
        "body_error"
    } else if e.is_decode() {
        "decode_error"
    } else {
        "unknown"
    }
}
