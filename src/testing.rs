// Test helpers: token minting and a scripted transport

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::TransportError;
use crate::graphql::{GraphQLBody, GraphQLRequest, GraphQLResponse};
use crate::http_client::Transport;

/// Sign arbitrary claims with a throwaway HS256 key
pub fn make_token_with_claims(claims: Value) -> String {
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"test-secret"),
    )
    .expect("Failed to encode test token")
}

pub fn make_token(subject: &str, iat: i64, exp: i64) -> String {
    make_token_with_claims(json!({ "sub": subject, "iat": iat, "exp": exp }))
}

/// Token issued an hour ago that expires `expires_in` seconds from now
pub fn token_expiring_in(subject: &str, expires_in: i64) -> String {
    let now = Utc::now().timestamp();
    make_token(subject, now - 3600, now + expires_in)
}

pub fn response(body: Value) -> GraphQLResponse {
    let body: GraphQLBody = serde_json::from_value(body).expect("Invalid test response body");
    GraphQLResponse::from_body(200, body)
}

pub fn unauthenticated() -> GraphQLResponse {
    response(json!({
        "data": null,
        "errors": [{
            "message": "You do not have permission to perform this action",
            "extensions": { "code": "UNAUTHENTICATED" }
        }]
    }))
}

pub fn refreshed(token: &str) -> GraphQLResponse {
    response(json!({ "data": { "refreshToken": { "token": token } } }))
}

type Handler =
    dyn Fn(&GraphQLRequest, usize) -> Result<GraphQLResponse, TransportError> + Send + Sync;

/// Transport that answers from a closure and records every request it sees
pub struct FakeTransport {
    handler: Box<Handler>,
    requests: Mutex<Vec<GraphQLRequest>>,
    delay: Option<Duration>,
}

impl FakeTransport {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&GraphQLRequest, usize) -> Result<GraphQLResponse, TransportError>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
            delay: None,
        })
    }

    /// Same as `new`, but every send sleeps first so concurrent callers overlap
    pub fn with_delay<F>(delay: Duration, handler: F) -> Arc<Self>
    where
        F: Fn(&GraphQLRequest, usize) -> Result<GraphQLResponse, TransportError>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
            delay: Some(delay),
        })
    }

    /// Number of requests sent with the given operation name
    pub fn count(&self, operation_name: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.operation_name == operation_name)
            .count()
    }

    /// Authorization headers of requests with the given operation name, in order
    pub fn authorizations(&self, operation_name: &str) -> Vec<Option<String>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.operation_name == operation_name)
            .map(|r| r.authorization().map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: GraphQLRequest) -> Result<GraphQLResponse, TransportError> {
        let index = {
            let mut requests = self.requests.lock().unwrap();
            let index = requests
                .iter()
                .filter(|r| r.operation_name == request.operation_name)
                .count();
            requests.push(request.clone());
            index
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        (self.handler)(&request, index)
    }
}
