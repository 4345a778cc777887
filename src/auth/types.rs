// Authentication types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::graphql::GraphQLRequest;

/// Decoded view of a token's payload
#[derive(Debug, Clone, PartialEq)]
pub struct Claims {
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub subject: String,

    /// Every claim as sent, including the ones above
    pub raw: Map<String, Value>,
}

impl Claims {
    /// Check if the token is actually expired (not just expiring soon)
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Time left before expiry, negative once expired
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }
}

/// A well-formed credential: the opaque string plus its decoded claims
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub raw: String,
    pub claims: Claims,
}

impl Token {
    /// Short prefix safe to put in logs
    pub fn preview(&self) -> &str {
        match self.raw.char_indices().nth(12) {
            Some((end, _)) => &self.raw[..end],
            None => &self.raw,
        }
    }
}

/// Value stored under the token key in `auth_kv`
#[derive(Debug, Serialize, Deserialize)]
pub struct StoredTokenData {
    pub token: String,
    #[serde(default)]
    pub saved_at: Option<String>,
}

/// Knobs shared by the refresh coordinator and both link layers
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Prefix of the authorization header value, e.g. `JWT` or `Bearer`
    pub auth_scheme: String,

    /// Proactive refresh fires once `now >= expires_at - refresh_margin`
    pub refresh_margin: Duration,

    /// Operation name reserved for the refresh mutation; never intercepted
    pub refresh_operation_name: String,

    /// Document sent for the refresh mutation
    pub refresh_query: String,

    /// JSON pointer into `data` where the new token lives
    pub refresh_token_pointer: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            auth_scheme: "JWT".to_string(),
            refresh_margin: Duration::seconds(60),
            refresh_operation_name: "RefreshToken".to_string(),
            refresh_query: "mutation RefreshToken { refreshToken { token } }".to_string(),
            refresh_token_pointer: "/refreshToken/token".to_string(),
        }
    }
}

impl AuthSettings {
    pub fn is_refresh_operation(&self, request: &GraphQLRequest) -> bool {
        request.operation_name == self.refresh_operation_name
    }

    /// Build a fresh refresh mutation request
    pub fn refresh_request(&self) -> GraphQLRequest {
        GraphQLRequest::new(&self.refresh_operation_name, &self.refresh_query)
    }
}
