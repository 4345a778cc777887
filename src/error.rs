// Error handling module
// Defines the error taxonomy of the authentication link

use thiserror::Error;

/// Local token decode failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TokenError {
    /// Not a parseable signed-token structure
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// Expiry is not after issued-at
    #[error("Token expiry is not after its issue time")]
    InvalidLifetime,
}

/// Failures while exchanging the session for a new token
///
/// Cloneable so a single outcome can be handed to every waiter of a shared refresh.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RefreshError {
    /// The refresh request never produced a GraphQL response
    #[error("Refresh request failed: {0}")]
    Network(String),

    /// The server answered with errors
    #[error("Refresh rejected by server: {0}")]
    Rejected(String),

    /// The response carried no token at the configured location
    #[error("Refresh response does not contain a token at {0}")]
    MissingToken(String),

    /// The server returned something that does not decode as a token
    #[error("Refresh returned an invalid token: {0}")]
    InvalidToken(String),
}

/// Failures reported by the transport primitive
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Connection, timeout or body errors
    #[error("Network error ({kind}): {message}")]
    Network { kind: String, message: String },

    /// Non-success status without a GraphQL body
    #[error("HTTP error: {status} - {body}")]
    Http { status: u16, body: String },

    /// A header value could not be encoded
    #[error("Invalid header value: {0}")]
    InvalidHeader(String),
}

/// Errors surfaced to callers of the link
#[derive(Error, Debug)]
pub enum LinkError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The credential could not be renewed; the session is logged out
    #[error(transparent)]
    Refresh(#[from] RefreshError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<TransportError> for RefreshError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Http { status, body } => {
                RefreshError::Rejected(format!("HTTP {} - {}", status, body))
            }
            other => RefreshError::Network(other.to_string()),
        }
    }
}

impl From<TokenError> for RefreshError {
    fn from(err: TokenError) -> Self {
        RefreshError::InvalidToken(err.to_string())
    }
}
