// GraphQL authentication link - library root

pub mod auth;
pub mod config;
pub mod error;
pub mod graphql;
pub mod http_client;
pub mod link;

#[cfg(test)]
mod testing;

pub use auth::{AuthSettings, Claims, CredentialStore, RefreshCoordinator, Token};
pub use error::{LinkError, RefreshError, TokenError, TransportError};
pub use graphql::{GraphQLError, GraphQLRequest, GraphQLResponse};
pub use http_client::{HttpTransport, Transport};
pub use link::{create_link, AuthLink};
