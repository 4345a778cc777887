// Link composition
// Reactive retry (outermost) -> proactive guard -> transport

mod proactive;
mod reactive;

pub use proactive::ProactiveGuard;
pub use reactive::ReactiveRetry;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::Instrument;

use crate::auth::{AuthSettings, CredentialStore, RefreshCoordinator};
use crate::error::LinkError;
use crate::graphql::{GraphQLRequest, GraphQLResponse};
use crate::http_client::{HttpTransport, Transport};

/// Default connect timeout for links built with `create_link` (seconds)
const DEFAULT_CONNECT_TIMEOUT: u64 = 30;

/// Default request timeout for links built with `create_link` (seconds)
const DEFAULT_REQUEST_TIMEOUT: u64 = 60;

/// Single entry point for sending GraphQL operations with managed credentials
///
/// Refreshes and retries happen inside `send`; callers only see the final response
/// or error.
pub struct AuthLink {
    reactive: ReactiveRetry,
    coordinator: RefreshCoordinator,
}

impl AuthLink {
    pub fn builder(settings: AuthSettings) -> AuthLinkBuilder {
        AuthLinkBuilder {
            settings,
            store: None,
            transport: None,
        }
    }

    /// Send one operation through the pipeline
    pub async fn send(&self, request: GraphQLRequest) -> Result<GraphQLResponse, LinkError> {
        let request_id = uuid::Uuid::new_v4().to_string()[..8].to_string();
        let span = tracing::debug_span!(
            "graphql",
            request_id = %request_id,
            operation = %request.operation_name
        );

        self.reactive.execute(request).instrument(span).await
    }

    /// Credential store shared by every layer (login, logout, observing changes)
    pub fn store(&self) -> &CredentialStore {
        self.coordinator.store()
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn settings(&self) -> &AuthSettings {
        self.coordinator.settings()
    }
}

/// Assembles an `AuthLink` from explicit collaborators
pub struct AuthLinkBuilder {
    settings: AuthSettings,
    store: Option<CredentialStore>,
    transport: Option<Arc<dyn Transport>>,
}

impl AuthLinkBuilder {
    /// Credential store to use; defaults to an in-memory one
    pub fn store(mut self, store: CredentialStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Terminal transport; also used directly for the refresh mutation
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<AuthLink> {
        let transport = self
            .transport
            .context("A transport is required to build an AuthLink")?;
        let store = match self.store {
            Some(store) => store,
            None => CredentialStore::in_memory()?,
        };

        // The coordinator talks to the bare transport so refreshes bypass both layers
        let coordinator = RefreshCoordinator::new(transport.clone(), store, self.settings);
        let proactive: Arc<dyn Transport> =
            Arc::new(ProactiveGuard::new(transport, coordinator.clone()));
        let reactive = ReactiveRetry::new(proactive, coordinator.clone());

        Ok(AuthLink {
            reactive,
            coordinator,
        })
    }
}

/// Build a link over HTTP for an endpoint with default settings
pub fn create_link(endpoint_uri: &str, store: CredentialStore) -> Result<AuthLink> {
    let transport = HttpTransport::new(
        endpoint_uri,
        DEFAULT_CONNECT_TIMEOUT,
        DEFAULT_REQUEST_TIMEOUT,
    )?;

    AuthLink::builder(AuthSettings::default())
        .store(store)
        .transport(Arc::new(transport))
        .build()
}
