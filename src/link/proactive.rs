// Proactive refresh: renew a nearly expired token before the request leaves

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use crate::auth::{decode, needs_refresh, RefreshCoordinator};
use crate::error::TransportError;
use crate::graphql::{GraphQLRequest, GraphQLResponse};
use crate::http_client::Transport;

/// Attaches the stored credential and refreshes it first when it is within the margin
///
/// A failed refresh never blocks the request: it goes out with the stale token and
/// the reactive layer deals with the rejection.
pub struct ProactiveGuard {
    inner: Arc<dyn Transport>,
    coordinator: RefreshCoordinator,
}

impl ProactiveGuard {
    pub fn new(inner: Arc<dyn Transport>, coordinator: RefreshCoordinator) -> Self {
        Self { inner, coordinator }
    }
}

#[async_trait]
impl Transport for ProactiveGuard {
    async fn send(&self, mut request: GraphQLRequest) -> Result<GraphQLResponse, TransportError> {
        let settings = self.coordinator.settings();
        if settings.is_refresh_operation(&request) {
            return self.inner.send(request).await;
        }

        let Some(current) = self.coordinator.store().get_token() else {
            tracing::debug!(operation = %request.operation_name, "No token stored, sending unauthenticated");
            return self.inner.send(request).await;
        };

        let claims = match decode(&current) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!(
                    operation = %request.operation_name,
                    error = %e,
                    "Stored token cannot be decoded, sending unauthenticated"
                );
                return self.inner.send(request).await;
            }
        };

        if needs_refresh(&claims, Utc::now(), settings.refresh_margin) {
            tracing::debug!(
                operation = %request.operation_name,
                expires_at = %claims.expires_at.to_rfc3339(),
                "Token expiring soon, refreshing before send"
            );

            match self.coordinator.refresh_from(Some(current.as_str())).await {
                Ok(token) => {
                    request.set_authorization(&settings.auth_scheme, &token.raw)?;
                    return self.inner.send(request).await;
                }
                Err(e) => {
                    tracing::warn!(
                        operation = %request.operation_name,
                        error = %e,
                        "Proactive refresh failed, sending with existing token"
                    );
                }
            }
        }

        if !request.has_authorization() {
            request.set_authorization(&settings.auth_scheme, &current)?;
        }

        self.inner.send(request).await
    }
}
