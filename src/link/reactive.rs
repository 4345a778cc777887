// Reactive refresh: renew after the server rejects the credential, then retry once

use std::sync::Arc;

use crate::auth::RefreshCoordinator;
use crate::error::LinkError;
use crate::graphql::{GraphQLRequest, GraphQLResponse};
use crate::http_client::Transport;

/// Outermost layer: sees the final response and replays on UNAUTHENTICATED
///
/// A request is replayed at most once. The replay carries the token returned by the
/// coordinator rather than whatever the store holds by then.
pub struct ReactiveRetry {
    inner: Arc<dyn Transport>,
    coordinator: RefreshCoordinator,
}

impl ReactiveRetry {
    pub fn new(inner: Arc<dyn Transport>, coordinator: RefreshCoordinator) -> Self {
        Self { inner, coordinator }
    }

    pub async fn execute(&self, request: GraphQLRequest) -> Result<GraphQLResponse, LinkError> {
        let settings = self.coordinator.settings();
        if settings.is_refresh_operation(&request) {
            return Ok(self.inner.send(request).await?);
        }

        // A refresh that settles while this response is in flight is reused, not repeated
        let observed = self.coordinator.store().get_token();

        let response = self.forward(request.clone()).await?;
        if !response.is_unauthenticated() {
            log_errors(&request, &response);
            return Ok(response);
        }

        tracing::warn!(
            operation = %request.operation_name,
            "Server rejected credential, refreshing token and retrying"
        );

        let token = match self.coordinator.refresh_from(observed.as_deref()).await {
            Ok(token) => token,
            Err(e) => {
                tracing::error!(
                    operation = %request.operation_name,
                    error = %e,
                    "Token refresh failed, giving up on request"
                );
                return Err(e.into());
            }
        };

        let mut retry = request;
        retry.set_authorization(&settings.auth_scheme, &token.raw)?;

        let response = self.forward(retry.clone()).await?;
        if response.is_unauthenticated() {
            tracing::warn!(
                operation = %retry.operation_name,
                "Request still unauthenticated after refresh, not retrying again"
            );
        } else {
            log_errors(&retry, &response);
        }

        Ok(response)
    }

    async fn forward(&self, request: GraphQLRequest) -> Result<GraphQLResponse, LinkError> {
        let operation = request.operation_name.clone();
        self.inner.send(request).await.map_err(|e| {
            tracing::warn!(operation = %operation, error = %e, "Transport error");
            LinkError::from(e)
        })
    }
}

/// Non-auth GraphQL errors are passed through untouched; they are only logged
fn log_errors(request: &GraphQLRequest, response: &GraphQLResponse) {
    for error in &response.errors {
        tracing::warn!(
            operation = %request.operation_name,
            code = error.code().unwrap_or("-"),
            path = ?error.path,
            "GraphQL error: {}",
            error.message
        );
    }
}
