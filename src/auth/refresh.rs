// Token refresh logic

use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::credentials::CredentialStore;
use super::types::{AuthSettings, Token};
use crate::error::RefreshError;
use crate::http_client::Transport;

type SharedRefresh = Shared<BoxFuture<'static, Result<Token, RefreshError>>>;

/// Exchanges the current session for a new token
///
/// Single-flight: while one exchange is running, every other caller awaits that same
/// exchange instead of starting a second network call. Cheap to clone.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    transport: Arc<dyn Transport>,
    store: CredentialStore,
    settings: AuthSettings,

    /// Refresh currently on the wire, if any
    in_flight: Mutex<Option<SharedRefresh>>,

    /// Number of exchanges started
    started: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: CredentialStore,
        settings: AuthSettings,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                transport,
                store,
                settings,
                in_flight: Mutex::new(None),
                started: AtomicU64::new(0),
            }),
        }
    }

    /// Get a new token, joining a refresh already in progress if there is one
    ///
    /// On failure the store has been cleared and every waiter receives the same error.
    pub async fn refresh(&self) -> Result<Token, RefreshError> {
        self.join_or_start(None).await
    }

    /// Like `refresh`, but skips the exchange when the stored token is no longer `observed`
    ///
    /// Covers callers that read a token (or its absence) just before another caller's
    /// refresh settled: they pick up the token that refresh stored instead of starting another.
    pub async fn refresh_from(&self, observed: Option<&str>) -> Result<Token, RefreshError> {
        self.join_or_start(Some(observed)).await
    }

    async fn join_or_start(&self, observed: Option<Option<&str>>) -> Result<Token, RefreshError> {
        let refresh = {
            let mut in_flight = self.inner.in_flight.lock().await;
            match in_flight.as_ref() {
                Some(existing) => {
                    tracing::debug!("Joining in-flight token refresh");
                    existing.clone()
                }
                None => {
                    if let Some(token) = observed.and_then(|seen| self.inner.replaced(seen)) {
                        tracing::debug!("Token already refreshed by another caller");
                        return Ok(token);
                    }

                    let inner = self.inner.clone();
                    let refresh = async move {
                        let result = inner.exchange().await;
                        inner.settle(&result);
                        inner.in_flight.lock().await.take();
                        result
                    }
                    .boxed()
                    .shared();

                    *in_flight = Some(refresh.clone());
                    refresh
                }
            }
        };

        refresh.await
    }

    /// How many refresh exchanges have been sent
    pub fn refresh_count(&self) -> u64 {
        self.inner.started.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &CredentialStore {
        &self.inner.store
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.inner.settings
    }
}

impl CoordinatorInner {
    /// Stored token, if it differs from `seen` and decodes
    fn replaced(&self, seen: Option<&str>) -> Option<Token> {
        let current = self
            .store
            .get_token()
            .filter(|current| Some(current.as_str()) != seen)?;
        Token::parse(current).ok()
    }

    /// Send the refresh mutation with the current credential and parse the new token
    async fn exchange(&self) -> Result<Token, RefreshError> {
        let attempt = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(attempt, "Refreshing access token...");

        let mut request = self.settings.refresh_request();
        if let Some(current) = self.store.get_token() {
            request.set_authorization(&self.settings.auth_scheme, &current)?;
        }

        let response = self.transport.send(request).await?;

        if response.has_errors() {
            let messages = response
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(RefreshError::Rejected(messages));
        }

        let pointer = &self.settings.refresh_token_pointer;
        let raw = response
            .data
            .as_ref()
            .and_then(|data| data.pointer(pointer))
            .and_then(|v| v.as_str())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RefreshError::MissingToken(pointer.clone()))?;

        let token = Token::parse(raw)?;

        tracing::info!(
            subject = %token.claims.subject,
            expires_at = %token.claims.expires_at.to_rfc3339(),
            "Token refreshed"
        );

        Ok(token)
    }

    /// Apply the outcome to the store before waiters are released
    fn settle(&self, result: &Result<Token, RefreshError>) {
        let update = match result {
            Ok(token) => self.store.set_token(Some(token.raw.clone())),
            Err(e) => {
                tracing::error!(error = %e, "Token refresh failed, clearing credential");
                self.store.clear()
            }
        };

        if let Err(e) = update {
            tracing::warn!(error = %e, "Failed to persist credential change");
        }
    }
}
