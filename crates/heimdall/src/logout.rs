//! Logout coordination.
//!
//! Teardown runs in a fixed order: tell the backend (best effort, bounded),
//! clear every piece of local session state, then pick where to send the
//! user. Nothing in the first step can prevent the second.

use crate::backend::BackendApi;
use crate::provider::IdentityProvider;
use crate::token_store::TokenStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// What happened during a logout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutReport {
    /// The backend acknowledged the logout call.
    pub backend_notified: bool,
    /// A token was held when logout started.
    pub had_token: bool,
    /// Where the user was sent afterwards.
    pub redirect: Url,
}

pub struct LogoutCoordinator {
    backend: Arc<dyn BackendApi>,
    timeout: Duration,
}

impl LogoutCoordinator {
    pub fn new(backend: Arc<dyn BackendApi>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// POST the backend logout with `token`. Failures and timeouts are
    /// logged and reported as `false`, never returned.
    pub async fn notify_backend(&self, token: Option<&str>) -> bool {
        let Some(token) = token else {
            debug!("no bearer token, skipping backend logout");
            return false;
        };

        match tokio::time::timeout(self.timeout, self.backend.logout(token)).await {
            Ok(Ok(())) => {
                debug!("backend logout acknowledged");
                true
            }
            Ok(Err(e)) => {
                warn!(error = %e, "backend logout failed, continuing with local logout");
                false
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.timeout.as_secs_f64(),
                    "backend logout timed out, continuing with local logout"
                );
                false
            }
        }
    }

    /// Clear the token store and the provider's local state.
    ///
    /// Storage failures are logged; the in-memory token is gone either way.
    pub fn clear_local(&self, tokens: &TokenStore, provider: &dyn IdentityProvider) {
        if let Err(e) = tokens.clear() {
            warn!(error = %e, "failed to clear durable session state");
        }
        if let Err(e) = provider.clear_local_session() {
            warn!(error = %e, provider = provider.name(), "failed to clear provider state");
        }
    }

    /// Provider end-session URL, falling back to the application entry.
    ///
    /// Must run before [`Self::clear_local`]: the provider may need its
    /// stored id token to build the URL.
    pub async fn redirect_target(&self, provider: &dyn IdentityProvider, app_origin: &Url) -> Url {
        match tokio::time::timeout(self.timeout, provider.create_logout_url(app_origin)).await {
            Ok(Ok(url)) => url,
            Ok(Err(e)) => {
                warn!(error = %e, "no provider logout URL, returning to application entry");
                app_origin.clone()
            }
            Err(_) => {
                warn!("provider logout URL timed out, returning to application entry");
                app_origin.clone()
            }
        }
    }

    /// Steps one and two of a logout: backend notification then local
    /// teardown. Returns `(backend_notified, had_token)`.
    pub async fn teardown(
        &self,
        tokens: &TokenStore,
        provider: &dyn IdentityProvider,
    ) -> (bool, bool) {
        let token = tokens.get_token();
        let had_token = token.is_some();
        let backend_notified = self.notify_backend(token.as_deref()).await;
        self.clear_local(tokens, provider);
        info!(backend_notified, had_token, "local session cleared");
        (backend_notified, had_token)
    }
}
