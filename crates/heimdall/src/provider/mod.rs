//! Identity providers.
//!
//! [`OidcProvider`] talks to a real OpenID Connect server;
//! [`SimulatedProvider`] mints local tokens for offline development. The
//! variant is picked once by [`build_provider`] and the session manager only
//! ever sees `dyn IdentityProvider`.

mod discovery;
mod oidc;
mod pkce;
mod simulated;

pub use discovery::{DiscoveryClient, ProviderMetadata};
pub use oidc::OidcProvider;
pub use pkce::{generate_pkce, random_state, PkcePair};
pub use simulated::{SimulatedProvider, SIMULATED_LATENCY};

use crate::callback_mode::InitOptions;
use crate::clock::Clock;
use crate::AuthResult;
use async_trait::async_trait;
use datamed_config_and_utils::Config;
use datamed_storage::DurableStorage;
use std::sync::Arc;
use tracing::info;
use url::Url;

/// Tokens returned by a provider round trip.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    /// Lifetime hint from the token endpoint, in seconds.
    pub expires_in: Option<i64>,
}

impl TokenSet {
    pub fn access_only(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            id_token: None,
            expires_in: None,
        }
    }
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token_len", &self.access_token.len())
            .field("refresh_token_present", &self.refresh_token.is_some())
            .field("id_token_present", &self.id_token.is_some())
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Result of a provider initialization round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderInit {
    Authenticated(TokenSet),
    /// The provider answered but there is no session.
    NotAuthenticated,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Complete a callback or perform a silent session check.
    async fn init(&self, options: &InitOptions) -> AuthResult<ProviderInit>;

    /// Renew the current session.
    async fn update_token(&self) -> AuthResult<TokenSet>;

    /// URL that starts an interactive login returning to `redirect_uri`.
    async fn create_login_url(&self, redirect_uri: &Url) -> AuthResult<Url>;

    /// URL that ends the provider session and returns to `redirect_uri`.
    async fn create_logout_url(&self, redirect_uri: &Url) -> AuthResult<Url>;

    /// Forget provider-owned local state (refresh tokens, pending logins).
    fn clear_local_session(&self) -> AuthResult<()>;
}

/// Pick the provider variant for `config`.
pub fn build_provider(
    config: &Config,
    storage: Arc<dyn DurableStorage>,
    clock: Arc<dyn Clock>,
) -> AuthResult<Arc<dyn IdentityProvider>> {
    if config.use_simulated_auth {
        info!("using simulated identity provider");
        return Ok(Arc::new(SimulatedProvider::new(storage, clock)));
    }

    let issuer = config.issuer_url()?;
    info!(issuer = %issuer, client_id = %config.client_id, "using OIDC identity provider");
    Ok(Arc::new(OidcProvider::new(
        issuer,
        config.client_id.clone(),
        storage,
        clock,
    )?))
}
