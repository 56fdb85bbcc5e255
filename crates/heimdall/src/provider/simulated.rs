//! Offline provider for local development.
//!
//! Every login succeeds as the same fixed user. Tokens are unsigned and
//! encoded with padded standard base64, so they also exercise the lenient
//! decoding path of the token store.

use super::pkce::random_state;
use super::{IdentityProvider, ProviderInit, TokenSet};
use crate::callback_mode::{InitMode, InitOptions};
use crate::clock::Clock;
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use datamed_storage::{DurableStorage, StorageKeys};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Artificial round trip delay.
pub const SIMULATED_LATENCY: Duration = Duration::from_millis(500);

const TOKEN_LIFETIME_SECS: i64 = 3600;

pub struct SimulatedProvider {
    storage: Arc<dyn DurableStorage>,
    clock: Arc<dyn Clock>,
    latency: Duration,
}

impl SimulatedProvider {
    pub fn new(storage: Arc<dyn DurableStorage>, clock: Arc<dyn Clock>) -> Self {
        Self::with_latency(storage, clock, SIMULATED_LATENCY)
    }

    pub fn with_latency(
        storage: Arc<dyn DurableStorage>,
        clock: Arc<dyn Clock>,
        latency: Duration,
    ) -> Self {
        Self {
            storage,
            clock,
            latency,
        }
    }

    fn mint(&self) -> String {
        let now = self.clock.now().timestamp();
        let header = json!({ "alg": "HS256", "typ": "JWT" });
        let payload = json!({
            "sub": "test-user-id-123",
            "preferred_username": "test-doctor",
            "given_name": "Test",
            "family_name": "Doctor",
            "email": "test.doctor@datamed.com",
            "realm_access": { "roles": ["doctor", "user"] },
            "exp": now + TOKEN_LIFETIME_SECS,
            "iat": now,
        });
        format!(
            "{}.{}.{}",
            STANDARD.encode(header.to_string()),
            STANDARD.encode(payload.to_string()),
            STANDARD.encode("mock-signature"),
        )
    }

    fn mint_and_store(&self) -> AuthResult<TokenSet> {
        let token = self.mint();
        self.storage.set(StorageKeys::SIMULATED_TOKEN, &token)?;
        Ok(TokenSet {
            access_token: token,
            refresh_token: None,
            id_token: None,
            expires_in: Some(TOKEN_LIFETIME_SECS),
        })
    }

    async fn round_trip(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl IdentityProvider for SimulatedProvider {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn init(&self, options: &InitOptions) -> AuthResult<ProviderInit> {
        self.round_trip().await;

        if let InitMode::Callback { .. } = options.mode {
            info!("simulated login completed");
            return Ok(ProviderInit::Authenticated(self.mint_and_store()?));
        }

        let flagged = self.storage.get(StorageKeys::IS_AUTHENTICATED)?.as_deref()
            == Some(StorageKeys::AUTHENTICATED_SENTINEL);
        match self.storage.get(StorageKeys::SIMULATED_TOKEN)? {
            Some(token) if flagged => {
                debug!(token_len = token.len(), "found existing simulated session");
                Ok(ProviderInit::Authenticated(TokenSet::access_only(token)))
            }
            _ => Ok(ProviderInit::NotAuthenticated),
        }
    }

    async fn update_token(&self) -> AuthResult<TokenSet> {
        if self.storage.get(StorageKeys::SIMULATED_TOKEN)?.is_none() {
            return Err(AuthError::RefreshFailure("not authenticated".into()));
        }
        self.mint_and_store()
    }

    async fn create_login_url(&self, redirect_uri: &Url) -> AuthResult<Url> {
        let mut url = redirect_uri.clone();
        url.query_pairs_mut()
            .append_pair("code", &format!("simulated-{}", random_state()))
            .append_pair("state", &random_state());
        Ok(url)
    }

    async fn create_logout_url(&self, redirect_uri: &Url) -> AuthResult<Url> {
        Ok(redirect_uri.clone())
    }

    fn clear_local_session(&self) -> AuthResult<()> {
        self.storage.delete(StorageKeys::SIMULATED_TOKEN)?;
        Ok(())
    }
}
