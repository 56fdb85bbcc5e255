//! OpenID Connect authorization-code provider (PKCE S256).

use super::discovery::DiscoveryClient;
use super::pkce::{generate_pkce, random_state};
use super::{IdentityProvider, ProviderInit, TokenSet};
use crate::callback_mode::{InitMode, InitOptions, DEFAULT_SCOPE};
use crate::clock::Clock;
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use datamed_storage::{DurableStorage, StorageKeys};
use reqwest::{redirect, Client, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Pending logins older than this are rejected on callback.
const PENDING_LOGIN_TTL_SECS: i64 = 600;

/// What has to survive between building an authorization URL and the
/// provider redirecting back.
#[derive(Debug, Serialize, Deserialize)]
struct PendingLogin {
    code_verifier: String,
    redirect_uri: String,
    nonce: String,
    created_at: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl From<TokenResponse> for TokenSet {
    fn from(r: TokenResponse) -> Self {
        TokenSet {
            access_token: r.access_token,
            refresh_token: r.refresh_token,
            id_token: r.id_token,
            expires_in: r.expires_in,
        }
    }
}

pub struct OidcProvider {
    http: Client,
    client_id: String,
    discovery: DiscoveryClient,
    storage: Arc<dyn DurableStorage>,
    clock: Arc<dyn Clock>,
}

impl OidcProvider {
    /// Redirects are never followed: a silent check reads the provider's
    /// answer from the `Location` header.
    pub fn new(
        issuer: Url,
        client_id: String,
        storage: Arc<dyn DurableStorage>,
        clock: Arc<dyn Clock>,
    ) -> AuthResult<Self> {
        let http = Client::builder()
            .redirect(redirect::Policy::none())
            .cookie_store(true)
            .build()?;

        Ok(Self {
            discovery: DiscoveryClient::new(http.clone(), issuer),
            http,
            client_id,
            storage,
            clock,
        })
    }

    pub fn discovery(&self) -> &DiscoveryClient {
        &self.discovery
    }

    // ==========================================
    // Authorization requests
    // ==========================================

    /// Build an authorization URL and persist its pending login.
    /// Returns the URL and its `state`.
    async fn authorization_url(
        &self,
        redirect_uri: &Url,
        prompt: Option<&str>,
    ) -> AuthResult<(Url, String)> {
        let metadata = self.discovery.metadata().await?;
        let pkce = generate_pkce();
        let state = random_state();
        let nonce = random_state();

        let mut url = metadata.authorization_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", redirect_uri.as_str())
                .append_pair("response_type", "code")
                .append_pair("response_mode", "query")
                .append_pair("scope", DEFAULT_SCOPE)
                .append_pair("state", &state)
                .append_pair("nonce", &nonce)
                .append_pair("code_challenge", &pkce.challenge)
                .append_pair("code_challenge_method", "S256");
            if let Some(prompt) = prompt {
                query.append_pair("prompt", prompt);
            }
        }

        let pending = PendingLogin {
            code_verifier: pkce.verifier,
            redirect_uri: redirect_uri.to_string(),
            nonce,
            created_at: self.clock.now().timestamp(),
        };
        self.storage.set(
            &StorageKeys::oidc_callback(&state),
            &serde_json::to_string(&pending)?,
        )?;

        Ok((url, state))
    }

    /// Remove and return the pending login for `state`.
    fn take_pending(&self, state: &str) -> AuthResult<PendingLogin> {
        let key = StorageKeys::oidc_callback(state);
        let raw = self.storage.get(&key)?.ok_or(AuthError::StateMismatch)?;
        self.storage.delete(&key)?;

        let pending: PendingLogin = serde_json::from_str(&raw)?;
        let age = self.clock.now().timestamp() - pending.created_at;
        if age > PENDING_LOGIN_TTL_SECS {
            warn!(age_secs = age, "pending login expired");
            return Err(AuthError::StateMismatch);
        }
        Ok(pending)
    }

    // ==========================================
    // Token endpoint
    // ==========================================

    async fn exchange_code(&self, code: &str, pending: &PendingLogin) -> AuthResult<TokenSet> {
        let metadata = self.discovery.metadata().await?;
        debug!(redirect_uri = %pending.redirect_uri, "exchanging authorization code");

        let response = self
            .http
            .post(metadata.token_endpoint.clone())
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", pending.redirect_uri.as_str()),
                ("code_verifier", pending.code_verifier.as_str()),
            ])
            .send()
            .await?;

        self.token_response(response).await
    }

    async fn refresh_grant(&self, refresh_token: &str) -> AuthResult<TokenSet> {
        let metadata = self.discovery.metadata().await?;
        debug!("requesting refresh_token grant");

        let response = self
            .http
            .post(metadata.token_endpoint.clone())
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
            ])
            .send()
            .await?;

        self.token_response(response).await
    }

    async fn token_response(&self, response: Response) -> AuthResult<TokenSet> {
        let response = error_for_status(response).await?;
        let tokens: TokenSet = response.json::<TokenResponse>().await?.into();
        self.persist(&tokens)?;
        Ok(tokens)
    }

    /// Keep the refresh and id tokens for later renewals and logout.
    fn persist(&self, tokens: &TokenSet) -> AuthResult<()> {
        if let Some(refresh) = &tokens.refresh_token {
            self.storage.set(StorageKeys::OIDC_REFRESH_TOKEN, refresh)?;
        }
        if let Some(id) = &tokens.id_token {
            self.storage.set(StorageKeys::OIDC_ID_TOKEN, id)?;
        }
        Ok(())
    }

    // ==========================================
    // Silent check
    // ==========================================

    /// `prompt=none` authorization request. The provider answers with a
    /// redirect carrying either a code or an error.
    async fn silent_check(&self, redirect_uri: &Url) -> AuthResult<ProviderInit> {
        let (url, state) = self.authorization_url(redirect_uri, Some("none")).await?;
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();

        if !status.is_redirection() {
            self.storage.delete(&StorageKeys::oidc_callback(&state))?;
            if status.is_success() {
                debug!("provider answered silent check without redirect");
                return Ok(ProviderInit::NotAuthenticated);
            }
            error_for_status(response).await?;
            return Ok(ProviderInit::NotAuthenticated);
        }

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|v| url.join(v))
            .transpose()?;

        let Some(location) = location else {
            self.storage.delete(&StorageKeys::oidc_callback(&state))?;
            return Ok(ProviderInit::NotAuthenticated);
        };

        match InitMode::detect(&location) {
            InitMode::Callback {
                code,
                state: returned,
            } => {
                let pending = self.take_pending(&returned)?;
                let tokens = self.exchange_code(&code, &pending).await?;
                Ok(ProviderInit::Authenticated(tokens))
            }
            InitMode::Silent => {
                self.storage.delete(&StorageKeys::oidc_callback(&state))?;
                let error = location
                    .query_pairs()
                    .find(|(k, _)| k == "error")
                    .map(|(_, v)| v.into_owned());
                debug!(error = error.as_deref().unwrap_or("-"), "no provider session");
                Ok(ProviderInit::NotAuthenticated)
            }
        }
    }
}

async fn error_for_status(response: Response) -> AuthResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(AuthError::Provider {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl IdentityProvider for OidcProvider {
    fn name(&self) -> &'static str {
        "oidc"
    }

    async fn init(&self, options: &InitOptions) -> AuthResult<ProviderInit> {
        match &options.mode {
            InitMode::Callback { code, state } => {
                let pending = self.take_pending(state)?;
                let tokens = self.exchange_code(code, &pending).await?;
                info!("authorization code exchanged");
                Ok(ProviderInit::Authenticated(tokens))
            }
            InitMode::Silent => {
                if let Some(refresh) = self.storage.get(StorageKeys::OIDC_REFRESH_TOKEN)? {
                    match self.refresh_grant(&refresh).await {
                        Ok(tokens) => {
                            info!("session resumed from stored refresh token");
                            return Ok(ProviderInit::Authenticated(tokens));
                        }
                        Err(e) => {
                            debug!(error = %e, "stored refresh token rejected");
                            self.storage.delete(StorageKeys::OIDC_REFRESH_TOKEN)?;
                        }
                    }
                }

                match &options.silent_check_sso_redirect_uri {
                    Some(redirect_uri) => self.silent_check(redirect_uri).await,
                    None => Ok(ProviderInit::NotAuthenticated),
                }
            }
        }
    }

    async fn update_token(&self) -> AuthResult<TokenSet> {
        let refresh = self
            .storage
            .get(StorageKeys::OIDC_REFRESH_TOKEN)?
            .ok_or_else(|| AuthError::RefreshFailure("no refresh token stored".into()))?;
        self.refresh_grant(&refresh).await
    }

    async fn create_login_url(&self, redirect_uri: &Url) -> AuthResult<Url> {
        let (url, _) = self.authorization_url(redirect_uri, None).await?;
        Ok(url)
    }

    async fn create_logout_url(&self, redirect_uri: &Url) -> AuthResult<Url> {
        let metadata = self.discovery.metadata().await?;
        let Some(endpoint) = &metadata.end_session_endpoint else {
            return Ok(redirect_uri.clone());
        };

        let mut url = endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("post_logout_redirect_uri", redirect_uri.as_str())
                .append_pair("client_id", &self.client_id);
            if let Some(id_token) = self.storage.get(StorageKeys::OIDC_ID_TOKEN)? {
                query.append_pair("id_token_hint", &id_token);
            }
        }
        Ok(url)
    }

    fn clear_local_session(&self) -> AuthResult<()> {
        self.storage.delete(StorageKeys::OIDC_REFRESH_TOKEN)?;
        self.storage.delete(StorageKeys::OIDC_ID_TOKEN)?;
        let pending = self.storage.delete_prefix(StorageKeys::OIDC_CALLBACK_PREFIX)?;
        debug!(pending_removed = pending, "OIDC local state cleared");
        Ok(())
    }
}
