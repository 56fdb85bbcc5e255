//! OpenID Provider metadata discovery.

use crate::{AuthError, AuthResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

/// The subset of `.well-known/openid-configuration` the client uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<Url>,
}

/// Fetches provider metadata once per process.
pub struct DiscoveryClient {
    http: Client,
    issuer: Url,
    cache: OnceCell<ProviderMetadata>,
}

impl DiscoveryClient {
    pub fn new(http: Client, issuer: Url) -> Self {
        Self {
            http,
            issuer,
            cache: OnceCell::new(),
        }
    }

    pub fn issuer(&self) -> &Url {
        &self.issuer
    }

    /// `{issuer}/.well-known/openid-configuration`
    pub fn discovery_url(&self) -> AuthResult<Url> {
        let base = self.issuer.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!(
            "{base}/.well-known/openid-configuration"
        ))?)
    }

    /// Cached metadata, fetched on first use. A failed fetch is not cached.
    pub async fn metadata(&self) -> AuthResult<&ProviderMetadata> {
        self.cache.get_or_try_init(|| self.fetch()).await
    }

    async fn fetch(&self) -> AuthResult<ProviderMetadata> {
        let url = self.discovery_url()?;
        debug!(url = %url, "fetching provider metadata");

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AuthError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let metadata: ProviderMetadata = response.json().await?;
        debug!(issuer = %metadata.issuer, "provider metadata loaded");
        Ok(metadata)
    }
}
