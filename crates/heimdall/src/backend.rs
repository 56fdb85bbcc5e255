//! Backend API client used during logout.

use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

/// Backend calls the session manager makes on its own behalf.
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// Invalidate the server side of the session for `bearer`.
    async fn logout(&self, bearer: &str) -> AuthResult<()>;
}

pub struct HttpBackend {
    client: Client,
    api_url: Url,
}

impl HttpBackend {
    pub fn new(api_url: Url) -> Self {
        Self::with_client(Client::new(), api_url)
    }

    pub fn with_client(client: Client, api_url: Url) -> Self {
        Self { client, api_url }
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// `{api_url}/auth/logout`, keeping any base path of `api_url`.
    pub fn logout_url(&self) -> AuthResult<Url> {
        let base = self.api_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/auth/logout"))?)
    }

    /// GET the API root and report the HTTP status.
    pub async fn ping(&self) -> AuthResult<u16> {
        let response = self.client.get(self.api_url.clone()).send().await?;
        Ok(response.status().as_u16())
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn logout(&self, bearer: &str) -> AuthResult<()> {
        let url = self.logout_url()?;
        let response = self
            .client
            .post(url)
            .bearer_auth(bearer)
            .header("X-Requested-With", "XMLHttpRequest")
            .send()
            .await?;

        let status = response.status();
        debug!(status = status.as_u16(), "backend logout responded");
        if status.is_success() {
            Ok(())
        } else {
            Err(AuthError::LogoutBackendFailure(format!(
                "backend answered {status}"
            )))
        }
    }
}
