//! Client configuration.
//!
//! Values come from built-in defaults, then `~/.datamed/config.json`, then
//! `DATAMED_*` environment variables.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_PROVIDER_URL: &str = "http://localhost:8080/auth";
pub const DEFAULT_REALM: &str = "datamed";
pub const DEFAULT_CLIENT_ID: &str = "datamed-client";
pub const DEFAULT_API_URL: &str = "http://localhost:5000";
pub const DEFAULT_APP_ORIGIN: &str = "http://localhost:3000";

const DEFAULT_CALLBACK_INIT_TIMEOUT_SECS: u64 = 20;
const DEFAULT_SILENT_INIT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_REFRESH_LEAD_SECS: u64 = 70;
const DEFAULT_LOGOUT_TIMEOUT_SECS: u64 = 5;

/// Main client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Identity provider base URL, including the `/auth` context path.
    pub provider_url: String,
    pub realm: String,
    pub client_id: String,
    /// Backend API base URL.
    pub api_url: String,
    /// Origin the application is served from; used as the login redirect
    /// target and for the silent-check resource.
    pub app_origin: String,
    /// Use the in-process simulated provider instead of a real OIDC server.
    pub use_simulated_auth: bool,
    pub callback_init_timeout_secs: u64,
    pub silent_init_timeout_secs: u64,
    /// How long before expiry the refresh scheduler renews the token.
    pub refresh_lead_secs: u64,
    pub logout_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            provider_url: DEFAULT_PROVIDER_URL.to_string(),
            realm: DEFAULT_REALM.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            app_origin: DEFAULT_APP_ORIGIN.to_string(),
            use_simulated_auth: false,
            callback_init_timeout_secs: DEFAULT_CALLBACK_INIT_TIMEOUT_SECS,
            silent_init_timeout_secs: DEFAULT_SILENT_INIT_TIMEOUT_SECS,
            refresh_lead_secs: DEFAULT_REFRESH_LEAD_SECS,
            logout_timeout_secs: DEFAULT_LOGOUT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Defaults overridden from the environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Load configuration from the config file if present, then apply
    /// environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Apply `DATAMED_*` overrides using the given lookup.
    ///
    /// `DATAMED_KEYCLOAK_URL` is the bare server URL; the `/auth` context
    /// path is appended.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(level) = non_empty("DATAMED_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = non_empty("DATAMED_KEYCLOAK_URL") {
            self.provider_url = format!("{}/auth", url.trim_end_matches('/'));
        }
        if let Some(realm) = non_empty("DATAMED_KEYCLOAK_REALM") {
            self.realm = realm;
        }
        if let Some(client_id) = non_empty("DATAMED_KEYCLOAK_CLIENT_ID") {
            self.client_id = client_id;
        }
        if let Some(api_url) = non_empty("DATAMED_API_URL") {
            self.api_url = api_url;
        }
        if let Some(origin) = non_empty("DATAMED_APP_ORIGIN") {
            self.app_origin = origin;
        }
        if let Some(flag) = non_empty("DATAMED_USE_MOCK_AUTH") {
            self.use_simulated_auth = flag.trim().eq_ignore_ascii_case("true");
        }
    }

    /// Reject configurations the session manager cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        self.issuer_url()?;
        self.api_url()?;
        self.app_origin()?;
        if self.client_id.trim().is_empty() {
            return Err(CoreError::Config("client_id must not be empty".into()));
        }
        if self.callback_init_timeout_secs == 0 || self.silent_init_timeout_secs == 0 {
            return Err(CoreError::Config(
                "initialization timeouts must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// `{provider_url}/realms/{realm}`
    pub fn issuer_url(&self) -> CoreResult<Url> {
        let base = self.provider_url.trim_end_matches('/');
        Url::parse(&format!("{}/realms/{}", base, self.realm)).map_err(CoreError::from)
    }

    /// Self-service account registration page of the realm, returning to
    /// the application origin.
    pub fn registration_url(&self) -> CoreResult<Url> {
        let mut url = self.issuer_url()?;
        url.path_segments_mut()
            .map_err(|_| CoreError::Config("provider URL cannot be a base".into()))?
            .extend(["protocol", "openid-connect", "registrations"]);
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", self.app_origin.trim_end_matches('/'));
        Ok(url)
    }

    pub fn api_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_url).map_err(CoreError::from)
    }

    pub fn app_origin(&self) -> CoreResult<Url> {
        Url::parse(&self.app_origin).map_err(CoreError::from)
    }

    pub fn callback_init_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_init_timeout_secs)
    }

    pub fn silent_init_timeout(&self) -> Duration {
        Duration::from_secs(self.silent_init_timeout_secs)
    }

    pub fn refresh_lead(&self) -> Duration {
        Duration::from_secs(self.refresh_lead_secs)
    }

    pub fn logout_timeout(&self) -> Duration {
        Duration::from_secs(self.logout_timeout_secs)
    }
}
