//! Storage key constants.

/// Keys the client writes into durable storage.
pub struct StorageKeys;

impl StorageKeys {
    /// `"true"` sentinel mirrored while a session is authenticated.
    pub const IS_AUTHENTICATED: &'static str = "isAuthenticated";

    /// Value stored under [`Self::IS_AUTHENTICATED`].
    pub const AUTHENTICATED_SENTINEL: &'static str = "true";

    /// Cookie jar entries are stored as `cookie.<name>`.
    pub const COOKIE_PREFIX: &'static str = "cookie.";

    /// Cookie carrying the raw bearer token.
    pub const AUTH_COOKIE_NAME: &'static str = "auth_token";

    /// OIDC refresh token (provider-owned).
    pub const OIDC_REFRESH_TOKEN: &'static str = "oidc.refresh_token";

    /// OIDC id token, used as `id_token_hint` at logout (provider-owned).
    pub const OIDC_ID_TOKEN: &'static str = "oidc.id_token";

    /// Pending authorization requests, keyed `oidc.callback.<state>`.
    pub const OIDC_CALLBACK_PREFIX: &'static str = "oidc.callback.";

    /// Token minted by the simulated provider.
    pub const SIMULATED_TOKEN: &'static str = "mockToken";

    pub fn cookie(name: &str) -> String {
        format!("{}{}", Self::COOKIE_PREFIX, name)
    }

    pub fn oidc_callback(state: &str) -> String {
        format!("{}{}", Self::OIDC_CALLBACK_PREFIX, state)
    }
}
