//! Token store.
//!
//! Sole owner of the bearer token and the only place tokens are parsed.
//! Writes are validated before anything is mutated; durable mirrors (the
//! `isAuthenticated` flag and the `auth_token` cookie) follow the in-memory
//! value.

use crate::claims::TokenClaims;
use crate::clock::Clock;
use crate::{AuthError, AuthResult};
use datamed_storage::SessionStore;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

struct StoredToken {
    raw: String,
    claims: TokenClaims,
}

pub struct TokenStore {
    current: RwLock<Option<StoredToken>>,
    session: SessionStore,
    clock: Arc<dyn Clock>,
}

impl TokenStore {
    pub fn new(session: SessionStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            current: RwLock::new(None),
            session,
            clock,
        }
    }

    /// Validate and store `raw`.
    ///
    /// A malformed token is rejected with [`AuthError::TokenMalformed`] and
    /// leaves the current token untouched. Failing to write the durable
    /// mirrors is logged; the in-memory token stays authoritative.
    pub fn set_token(&self, raw: &str) -> AuthResult<TokenClaims> {
        let claims = TokenClaims::decode(raw)?;

        *self.current.write() = Some(StoredToken {
            raw: raw.to_string(),
            claims: claims.clone(),
        });

        if let Err(e) = self.session.mark_authenticated() {
            warn!(error = %e, "failed to persist authentication flag");
        }
        if let Err(e) = self.session.write_auth_cookie(raw, self.clock.now()) {
            warn!(error = %e, "failed to write auth cookie");
        }

        debug!(
            token_len = raw.len(),
            username = claims.username.as_deref().unwrap_or("-"),
            expires_at = ?claims.expires_at,
            "token stored"
        );
        Ok(claims)
    }

    /// Drop the token, the flag and the cookie. Safe when nothing is stored.
    pub fn clear(&self) -> AuthResult<()> {
        let had_token = self.current.write().take().is_some();
        self.session.clear_session()?;
        debug!(had_token, "token store cleared");
        Ok(())
    }

    pub fn get_token(&self) -> Option<String> {
        self.current.read().as_ref().map(|t| t.raw.clone())
    }

    pub fn claims(&self) -> Option<TokenClaims> {
        self.current.read().as_ref().map(|t| t.claims.clone())
    }

    /// Token present and not expired, evaluated against the clock now.
    pub fn is_authenticated(&self) -> bool {
        match self.current.read().as_ref() {
            Some(token) => !token.claims.is_expired_at(self.clock.now()),
            None => false,
        }
    }

    /// True when no token is held or its `exp` has been reached.
    pub fn is_token_expired(&self) -> bool {
        match self.current.read().as_ref() {
            Some(token) => token.claims.is_expired_at(self.clock.now()),
            None => true,
        }
    }

    /// True when the token expires within `min_validity`. Errors when no
    /// token is held.
    pub fn expires_within(&self, min_validity: std::time::Duration) -> AuthResult<bool> {
        let guard = self.current.read();
        let token = guard.as_ref().ok_or(AuthError::NotLoggedIn)?;
        let window = chrono::Duration::from_std(min_validity)
            .map_err(|e| AuthError::Config(format!("min validity out of range: {e}")))?;
        Ok(token.claims.expires_within(self.clock.now(), window))
    }

    pub fn get_roles(&self) -> BTreeSet<String> {
        self.current
            .read()
            .as_ref()
            .map(|t| t.claims.roles.clone())
            .unwrap_or_default()
    }

    pub fn username(&self) -> Option<String> {
        self.current
            .read()
            .as_ref()
            .and_then(|t| t.claims.username.clone())
    }

    pub fn email(&self) -> Option<String> {
        self.current
            .read()
            .as_ref()
            .and_then(|t| t.claims.email.clone())
    }

    pub fn session_store(&self) -> &SessionStore {
        &self.session
    }
}
