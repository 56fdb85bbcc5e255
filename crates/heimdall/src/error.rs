//! Session error types.

use datamed_config_and_utils::CoreError;
use std::time::Duration;
use thiserror::Error;

/// Session lifecycle error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The provider round trip did not settle within the init budget.
    #[error("Initialization timed out after {0:?}")]
    InitTimeout(Duration),

    /// The provider answered initialization with an error, or with a token
    /// that could not be used.
    #[error("Initialization failed: {0}")]
    InitFailure(#[source] Box<AuthError>),

    /// The token is not a three-part token with a JSON payload.
    #[error("Malformed token: {0}")]
    TokenMalformed(String),

    /// An expiring token could not be renewed.
    #[error("Token refresh failed: {0}")]
    RefreshFailure(String),

    /// The backend logout call failed or timed out.
    #[error("Backend logout failed: {0}")]
    LogoutBackendFailure(String),

    /// Non-2xx response from an identity provider endpoint.
    #[error("Provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    /// Callback `state` does not match any pending login.
    #[error("Callback state does not match a pending login")]
    StateMismatch,

    /// Invalid state transition in the session FSM
    #[error("Invalid session state transition: {0}")]
    InvalidStateTransition(String),

    /// No token is held
    #[error("Not logged in")]
    NotLoggedIn,

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] datamed_storage::StorageError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<CoreError> for AuthError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidUrl(e) => AuthError::InvalidUrl(e),
            other => AuthError::Config(other.to_string()),
        }
    }
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors include:
    /// - Initialization timeouts
    /// - HTTP connection failures and timeouts
    /// - 5xx responses from the provider
    ///
    /// An initialization failure is as transient as its cause.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::InitTimeout(_) => true,
            AuthError::InitFailure(cause) => cause.is_transient(),
            AuthError::Provider { status, .. } => *status >= 500,
            AuthError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            _ => false,
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
