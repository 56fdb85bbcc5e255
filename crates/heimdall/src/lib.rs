//! Session and token lifecycle for the DataMed client.
//!
//! This crate provides:
//! - An explicit FSM for the session lifecycle
//! - Callback/silent initialization with a per-mode timeout budget
//! - A token store that validates, parses and mirrors the bearer token
//! - Proactive token refresh ahead of expiry
//! - Coordinated logout across backend, local state and provider
//! - OIDC (authorization code + PKCE) and simulated identity providers

mod auth_fsm;
mod backend;
mod callback_mode;
mod claims;
mod clock;
mod error;
mod init_guard;
mod logout;
mod navigation;
pub mod provider;
mod refresh;
mod session;
mod token_store;

pub use auth_fsm::session_machine;
pub use auth_fsm::{
    SessionMachine, SessionMachineInput, SessionMachineState, SessionState,
    SessionStateChangedPayload,
};
pub use backend::{BackendApi, HttpBackend};
pub use callback_mode::{
    clean_callback_url, origin_root, InitBudgets, InitMode, InitOptions, PkceMethod,
    DEFAULT_SCOPE, SILENT_CHECK_SSO_PATH,
};
pub use claims::TokenClaims;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AuthError, AuthResult};
pub use init_guard::{InitSettlement, InitTimeoutGuard};
pub use logout::{LogoutCoordinator, LogoutReport};
pub use navigation::{MemoryNavigator, Navigator};
pub use provider::{
    build_provider, IdentityProvider, OidcProvider, ProviderInit, SimulatedProvider, TokenSet,
};
pub use refresh::{RefreshConfig, RefreshScheduler};
pub use session::{
    Collaborators, InitErrorSummary, InitOutcome, SessionManager, SessionSettings, SessionStatus,
    StateCallback,
};
pub use token_store::TokenStore;
