//! Session lifecycle state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐
//! │  Uninitialized  │ (initial)
//! └────────┬────────┘
//!          │ InitStarted
//!          ▼
//! ┌─────────────────┐  NoSession / InitTimedOut   ┌─────────────────┐
//! │  Initializing   │ ──────────────────────────► │ Unauthenticated │
//! └────────┬────────┘                             └─────────────────┘
//!          │ ProviderAuthenticated     InitFailed          ▲
//!          ▼                               │               │
//! ┌─────────────────┐                      ▼               │
//! │  Authenticated  │               ┌─────────────┐        │
//! └────────┬────────┘               │   Failed    │ ───────┤ LogoutRequested
//!          │ TokenRefreshed (self)  └─────────────┘        │
//!          │ RefreshFailed / LogoutRequested               │
//!          └───────────────────────────────────────────────┘
//! ```
//!
//! `LogoutRequested` is accepted from every settled state so that logging out
//! of an already clean session is not an error. Before initialization it
//! leaves the machine where it is, so a later `InitStarted` still applies.
//! During initialization it is refused; the session discards whatever the
//! in-flight round trip returns instead.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Uninitialized)

    Uninitialized => {
        InitStarted => Initializing,
        LogoutRequested => Uninitialized
    },
    Initializing => {
        ProviderAuthenticated => Authenticated,
        NoSession => Unauthenticated,
        InitTimedOut => Unauthenticated,
        InitFailed => Failed
    },
    Authenticated => {
        TokenRefreshed => Authenticated,
        RefreshFailed => Unauthenticated,
        LogoutRequested => Unauthenticated
    },
    Unauthenticated => {
        LogoutRequested => Unauthenticated
    },
    Failed => {
        LogoutRequested => Unauthenticated
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Externally visible session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Authenticated,
    Unauthenticated,
    /// The provider reported an error during initialization. Treated as
    /// "not authenticated" by every caller.
    Failed,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated)
    }

    /// True once initialization has produced an outcome.
    pub fn is_settled(&self) -> bool {
        !matches!(
            self,
            SessionState::Uninitialized | SessionState::Initializing
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Initializing => "initializing",
            SessionState::Authenticated => "authenticated",
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

impl From<&SessionMachineState> for SessionState {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Uninitialized => SessionState::Uninitialized,
            SessionMachineState::Initializing => SessionState::Initializing,
            SessionMachineState::Authenticated => SessionState::Authenticated,
            SessionMachineState::Unauthenticated => SessionState::Unauthenticated,
            SessionMachineState::Failed => SessionState::Failed,
        }
    }
}

/// Payload for session state change events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStateChangedPayload {
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}
