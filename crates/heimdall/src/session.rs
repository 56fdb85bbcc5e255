//! Session management with proactive token refresh using FSM-based state management.
//!
//! [`SessionManager`] is built once per process with its collaborators
//! injected (provider, backend, storage, clock, navigation). Lifecycle state
//! lives in an explicit state machine; the bearer token lives in the
//! [`TokenStore`]. Everything that can go wrong during initialization or
//! refresh is turned into a state transition rather than returned to the
//! host.

use crate::auth_fsm::{
    SessionMachine, SessionMachineInput, SessionState, SessionStateChangedPayload,
};
use crate::backend::{BackendApi, HttpBackend};
use crate::callback_mode::{clean_callback_url, origin_root, InitBudgets, InitOptions};
use crate::claims::TokenClaims;
use crate::clock::{Clock, SystemClock};
use crate::init_guard::{InitSettlement, InitTimeoutGuard};
use crate::logout::{LogoutCoordinator, LogoutReport};
use crate::navigation::Navigator;
use crate::provider::{build_provider, IdentityProvider, ProviderInit};
use crate::refresh::{RefreshConfig, RefreshScheduler};
use crate::token_store::TokenStore;
use crate::{AuthError, AuthResult};
use chrono::{DateTime, Utc};
use datamed_config_and_utils::Config;
use datamed_storage::{DurableStorage, SessionStore};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Callback type for session state change notifications.
pub type StateCallback = Box<dyn Fn(SessionStateChangedPayload) + Send + Sync>;

/// What a call to [`SessionManager::initialize`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// This call ran initialization; the callback fired once it settled.
    Settled(SessionState),
    /// Initialization had already settled; the callback fired immediately.
    AlreadyInitialized(SessionState),
    /// Another initialization is in flight. The callback was not invoked.
    InProgress,
}

/// Why initialization ended without a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitErrorSummary {
    pub message: String,
    /// A later attempt may succeed.
    pub retryable: bool,
}

impl From<&AuthError> for InitErrorSummary {
    fn from(err: &AuthError) -> Self {
        Self {
            message: err.to_string(),
            retryable: err.is_transient(),
        }
    }
}

/// Point-in-time view of the session for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub authenticated: bool,
    pub provider: &'static str,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_error: Option<InitErrorSummary>,
}

/// Tunables of a session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub app_origin: Url,
    pub budgets: InitBudgets,
    pub refresh: RefreshConfig,
    pub logout_timeout: Duration,
}

impl SessionSettings {
    pub fn new(app_origin: Url) -> Self {
        Self {
            app_origin,
            budgets: InitBudgets::default(),
            refresh: RefreshConfig::default(),
            logout_timeout: Duration::from_secs(5),
        }
    }

    pub fn from_config(config: &Config) -> AuthResult<Self> {
        Ok(Self {
            app_origin: config.app_origin()?,
            budgets: InitBudgets::from_config(config),
            refresh: RefreshConfig::with_lead(config.refresh_lead()),
            logout_timeout: config.logout_timeout(),
        })
    }
}

/// Everything a session talks to.
pub struct Collaborators {
    pub provider: Arc<dyn IdentityProvider>,
    pub backend: Arc<dyn BackendApi>,
    pub storage: Arc<dyn DurableStorage>,
    pub clock: Arc<dyn Clock>,
    pub navigator: Arc<dyn Navigator>,
}

#[derive(Debug, Default)]
struct InitFlags {
    initialized: bool,
    initializing: bool,
}

/// Clears `initializing` when an initialize future is dropped before it
/// settles, so the next call can start over.
struct InitInFlight<'a> {
    flags: &'a Mutex<InitFlags>,
    settled: bool,
}

impl<'a> InitInFlight<'a> {
    fn new(flags: &'a Mutex<InitFlags>) -> Self {
        Self {
            flags,
            settled: false,
        }
    }

    fn settle(mut self) {
        self.settled = true;
        let mut flags = self.flags.lock();
        flags.initialized = true;
        flags.initializing = false;
    }
}

impl Drop for InitInFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!("initialization abandoned before settling");
            self.flags.lock().initializing = false;
        }
    }
}

struct Inner {
    fsm: Mutex<SessionMachine>,
    flags: Mutex<InitFlags>,
    /// Bumped by every logout. Provider answers that were requested under an
    /// older value are discarded.
    logout_generation: Mutex<u64>,
    init_error: Mutex<Option<InitErrorSummary>>,
    tokens: TokenStore,
    provider: Arc<dyn IdentityProvider>,
    navigator: Arc<dyn Navigator>,
    logout: LogoutCoordinator,
    refresh: RefreshScheduler,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    state_callback: Mutex<Option<StateCallback>>,
}

/// Session manager for the authentication lifecycle.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Create a new session manager.
    pub fn new(settings: SessionSettings, collaborators: Collaborators) -> Self {
        let Collaborators {
            provider,
            backend,
            storage,
            clock,
            navigator,
        } = collaborators;

        Self {
            inner: Arc::new(Inner {
                fsm: Mutex::new(SessionMachine::new()),
                flags: Mutex::new(InitFlags::default()),
                logout_generation: Mutex::new(0),
                init_error: Mutex::new(None),
                tokens: TokenStore::new(SessionStore::new(storage), clock.clone()),
                provider,
                navigator,
                logout: LogoutCoordinator::new(backend, settings.logout_timeout),
                refresh: RefreshScheduler::new(),
                clock,
                settings,
                state_callback: Mutex::new(None),
            }),
        }
    }

    /// Wire up the production collaborators described by `config`.
    pub fn from_config(
        config: &Config,
        storage: Arc<dyn DurableStorage>,
        navigator: Arc<dyn Navigator>,
    ) -> AuthResult<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let provider = build_provider(config, storage.clone(), clock.clone())?;
        let backend = Arc::new(HttpBackend::new(config.api_url()?));

        Ok(Self::new(
            SessionSettings::from_config(config)?,
            Collaborators {
                provider,
                backend,
                storage,
                clock,
                navigator,
            },
        ))
    }

    /// Set a callback to be notified of session state changes.
    pub fn set_state_callback(&self, callback: StateCallback) {
        *self.inner.state_callback.lock() = Some(callback);
    }

    /// Get the current FSM state.
    pub fn state(&self) -> SessionState {
        SessionState::from(self.inner.fsm.lock().state())
    }

    pub fn provider_name(&self) -> &'static str {
        self.inner.provider.name()
    }

    pub fn app_origin(&self) -> &Url {
        &self.inner.settings.app_origin
    }

    /// Transition the FSM and notify callback if state changed.
    fn transition(&self, input: &SessionMachineInput) -> AuthResult<SessionState> {
        let mut fsm = self.inner.fsm.lock();
        let old_state = SessionState::from(fsm.state());

        fsm.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;

        let new_state = SessionState::from(fsm.state());
        drop(fsm);

        if old_state != new_state {
            debug!(
                old_state = %old_state,
                new_state = %new_state,
                "Session state transition"
            );
            self.notify_state_change(new_state);
        }

        Ok(new_state)
    }

    /// Transition, logging instead of failing when the input does not apply.
    fn try_transition(&self, input: &SessionMachineInput) -> SessionState {
        match self.transition(input) {
            Ok(state) => state,
            Err(e) => {
                debug!(error = %e, "transition ignored");
                self.state()
            }
        }
    }

    fn notify_state_change(&self, state: SessionState) {
        let cb = self.inner.state_callback.lock();
        if let Some(callback) = cb.as_ref() {
            callback(SessionStateChangedPayload {
                state,
                username: self.inner.tokens.username(),
                email: self.inner.tokens.email(),
            });
        }
    }

    // ==========================================
    // Initialization
    // ==========================================

    /// Run initialization once.
    ///
    /// `on_settled` is invoked exactly once when this call settles the
    /// session, or immediately when it already has. A call made while
    /// another initialization is in flight returns
    /// [`InitOutcome::InProgress`] without invoking it.
    ///
    /// The provider round trip is raced against the mode's budget. If the
    /// budget wins the round trip is dropped and the session settles as
    /// unauthenticated.
    pub async fn initialize<F>(&self, on_settled: F) -> InitOutcome
    where
        F: FnOnce(SessionState) + Send,
    {
        let already_initialized = {
            let mut flags = self.inner.flags.lock();
            if flags.initialized {
                true
            } else if flags.initializing {
                debug!("initialization already in flight, ignoring re-entrant call");
                return InitOutcome::InProgress;
            } else {
                flags.initializing = true;
                false
            }
        };

        if already_initialized {
            let state = self.state();
            on_settled(state);
            return InitOutcome::AlreadyInitialized(state);
        }

        let in_flight = InitInFlight::new(&self.inner.flags);
        // Still `Initializing` when an earlier call was dropped mid-flight.
        self.try_transition(&SessionMachineInput::InitStarted);

        let generation = self.logout_generation();
        let location = self.inner.navigator.current_location();
        let options = InitOptions::for_location(&location, &self.inner.settings.app_origin);
        let guard = InitTimeoutGuard::new(self.inner.settings.budgets.for_mode(&options.mode));
        info!(
            mode = options.mode.name(),
            provider = self.inner.provider.name(),
            budget_secs = guard.budget().as_secs_f64(),
            "initializing session"
        );

        let settlement = guard.run(self.inner.provider.init(&options)).await;
        let state = self.settle(settlement, generation, &options, &location);
        in_flight.settle();

        info!(state = %state, "session initialized");
        on_settled(state);
        InitOutcome::Settled(state)
    }

    fn settle(
        &self,
        settlement: InitSettlement<AuthResult<ProviderInit>>,
        generation: u64,
        options: &InitOptions,
        location: &Url,
    ) -> SessionState {
        let state = {
            let current = self.inner.logout_generation.lock();
            if *current != generation {
                info!("logged out during initialization, discarding the provider's answer");
                self.discard_token();
                self.try_transition(&SessionMachineInput::NoSession)
            } else {
                self.apply_settlement(settlement)
            }
        };

        // The code is single use whatever the outcome; a reload must not
        // submit it again.
        if options.mode.is_callback() {
            if let Some(cleaned) = clean_callback_url(location) {
                debug!(location = %cleaned, "removing callback parameters from location");
                self.inner.navigator.replace_location(cleaned);
            }
        }

        state
    }

    fn apply_settlement(
        &self,
        settlement: InitSettlement<AuthResult<ProviderInit>>,
    ) -> SessionState {
        match settlement {
            InitSettlement::Completed(Ok(ProviderInit::Authenticated(tokens))) => {
                let claims = match self.inner.tokens.set_token(&tokens.access_token) {
                    Ok(claims) => claims,
                    Err(e) => return self.fail_init(AuthError::InitFailure(Box::new(e))),
                };
                match self.transition(&SessionMachineInput::ProviderAuthenticated) {
                    Ok(state) => {
                        info!(
                            username = claims.username.as_deref().unwrap_or("-"),
                            "session authenticated"
                        );
                        self.schedule_refresh();
                        state
                    }
                    Err(e) => {
                        warn!(error = %e, "session cannot take the provider's token, discarding it");
                        self.discard_token();
                        self.state()
                    }
                }
            }
            InitSettlement::Completed(Ok(ProviderInit::NotAuthenticated)) => {
                info!("no existing session");
                self.discard_token();
                self.try_transition(&SessionMachineInput::NoSession)
            }
            InitSettlement::Completed(Err(e)) => self.fail_init(AuthError::InitFailure(Box::new(e))),
            InitSettlement::TimedOut(budget) => {
                let err = AuthError::InitTimeout(budget);
                warn!(error = %err, "provider did not answer in time");
                *self.inner.init_error.lock() = Some(InitErrorSummary::from(&err));
                self.discard_token();
                self.try_transition(&SessionMachineInput::InitTimedOut)
            }
        }
    }

    fn fail_init(&self, err: AuthError) -> SessionState {
        warn!(error = %err, retryable = err.is_transient(), "provider initialization failed");
        *self.inner.init_error.lock() = Some(InitErrorSummary::from(&err));
        self.discard_token();
        self.try_transition(&SessionMachineInput::InitFailed)
    }

    fn logout_generation(&self) -> u64 {
        *self.inner.logout_generation.lock()
    }

    fn discard_token(&self) {
        if let Err(e) = self.inner.tokens.clear() {
            warn!(error = %e, "failed to clear session state");
        }
    }

    // ==========================================
    // Refresh
    // ==========================================

    /// Arm the refresh task for the current token.
    fn schedule_refresh(&self) {
        let Some(claims) = self.inner.tokens.claims() else {
            self.inner.refresh.disarm();
            return;
        };
        let Some(delay) = self
            .inner
            .settings
            .refresh
            .delay_until_refresh(claims.expires_at, self.inner.clock.now())
        else {
            debug!("token has no expiry, refresh not scheduled");
            self.inner.refresh.disarm();
            return;
        };

        debug!(delay_secs = delay.as_secs(), "refresh scheduled");
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner.refresh.arm(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.refresh.release();
            let session = SessionManager { inner };
            if let Err(e) = session.renew().await {
                debug!(error = %e, "scheduled refresh did not renew the token");
            }
        });
    }

    /// Refresh when the token expires within `min_validity`.
    ///
    /// Returns whether a refresh happened. A failed refresh ends the
    /// session and redirects to login.
    pub async fn update_token(&self, min_validity: Duration) -> AuthResult<bool> {
        if !self.inner.tokens.expires_within(min_validity)? {
            debug!(
                min_validity_secs = min_validity.as_secs(),
                "token still valid, refresh skipped"
            );
            return Ok(false);
        }
        self.renew().await?;
        Ok(true)
    }

    /// Refresh unconditionally.
    pub async fn refresh_now(&self) -> AuthResult<()> {
        self.renew().await
    }

    async fn renew(&self) -> AuthResult<()> {
        if self.state() != SessionState::Authenticated {
            return Err(AuthError::NotLoggedIn);
        }
        let generation = self.logout_generation();

        let renewed = self.inner.provider.update_token().await;

        let reason = {
            let current = self.inner.logout_generation.lock();
            // A logout may have run while the provider was answering.
            if *current != generation || self.state() != SessionState::Authenticated {
                debug!(
                    renewed = renewed.is_ok(),
                    "session ended during refresh, discarding the result"
                );
                return Err(AuthError::NotLoggedIn);
            }

            match renewed.and_then(|tokens| self.inner.tokens.set_token(&tokens.access_token)) {
                Ok(claims) => {
                    self.try_transition(&SessionMachineInput::TokenRefreshed);
                    info!(expires_at = ?claims.expires_at, "token refreshed");
                    self.schedule_refresh();
                    return Ok(());
                }
                Err(e) => e.to_string(),
            }
        };

        self.fail_refresh(&reason).await;
        Err(AuthError::RefreshFailure(reason))
    }

    /// End the session after a failed refresh and send the user to login.
    async fn fail_refresh(&self, reason: &str) {
        warn!(reason, "token refresh failed, ending session");
        self.inner.refresh.disarm();
        self.discard_token();
        self.try_transition(&SessionMachineInput::RefreshFailed);

        if let Err(e) = self.do_login().await {
            warn!(error = %e, "could not build login URL, returning to application entry");
            self.inner
                .navigator
                .redirect(origin_root(&self.inner.settings.app_origin));
        }
    }

    // ==========================================
    // Login / logout
    // ==========================================

    /// Navigate to the provider's login page. Returns the URL used.
    pub async fn do_login(&self) -> AuthResult<Url> {
        let redirect_uri = origin_root(&self.inner.settings.app_origin);
        let url = self.inner.provider.create_login_url(&redirect_uri).await?;
        info!(provider = self.inner.provider.name(), "redirecting to login");
        self.inner.navigator.redirect(url.clone());
        Ok(url)
    }

    /// Coordinated logout. Never fails: the backend call is best effort and
    /// local state is always cleared.
    pub async fn logout(&self) -> LogoutReport {
        *self.inner.logout_generation.lock() += 1;
        self.inner.refresh.disarm();

        let app_entry = origin_root(&self.inner.settings.app_origin);
        let redirect = self
            .inner
            .logout
            .redirect_target(self.inner.provider.as_ref(), &app_entry)
            .await;

        let (backend_notified, had_token) = self
            .inner
            .logout
            .teardown(&self.inner.tokens, self.inner.provider.as_ref())
            .await;
        self.try_transition(&SessionMachineInput::LogoutRequested);

        self.inner.navigator.redirect(redirect.clone());
        info!(backend_notified, had_token, "logged out");

        LogoutReport {
            backend_notified,
            had_token,
            redirect,
        }
    }

    // ==========================================
    // Readers
    // ==========================================

    pub fn get_token(&self) -> Option<String> {
        self.inner.tokens.get_token()
    }

    /// `Bearer <token>` for the current token, if any.
    pub fn authorization_header(&self) -> Option<String> {
        self.get_token().map(|token| format!("Bearer {token}"))
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.tokens.is_authenticated()
    }

    pub fn is_token_expired(&self) -> bool {
        self.inner.tokens.is_token_expired()
    }

    pub fn get_user_roles(&self) -> BTreeSet<String> {
        self.inner.tokens.get_roles()
    }

    pub fn get_username(&self) -> Option<String> {
        self.inner.tokens.username()
    }

    pub fn get_claims(&self) -> Option<TokenClaims> {
        self.inner.tokens.claims()
    }

    pub fn is_refresh_armed(&self) -> bool {
        self.inner.refresh.is_armed()
    }

    pub fn status(&self) -> SessionStatus {
        let claims = self.get_claims();
        SessionStatus {
            state: self.state(),
            authenticated: self.is_authenticated(),
            provider: self.inner.provider.name(),
            username: claims.as_ref().and_then(|c| c.username.clone()),
            display_name: claims.as_ref().and_then(TokenClaims::display_name),
            email: claims.as_ref().and_then(|c| c.email.clone()),
            roles: claims
                .as_ref()
                .map(|c| c.roles.iter().cloned().collect())
                .unwrap_or_default(),
            expires_at: claims.and_then(|c| c.expires_at),
            init_error: self.inner.init_error.lock().clone(),
        }
    }
}
