//! End-to-end lifecycle tests for `SessionManager` with fake collaborators.
//!
//! Timer-dependent cases run on paused tokio time, so init budgets and the
//! refresh lead elapse instantly.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{TimeZone, Utc};
use datamed_storage::{DurableStorage, MemoryStorage, SessionStore, StorageKeys};
use heimdall::{
    AuthError, AuthResult, BackendApi, Clock, Collaborators, IdentityProvider, InitOptions,
    InitOutcome, ManualClock, MemoryNavigator, Navigator, ProviderInit, SessionManager,
    SessionSettings, SessionState, TokenSet,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

const NOW: i64 = 1_700_000_000;
const APP: &str = "http://localhost:3000/";

fn token(exp: i64) -> String {
    let payload = json!({
        "sub": "user-1",
        "preferred_username": "dr-house",
        "given_name": "Gregory",
        "family_name": "House",
        "email": "house@datamed.com",
        "realm_access": { "roles": ["doctor"] },
        "iat": exp - 3600,
        "exp": exp,
    });
    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(payload.to_string()),
        URL_SAFE_NO_PAD.encode("signature"),
    )
}

// ==========================================
// Fakes
// ==========================================

#[derive(Clone)]
enum InitBehavior {
    Token(String),
    NoSession,
    Fail,
    Hang,
    /// Answer with a token after a delay.
    Slow(Duration, String),
}

struct FakeProvider {
    init: Mutex<InitBehavior>,
    /// Token handed out on refresh; `None` makes refresh fail.
    refreshed: Mutex<Option<String>>,
    refresh_delay: Mutex<Duration>,
    init_calls: AtomicUsize,
    init_completed: AtomicUsize,
    refresh_calls: AtomicUsize,
    seen_options: Mutex<Vec<InitOptions>>,
    cleared: AtomicUsize,
}

impl FakeProvider {
    fn new(init: InitBehavior) -> Self {
        Self {
            init: Mutex::new(init),
            refreshed: Mutex::new(None),
            refresh_delay: Mutex::new(Duration::ZERO),
            init_calls: AtomicUsize::new(0),
            init_completed: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            seen_options: Mutex::new(Vec::new()),
            cleared: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn init(&self, options: &InitOptions) -> AuthResult<ProviderInit> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_options.lock().push(options.clone());
        let behavior = self.init.lock().clone();

        let result = match behavior {
            InitBehavior::Token(raw) => Ok(ProviderInit::Authenticated(TokenSet::access_only(raw))),
            InitBehavior::NoSession => Ok(ProviderInit::NotAuthenticated),
            InitBehavior::Fail => Err(AuthError::Provider {
                status: 500,
                message: "realm unavailable".into(),
            }),
            InitBehavior::Hang => std::future::pending().await,
            InitBehavior::Slow(delay, raw) => {
                tokio::time::sleep(delay).await;
                Ok(ProviderInit::Authenticated(TokenSet::access_only(raw)))
            }
        };
        self.init_completed.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn update_token(&self) -> AuthResult<TokenSet> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.refresh_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match self.refreshed.lock().clone() {
            Some(raw) => Ok(TokenSet::access_only(raw)),
            None => Err(AuthError::Provider {
                status: 400,
                message: "invalid_grant".into(),
            }),
        }
    }

    async fn create_login_url(&self, redirect_uri: &Url) -> AuthResult<Url> {
        let mut url = Url::parse("https://idp.example/login").unwrap();
        url.query_pairs_mut()
            .append_pair("redirect_uri", redirect_uri.as_str());
        Ok(url)
    }

    async fn create_logout_url(&self, redirect_uri: &Url) -> AuthResult<Url> {
        let mut url = Url::parse("https://idp.example/logout").unwrap();
        url.query_pairs_mut()
            .append_pair("post_logout_redirect_uri", redirect_uri.as_str());
        Ok(url)
    }

    fn clear_local_session(&self) -> AuthResult<()> {
        self.cleared.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum BackendBehavior {
    Ok,
    Fail,
    Hang,
}

struct FakeBackend {
    behavior: BackendBehavior,
    bearers: Mutex<Vec<String>>,
}

#[async_trait]
impl BackendApi for FakeBackend {
    async fn logout(&self, bearer: &str) -> AuthResult<()> {
        self.bearers.lock().push(bearer.to_string());
        match self.behavior {
            BackendBehavior::Ok => Ok(()),
            BackendBehavior::Fail => Err(AuthError::LogoutBackendFailure("boom".into())),
            BackendBehavior::Hang => std::future::pending().await,
        }
    }
}

struct Harness {
    manager: SessionManager,
    provider: Arc<FakeProvider>,
    backend: Arc<FakeBackend>,
    navigator: Arc<MemoryNavigator>,
    storage: Arc<MemoryStorage>,
    clock: Arc<ManualClock>,
}

fn harness_with(location: &str, init: InitBehavior, backend: BackendBehavior) -> Harness {
    let provider = Arc::new(FakeProvider::new(init));
    let backend = Arc::new(FakeBackend {
        behavior: backend,
        bearers: Mutex::new(Vec::new()),
    });
    let navigator = Arc::new(MemoryNavigator::new(Url::parse(location).unwrap()));
    let storage = Arc::new(MemoryStorage::new());
    let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(NOW, 0).unwrap()));

    let manager = SessionManager::new(
        SessionSettings::new(Url::parse(APP).unwrap()),
        Collaborators {
            provider: provider.clone(),
            backend: backend.clone(),
            storage: storage.clone(),
            clock: clock.clone(),
            navigator: navigator.clone(),
        },
    );

    Harness {
        manager,
        provider,
        backend,
        navigator,
        storage,
        clock,
    }
}

fn harness(location: &str, init: InitBehavior) -> Harness {
    harness_with(location, init, BackendBehavior::Ok)
}

fn assert_liveness_consistent(manager: &SessionManager) {
    assert_eq!(
        manager.is_authenticated(),
        manager.get_token().is_some() && !manager.is_token_expired()
    );
}

// ==========================================
// Initialization
// ==========================================

#[tokio::test(start_paused = true)]
async fn test_concurrent_initialize_runs_once() {
    let h = harness(
        APP,
        InitBehavior::Slow(Duration::from_secs(1), token(NOW + 3600)),
    );
    let callbacks = AtomicUsize::new(0);

    let (first, second) = tokio::join!(
        h.manager.initialize(|_| {
            callbacks.fetch_add(1, Ordering::SeqCst);
        }),
        h.manager.initialize(|_| {
            callbacks.fetch_add(1, Ordering::SeqCst);
        }),
    );

    assert_eq!(first, InitOutcome::Settled(SessionState::Authenticated));
    assert_eq!(second, InitOutcome::InProgress);
    assert_eq!(callbacks.load(Ordering::SeqCst), 1);
    assert_eq!(h.provider.init_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_callback_location_gets_long_budget() {
    let h = harness(
        "http://localhost:3000/?code=abc&state=xyz",
        InitBehavior::Hang,
    );

    let start = Instant::now();
    let outcome = h.manager.initialize(|_| {}).await;
    let elapsed = start.elapsed();

    assert_eq!(outcome, InitOutcome::Settled(SessionState::Unauthenticated));
    assert!(elapsed >= Duration::from_secs(20) && elapsed < Duration::from_secs(21));

    let options = h.provider.seen_options.lock();
    assert!(options[0].mode.is_callback());
    assert_eq!(options[0].scope, "openid profile email");
    assert!(options[0].silent_check_sso_redirect_uri.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_plain_location_gets_short_budget() {
    let h = harness("http://localhost:3000/notes?code=abc", InitBehavior::Hang);

    let start = Instant::now();
    h.manager.initialize(|_| {}).await;
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6));

    let options = h.provider.seen_options.lock();
    assert!(!options[0].mode.is_callback());
    assert!(!options[0].check_login_iframe);
    assert_eq!(
        options[0]
            .silent_check_sso_redirect_uri
            .as_ref()
            .map(Url::as_str),
        Some("http://localhost:3000/silent-check-sso.html")
    );
}

#[tokio::test(start_paused = true)]
async fn test_timeout_cancels_late_provider_answer() {
    let h = harness(
        APP,
        InitBehavior::Slow(Duration::from_secs(30), token(NOW + 3600)),
    );
    let callbacks = Arc::new(Mutex::new(Vec::new()));
    let sink = callbacks.clone();

    let outcome = h.manager.initialize(move |state| sink.lock().push(state)).await;
    assert_eq!(outcome, InitOutcome::Settled(SessionState::Unauthenticated));

    // Well past the point where the provider would have answered.
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(*callbacks.lock(), vec![SessionState::Unauthenticated]);
    assert_eq!(h.provider.init_completed.load(Ordering::SeqCst), 0);
    assert_eq!(h.manager.state(), SessionState::Unauthenticated);
    assert!(h.manager.get_token().is_none());
    assert_liveness_consistent(&h.manager);
}

#[tokio::test(start_paused = true)]
async fn test_provider_error_settles_failed() {
    let h = harness(APP, InitBehavior::Fail);
    let mut seen = None;
    h.manager.initialize(|state| seen = Some(state)).await;

    assert_eq!(seen, Some(SessionState::Failed));
    assert!(!h.manager.is_authenticated());
    assert!(h.navigator.redirects().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_no_session_settles_unauthenticated() {
    let h = harness(APP, InitBehavior::NoSession);
    let outcome = h.manager.initialize(|_| {}).await;
    assert_eq!(outcome, InitOutcome::Settled(SessionState::Unauthenticated));
    assert!(!h.manager.is_refresh_armed());
}

#[tokio::test(start_paused = true)]
async fn test_malformed_provider_token_is_not_stored() {
    let h = harness(APP, InitBehavior::Token("not-a-token".into()));
    let outcome = h.manager.initialize(|_| {}).await;

    assert_eq!(outcome, InitOutcome::Settled(SessionState::Failed));
    assert!(h.manager.get_token().is_none());
    assert!(h.manager.get_claims().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_callback_parameters_removed_after_exchange() {
    let h = harness(
        "http://localhost:3000/?code=abc&state=xyz&session_code=q&lang=fr",
        InitBehavior::Token(token(NOW + 3600)),
    );
    h.manager.initialize(|_| {}).await;

    let location = h.navigator.current_location();
    let keys: Vec<String> = location.query_pairs().map(|(k, _)| k.into_owned()).collect();
    assert_eq!(keys, vec!["lang".to_string()]);
    assert!(h.navigator.redirects().is_empty());
    assert!(h.manager.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn test_authenticated_session_mirrors_flag_and_cookie() {
    let h = harness(APP, InitBehavior::Token(token(NOW + 3600)));
    h.manager.initialize(|_| {}).await;

    let session = SessionStore::new(h.storage.clone());
    assert!(session.is_marked_authenticated().unwrap());
    let cookie = session.auth_cookie().unwrap().unwrap();
    assert_eq!(Some(cookie.value), h.manager.get_token());
    assert_eq!(cookie.expires.timestamp(), NOW + 24 * 3600);
}

#[tokio::test(start_paused = true)]
async fn test_init_error_is_reported_in_status() {
    let h = harness(APP, InitBehavior::Fail);
    h.manager.initialize(|_| {}).await;
    let err = h.manager.status().init_error.unwrap();
    assert!(err.message.contains("realm unavailable"));
    assert!(err.retryable);

    let h = harness(APP, InitBehavior::Hang);
    h.manager.initialize(|_| {}).await;
    let err = h.manager.status().init_error.unwrap();
    assert!(err.message.contains("timed out"));
    assert!(err.retryable);

    let h = harness(APP, InitBehavior::Token("not-a-token".into()));
    h.manager.initialize(|_| {}).await;
    let err = h.manager.status().init_error.unwrap();
    assert!(err.message.starts_with("Initialization failed: Malformed token"));
    assert!(!err.retryable);

    let h = harness(APP, InitBehavior::Token(token(NOW + 3600)));
    h.manager.initialize(|_| {}).await;
    let status = h.manager.status();
    assert!(status.init_error.is_none());
    assert_eq!(status.display_name.as_deref(), Some("Gregory House"));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_initialize_can_be_retried() {
    let h = harness(APP, InitBehavior::Hang);

    let abandoned =
        tokio::time::timeout(Duration::from_secs(1), h.manager.initialize(|_| {})).await;
    assert!(abandoned.is_err());

    *h.provider.init.lock() = InitBehavior::Token(token(NOW + 3600));
    let mut seen = None;
    let outcome = h.manager.initialize(|state| seen = Some(state)).await;

    assert_eq!(outcome, InitOutcome::Settled(SessionState::Authenticated));
    assert_eq!(seen, Some(SessionState::Authenticated));
    assert_eq!(h.provider.init_calls.load(Ordering::SeqCst), 2);
    assert!(h.manager.is_refresh_armed());
}

// ==========================================
// Liveness
// ==========================================

#[tokio::test(start_paused = true)]
async fn test_expired_token_is_held_but_not_authenticated() {
    let h = harness(APP, InitBehavior::Token(token(NOW - 1)));
    h.manager.initialize(|_| {}).await;

    assert!(h.manager.get_token().is_some());
    assert!(h.manager.is_token_expired());
    assert!(!h.manager.is_authenticated());
    assert_liveness_consistent(&h.manager);
}

#[tokio::test(start_paused = true)]
async fn test_liveness_follows_the_clock() {
    let h = harness(APP, InitBehavior::Token(token(NOW + 3600)));
    h.manager.initialize(|_| {}).await;
    assert!(h.manager.is_authenticated());
    assert_liveness_consistent(&h.manager);

    h.clock.advance(chrono::Duration::seconds(3600));
    assert!(h.manager.is_token_expired());
    assert!(!h.manager.is_authenticated());
    assert_liveness_consistent(&h.manager);
}

// ==========================================
// Refresh
// ==========================================

#[tokio::test(start_paused = true)]
async fn test_refresh_fires_ahead_of_expiry() {
    let h = harness(APP, InitBehavior::Token(token(NOW + 3600)));
    *h.provider.refreshed.lock() = Some(token(NOW + 7200));
    h.manager.initialize(|_| {}).await;
    assert!(h.manager.is_refresh_armed());

    // 70 s lead before a one hour token
    tokio::time::sleep(Duration::from_secs(3529)).await;
    assert_eq!(h.provider.refresh_calls.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.provider.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.manager.get_token(), Some(token(NOW + 7200)));
    assert_eq!(h.manager.state(), SessionState::Authenticated);
    assert!(h.manager.is_refresh_armed());
}

#[tokio::test(start_paused = true)]
async fn test_refresh_failure_forces_login() {
    let h = harness(APP, InitBehavior::Token(token(NOW + 3600)));
    h.manager.initialize(|_| {}).await;

    tokio::time::sleep(Duration::from_secs(3600)).await;

    assert_eq!(h.provider.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.manager.state(), SessionState::Unauthenticated);
    assert!(h.manager.get_token().is_none());
    assert!(!h.manager.is_refresh_armed());

    let redirect = h.navigator.last_redirect().unwrap();
    assert_eq!(redirect.host_str(), Some("idp.example"));
    assert_eq!(redirect.path(), "/login");
}

#[tokio::test(start_paused = true)]
async fn test_update_token_respects_min_validity() {
    let h = harness(APP, InitBehavior::Token(token(NOW + 60)));
    *h.provider.refreshed.lock() = Some(token(NOW + 3600));
    h.manager.initialize(|_| {}).await;

    assert!(!h.manager.update_token(Duration::from_secs(5)).await.unwrap());
    assert_eq!(h.provider.refresh_calls.load(Ordering::SeqCst), 0);

    assert!(h.manager.update_token(Duration::from_secs(70)).await.unwrap());
    assert_eq!(h.provider.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.manager.get_token(), Some(token(NOW + 3600)));
}

#[tokio::test(start_paused = true)]
async fn test_explicit_refresh_failure_is_reported() {
    let h = harness(APP, InitBehavior::Token(token(NOW + 3600)));
    h.manager.initialize(|_| {}).await;

    let result = h.manager.refresh_now().await;
    assert!(matches!(result, Err(AuthError::RefreshFailure(_))));
    assert_eq!(h.manager.state(), SessionState::Unauthenticated);
    assert!(h.navigator.last_redirect().is_some());
}

// ==========================================
// Logout
// ==========================================

#[tokio::test(start_paused = true)]
async fn test_logout_notifies_backend_then_clears() {
    let h = harness(APP, InitBehavior::Token(token(NOW + 3600)));
    h.manager.initialize(|_| {}).await;
    let bearer = h.manager.get_token().unwrap();

    let report = h.manager.logout().await;

    assert!(report.backend_notified);
    assert!(report.had_token);
    assert_eq!(*h.backend.bearers.lock(), vec![bearer]);
    assert_eq!(h.provider.cleared.load(Ordering::SeqCst), 1);
    assert_eq!(report.redirect.path(), "/logout");
    assert_eq!(h.navigator.last_redirect(), Some(report.redirect));
    assert_eq!(h.manager.state(), SessionState::Unauthenticated);
    assert!(!h.manager.is_refresh_armed());
}

#[tokio::test(start_paused = true)]
async fn test_logout_with_hanging_backend_still_clears() {
    let h = harness_with(
        APP,
        InitBehavior::Token(token(NOW + 3600)),
        BackendBehavior::Hang,
    );
    h.manager.initialize(|_| {}).await;

    let report = h.manager.logout().await;

    assert!(!report.backend_notified);
    assert!(h.manager.get_token().is_none());
    assert!(!h.manager.is_authenticated());

    let session = SessionStore::new(h.storage.clone());
    let cookie = session.auth_cookie().unwrap().unwrap();
    assert!(cookie.is_expired(h.clock.now()));
    assert!(!session.is_marked_authenticated().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_logout_with_failing_backend_still_clears() {
    let h = harness_with(
        APP,
        InitBehavior::Token(token(NOW + 3600)),
        BackendBehavior::Fail,
    );
    h.manager.initialize(|_| {}).await;

    let report = h.manager.logout().await;
    assert!(!report.backend_notified);
    assert!(h.manager.get_token().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_logout_on_clean_state_is_safe() {
    // Never initialized.
    let fresh = harness(APP, InitBehavior::NoSession);
    let report = fresh.manager.logout().await;
    assert!(!report.had_token);
    assert_eq!(fresh.manager.state(), SessionState::Uninitialized);

    // Initialized without a session, logged out twice.
    let h = harness(APP, InitBehavior::NoSession);
    h.manager.initialize(|_| {}).await;
    for _ in 0..2 {
        let report = h.manager.logout().await;
        assert!(!report.had_token);
        assert!(!report.backend_notified);
    }
    assert!(h.backend.bearers.lock().is_empty());
    assert_eq!(h.manager.state(), SessionState::Unauthenticated);
    assert!(h
        .storage
        .get(StorageKeys::IS_AUTHENTICATED)
        .unwrap()
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn test_initialize_after_early_logout_authenticates() {
    let h = harness(APP, InitBehavior::Token(token(NOW + 3600)));
    *h.provider.refreshed.lock() = Some(token(NOW + 7200));

    h.manager.logout().await;
    assert_eq!(h.manager.state(), SessionState::Uninitialized);

    let mut seen = None;
    let outcome = h.manager.initialize(|state| seen = Some(state)).await;

    assert_eq!(outcome, InitOutcome::Settled(SessionState::Authenticated));
    assert_eq!(seen, Some(SessionState::Authenticated));
    assert!(h.manager.is_authenticated());
    assert!(h.manager.is_refresh_armed());
    h.manager.refresh_now().await.unwrap();
    assert_eq!(h.manager.get_token(), Some(token(NOW + 7200)));
}

#[tokio::test(start_paused = true)]
async fn test_logout_during_initialize_wins() {
    let h = harness(
        APP,
        InitBehavior::Slow(Duration::from_secs(1), token(NOW + 3600)),
    );
    let callbacks = Arc::new(Mutex::new(Vec::new()));
    let sink = callbacks.clone();

    let (outcome, report) = tokio::join!(
        h.manager.initialize(move |state| sink.lock().push(state)),
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            h.manager.logout().await
        },
    );

    assert!(!report.had_token);
    assert_eq!(outcome, InitOutcome::Settled(SessionState::Unauthenticated));
    assert_eq!(*callbacks.lock(), vec![SessionState::Unauthenticated]);
    assert_eq!(h.provider.init_completed.load(Ordering::SeqCst), 1);
    assert_eq!(h.manager.state(), SessionState::Unauthenticated);
    assert!(h.manager.get_token().is_none());
    assert!(!h.manager.is_authenticated());
    assert!(!h.manager.is_refresh_armed());
    assert!(!SessionStore::new(h.storage.clone())
        .is_marked_authenticated()
        .unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_renewal_finishing_after_logout_is_discarded() {
    let h = harness(APP, InitBehavior::Token(token(NOW + 3600)));
    *h.provider.refreshed.lock() = Some(token(NOW + 7200));
    *h.provider.refresh_delay.lock() = Duration::from_secs(2);
    h.manager.initialize(|_| {}).await;

    let (renewed, report) = tokio::join!(h.manager.refresh_now(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.manager.logout().await
    });

    assert!(matches!(renewed, Err(AuthError::NotLoggedIn)));
    assert!(report.had_token);
    assert_eq!(h.provider.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.manager.state(), SessionState::Unauthenticated);
    assert!(h.manager.get_token().is_none());
    assert!(!h.manager.is_refresh_armed());
    assert_eq!(h.navigator.redirects(), vec![report.redirect]);
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_refresh_failing_after_logout_keeps_logout_redirect() {
    let h = harness(APP, InitBehavior::Token(token(NOW + 3600)));
    *h.provider.refresh_delay.lock() = Duration::from_secs(10);
    h.manager.initialize(|_| {}).await;

    // The refresh fires at 3530 s and is still waiting on the provider.
    tokio::time::sleep(Duration::from_secs(3531)).await;
    assert_eq!(h.provider.refresh_calls.load(Ordering::SeqCst), 1);

    let report = h.manager.logout().await;
    tokio::time::sleep(Duration::from_secs(20)).await;

    assert_eq!(h.manager.state(), SessionState::Unauthenticated);
    assert!(h.manager.get_token().is_none());
    assert_eq!(h.navigator.redirects(), vec![report.redirect.clone()]);
    assert_eq!(h.navigator.last_redirect().unwrap().path(), "/logout");
}

#[tokio::test(start_paused = true)]
async fn test_do_login_redirects_with_app_origin() {
    let h = harness(APP, InitBehavior::NoSession);
    h.manager.initialize(|_| {}).await;

    let url = h.manager.do_login().await.unwrap();
    assert_eq!(h.navigator.last_redirect(), Some(url.clone()));
    assert!(url
        .query_pairs()
        .any(|(k, v)| k == "redirect_uri" && v == APP));
}
