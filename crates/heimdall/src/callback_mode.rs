//! Callback mode detection.
//!
//! A page load is either the return trip of an authorization-code redirect
//! (`?code=...&state=...`) or an ordinary load where an existing provider
//! session may be picked up silently. The two get different provider options
//! and different timeout budgets.

use datamed_config_and_utils::Config;
use std::time::Duration;
use url::Url;

/// Same-origin page the provider redirects to during a silent check.
pub const SILENT_CHECK_SSO_PATH: &str = "/silent-check-sso.html";

/// Scope requested on every authorization request.
pub const DEFAULT_SCOPE: &str = "openid profile email";

/// Query parameters the provider appends to the redirect URI.
const CALLBACK_PARAMS: &[&str] = &["code", "state", "session_code", "session_state", "iss"];

/// Path segment of provider-hosted login pages that can leak into the
/// visible location after a redirect.
const LOGIN_ACTIONS_SEGMENT: &str = "login-actions";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitMode {
    /// Returning from the provider with an authorization code.
    Callback { code: String, state: String },
    /// No callback parameters: best-effort check for an existing session.
    Silent,
}

impl InitMode {
    /// Callback mode requires both `code` and `state` to be present.
    pub fn detect(location: &Url) -> Self {
        let mut code = None;
        let mut state = None;
        for (key, value) in location.query_pairs() {
            match key.as_ref() {
                "code" if code.is_none() => code = Some(value.into_owned()),
                "state" if state.is_none() => state = Some(value.into_owned()),
                _ => {}
            }
        }

        match (code, state) {
            (Some(code), Some(state)) => InitMode::Callback { code, state },
            _ => InitMode::Silent,
        }
    }

    pub fn is_callback(&self) -> bool {
        matches!(self, InitMode::Callback { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            InitMode::Callback { .. } => "callback",
            InitMode::Silent => "silent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkceMethod {
    S256,
}

impl PkceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PkceMethod::S256 => "S256",
        }
    }
}

/// How long initialization may take in each mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitBudgets {
    pub callback: Duration,
    pub silent: Duration,
}

impl Default for InitBudgets {
    fn default() -> Self {
        Self {
            callback: Duration::from_secs(20),
            silent: Duration::from_secs(5),
        }
    }
}

impl InitBudgets {
    pub fn from_config(config: &Config) -> Self {
        Self {
            callback: config.callback_init_timeout(),
            silent: config.silent_init_timeout(),
        }
    }

    pub fn for_mode(&self, mode: &InitMode) -> Duration {
        match mode {
            InitMode::Callback { .. } => self.callback,
            InitMode::Silent => self.silent,
        }
    }
}

/// Provider options for one initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOptions {
    pub mode: InitMode,
    pub scope: String,
    pub pkce_method: PkceMethod,
    /// Where the provider sends the browser after an interactive login.
    pub redirect_uri: Url,
    /// Silent mode only: target of the provider's non-interactive redirect.
    pub silent_check_sso_redirect_uri: Option<Url>,
    /// Periodic login-status iframe polling. Never enabled.
    pub check_login_iframe: bool,
}

impl InitOptions {
    /// Classify `location` and build the matching options.
    pub fn for_location(location: &Url, app_origin: &Url) -> Self {
        let mode = InitMode::detect(location);
        let silent_check_sso_redirect_uri = match mode {
            InitMode::Callback { .. } => None,
            InitMode::Silent => app_origin.join(SILENT_CHECK_SSO_PATH).ok(),
        };

        Self {
            mode,
            scope: DEFAULT_SCOPE.to_string(),
            pkce_method: PkceMethod::S256,
            redirect_uri: origin_root(app_origin),
            silent_check_sso_redirect_uri,
            check_login_iframe: false,
        }
    }
}

/// `scheme://host[:port]/` of `url`.
pub fn origin_root(url: &Url) -> Url {
    let mut root = url.clone();
    root.set_path("/");
    root.set_query(None);
    root.set_fragment(None);
    root
}

/// Location with the provider's callback residue removed.
///
/// Strips `code`, `state`, `session_code` (and the related `session_state`
/// and `iss`) while keeping unrelated query parameters. A path containing a
/// `login-actions` segment is reset to `/`. Returns `None` when there is
/// nothing to clean.
pub fn clean_callback_url(location: &Url) -> Option<Url> {
    let has_params = location
        .query_pairs()
        .any(|(key, _)| CALLBACK_PARAMS.contains(&key.as_ref()));
    let has_login_actions = location
        .path_segments()
        .is_some_and(|mut segments| segments.any(|s| s == LOGIN_ACTIONS_SEGMENT));

    if !has_params && !has_login_actions {
        return None;
    }

    let kept: Vec<(String, String)> = location
        .query_pairs()
        .filter(|(key, _)| !CALLBACK_PARAMS.contains(&key.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut cleaned = location.clone();
    if has_login_actions {
        cleaned.set_path("/");
    }
    if kept.is_empty() {
        cleaned.set_query(None);
    } else {
        cleaned.query_pairs_mut().clear().extend_pairs(kept);
    }
    Some(cleaned)
}
