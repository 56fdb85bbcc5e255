//! Session commands.

use super::Context;
use crate::listener::{RedirectListener, DEFAULT_LOGIN_TIMEOUT};
use crate::output::{self, OutputFormat};
use anyhow::{Context as _, Result};
use chrono::Utc;
use heimdall::{
    InitMode, Navigator, SessionManager, SessionState, SessionStateChangedPayload, SessionStatus,
};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Min validity used by `refresh` without `--force`.
const REFRESH_MIN_VALIDITY: Duration = Duration::from_secs(5);

fn print_status(status: &SessionStatus, format: OutputFormat) {
    output::print_with(status, format, |s| {
        output::print_row("State", &s.state.to_string());
        output::print_row("Provider", s.provider);
        if let Some(err) = &s.init_error {
            let hint = if err.retryable { " (retry later)" } else { "" };
            output::print_row("Error", &format!("{}{}", err.message, hint));
        }
        if s.authenticated {
            output::print_row("User", s.username.as_deref().unwrap_or("unknown"));
            if let Some(name) = &s.display_name {
                output::print_row("Name", name);
            }
            output::print_row("Email", s.email.as_deref().unwrap_or("-"));
            output::print_row("Roles", &s.roles.join(", "));
            let expires = s
                .expires_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string());
            output::print_row("Expires", &expires);
        }
    });
}

fn open_in_browser(url: &Url) {
    if let Err(e) = open::that(url.as_str()) {
        warn!(error = %e, "failed to open browser");
        eprintln!("Could not open a browser: {}", e);
    }
}

async fn initialized(ctx: &Context) -> Result<SessionManager> {
    let (manager, _) = ctx.session()?;
    let outcome = manager.initialize(|_| {}).await;
    debug!(?outcome, "session initialized");
    Ok(manager)
}

async fn require_authenticated(ctx: &Context) -> Result<SessionManager> {
    let manager = initialized(ctx).await?;
    if !manager.is_authenticated() {
        anyhow::bail!("Not logged in. Run 'datamed-session login' first");
    }
    Ok(manager)
}

/// Show the session after a silent initialization.
pub async fn status(ctx: &Context, format: OutputFormat) -> Result<()> {
    let manager = initialized(ctx).await?;
    print_status(&manager.status(), format);
    Ok(())
}

/// Interactive login through the browser.
pub async fn login(ctx: &Context, format: OutputFormat, no_browser: bool) -> Result<()> {
    let manager = initialized(ctx).await?;
    if manager.is_authenticated() {
        let user = manager.get_username().unwrap_or_else(|| "unknown".into());
        output::print_success(&format!("Already logged in as {}", user), format);
        return Ok(());
    }

    // Bind first so the redirect cannot beat the listener.
    let listener = RedirectListener::bind(manager.app_origin(), DEFAULT_LOGIN_TIMEOUT).await?;
    debug!(port = listener.local_port()?, "redirect listener bound");
    let url = manager.do_login().await?;

    eprintln!("Log in at:\n\n  {}\n", url);
    if !no_browser {
        open_in_browser(&url);
    }
    eprintln!("Waiting for the login redirect...");

    let redirect = listener.wait_for_redirect().await?;
    complete_callback(ctx, redirect, format).await
}

/// Complete a login from a redirect URL pasted by the user.
pub async fn callback(ctx: &Context, url: &str, format: OutputFormat) -> Result<()> {
    let location = Url::parse(url).context("invalid redirect URL")?;
    complete_callback(ctx, location, format).await
}

/// Load the app at the provider's redirect, as the browser would.
async fn complete_callback(ctx: &Context, location: Url, format: OutputFormat) -> Result<()> {
    if !InitMode::detect(&location).is_callback() {
        if let Some((_, error)) = location.query_pairs().find(|(k, _)| k == "error") {
            anyhow::bail!("Provider returned an error: {}", error);
        }
        anyhow::bail!("The URL carries no authorization code");
    }

    let (manager, navigator) = ctx.session_at(location)?;
    manager.initialize(|_| {}).await;
    debug!(location = %navigator.current_location(), "callback location cleaned");

    let state = manager.state();
    if !manager.is_authenticated() {
        anyhow::bail!("Login did not complete (session {})", state);
    }

    info!("login completed");
    match format {
        OutputFormat::Text => {
            let user = manager.get_username().unwrap_or_else(|| "unknown".into());
            println!("Logged in as {}", user);
        }
        OutputFormat::Json => print_status(&manager.status(), format),
    }
    Ok(())
}

/// Print the bearer token.
pub async fn token(ctx: &Context, format: OutputFormat) -> Result<()> {
    let manager = require_authenticated(ctx).await?;
    let token = manager.get_token().context("no token held")?;

    match format {
        OutputFormat::Text => println!("{}", token),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "token": token,
                "authorization": manager.authorization_header(),
                "expires_at": manager.status().expires_at,
            }))?
        ),
    }
    Ok(())
}

/// Renew the token.
pub async fn refresh(ctx: &Context, format: OutputFormat, force: bool) -> Result<()> {
    let manager = require_authenticated(ctx).await?;

    let refreshed = if force {
        manager.refresh_now().await.map(|_| true)
    } else {
        manager.update_token(REFRESH_MIN_VALIDITY).await
    };

    match refreshed {
        Ok(true) => output::print_success("Token refreshed", format),
        Ok(false) => output::print_success("Token still valid, nothing to do", format),
        Err(e) => {
            anyhow::bail!(
                "{}. The session has ended; run 'datamed-session login' again",
                e
            );
        }
    }
    Ok(())
}

/// Coordinated logout.
pub async fn logout(ctx: &Context, format: OutputFormat, open_end_session: bool) -> Result<()> {
    let manager = initialized(ctx).await?;
    let report = manager.logout().await;

    let value = json!({
        "backend_notified": report.backend_notified,
        "had_token": report.had_token,
        "redirect": report.redirect.as_str(),
    });
    output::print_with(&value, format, |_| {
        if report.had_token {
            println!("Logged out");
        } else {
            println!("No session to log out of; local state cleared");
        }
        if report.had_token && !report.backend_notified {
            println!("Warning: the backend was not notified");
        }
        println!("End session: {}", report.redirect);
    });

    if open_end_session && &report.redirect != manager.app_origin() {
        open_in_browser(&report.redirect);
    }
    Ok(())
}

/// Open the realm's self-service registration page.
pub async fn register(ctx: &Context, format: OutputFormat, no_browser: bool) -> Result<()> {
    let url = ctx.config.registration_url()?;
    output::print_with(&json!({ "registration_url": url.as_str() }), format, |_| {
        println!("Register at:\n\n  {}\n", url);
    });
    if !no_browser {
        open_in_browser(&url);
    }
    Ok(())
}

/// Keep the session alive, printing state changes until Ctrl-C.
pub async fn watch(ctx: &Context, format: OutputFormat) -> Result<()> {
    let (manager, navigator) = ctx.session()?;
    manager.set_state_callback(Box::new(move |payload: SessionStateChangedPayload| {
        match format {
            OutputFormat::Text => println!(
                "{}  {:<16} {}",
                Utc::now().format("%H:%M:%S"),
                payload.state,
                payload.username.as_deref().unwrap_or("-")
            ),
            OutputFormat::Json => {
                if let Ok(line) = serde_json::to_string(&payload) {
                    println!("{}", line);
                }
            }
        }
    }));

    manager.initialize(|_| {}).await;
    if !manager.is_authenticated() {
        anyhow::bail!("Not logged in. Run 'datamed-session login' first");
    }
    if format == OutputFormat::Text {
        eprintln!("Watching session, press Ctrl-C to stop");
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("watch interrupted");
                break;
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                if manager.state() != SessionState::Authenticated {
                    for url in navigator.take_redirects() {
                        eprintln!("Session ended. Log in again at: {}", url);
                    }
                    break;
                }
            }
        }
    }
    Ok(())
}
