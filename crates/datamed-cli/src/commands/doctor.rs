//! Connectivity and environment diagnostics.

use super::Context;
use crate::listener::SILENT_CHECK_SSO_HTML;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use heimdall::provider::DiscoveryClient;
use heimdall::{HttpBackend, SILENT_CHECK_SSO_PATH};
use reqwest::Client;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct Check {
    name: &'static str,
    ok: bool,
    detail: String,
}

impl Check {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            ok: true,
            detail: detail.into(),
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            ok: false,
            detail: detail.into(),
        }
    }
}

fn status_check(
    name: &'static str,
    url: &str,
    result: reqwest::Result<reqwest::Response>,
) -> Check {
    match result {
        Ok(response) if response.status().is_server_error() => {
            Check::fail(name, format!("{} returned {}", url, response.status()))
        }
        Ok(response) => Check::pass(name, format!("{} ({})", url, response.status())),
        Err(e) => Check::fail(name, format!("{}: {}", url, e)),
    }
}

async fn check_provider(ctx: &Context, http: &Client) -> Vec<Check> {
    if ctx.config.use_simulated_auth {
        return vec![Check::pass("provider", "simulated authentication enabled")];
    }

    let issuer = match ctx.config.issuer_url() {
        Ok(issuer) => issuer,
        Err(e) => return vec![Check::fail("provider", e.to_string())],
    };

    let base = ctx.config.provider_url.clone();
    let mut checks = vec![status_check("provider", &base, http.get(&base).send().await)];

    let discovery = DiscoveryClient::new(http.clone(), issuer);
    checks.push(match discovery.metadata().await {
        Ok(metadata) => {
            let logout = if metadata.end_session_endpoint.is_some() {
                "with end-session endpoint"
            } else {
                "without end-session endpoint"
            };
            Check::pass("discovery", format!("{} {}", metadata.issuer, logout))
        }
        Err(e) => {
            let url = discovery
                .discovery_url()
                .map(|u| u.to_string())
                .unwrap_or_default();
            Check::fail("discovery", format!("{}: {}", url, e))
        }
    });
    checks
}

async fn check_backend(ctx: &Context, http: &Client) -> Check {
    let api = match ctx.config.api_url() {
        Ok(api) => api,
        Err(e) => return Check::fail("backend", e.to_string()),
    };
    let backend = HttpBackend::with_client(http.clone(), api.clone());
    match backend.ping().await {
        Ok(status) if status >= 500 => {
            Check::fail("backend", format!("{} returned {}", api, status))
        }
        Ok(status) => Check::pass("backend", format!("{} ({})", api, status)),
        Err(e) => Check::fail("backend", format!("{}: {}", api, e)),
    }
}

async fn check_silent_page(ctx: &Context, http: &Client) -> Check {
    let page = match ctx
        .config
        .app_origin()
        .and_then(|origin| Ok(origin.join(SILENT_CHECK_SSO_PATH)?))
    {
        Ok(page) => page,
        Err(e) => return Check::fail("silent-check page", e.to_string()),
    };

    match http.get(page.clone()).send().await {
        Ok(response) if response.status().is_success() => {
            Check::pass("silent-check page", page.to_string())
        }
        Ok(response) => Check::fail(
            "silent-check page",
            format!("{} returned {}", page, response.status()),
        ),
        // Nothing listening is expected outside a login; the CLI serves the
        // page itself while waiting for the redirect.
        Err(_) => Check::pass(
            "silent-check page",
            format!("served by the CLI during login ({} bytes)", SILENT_CHECK_SSO_HTML.len()),
        ),
    }
}

fn check_path(name: &'static str, path: &Path) -> Check {
    if path.exists() {
        Check::pass(name, path.display().to_string())
    } else {
        Check::pass(name, format!("{} (not created yet)", path.display()))
    }
}

/// Run every check and print the results.
pub async fn doctor(ctx: &Context, format: OutputFormat) -> Result<()> {
    let http = Client::builder().timeout(PROBE_TIMEOUT).build()?;

    let mut checks = check_provider(ctx, &http).await;
    checks.push(check_backend(ctx, &http).await);
    checks.push(check_silent_page(ctx, &http).await);
    checks.push(check_path("config", &ctx.paths.config_file()));
    checks.push(check_path("storage", &ctx.paths.storage_file()));
    checks.push(check_path("log", &ctx.paths.log_file()));

    let failed = checks.iter().filter(|c| !c.ok).count();
    debug!(total = checks.len(), failed, "doctor finished");

    output::print_with(&checks, format, |checks| {
        output::print_heading("DataMed session diagnostics");
        for check in checks {
            let mark = if check.ok { "ok" } else { "FAIL" };
            output::print_row(check.name, &format!("[{}] {}", mark, check.detail));
        }
        output::print_divider();
    });

    if failed > 0 {
        anyhow::bail!("{} check(s) failed", failed);
    }
    Ok(())
}
