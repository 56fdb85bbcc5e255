//! Local stand-in for the application origin.
//!
//! The provider sends the browser back to the app origin after login. This
//! listener answers on that origin's port, captures the redirect URL and
//! serves the silent-check page the provider targets during silent checks.

use anyhow::{Context, Result};
use heimdall::SILENT_CHECK_SSO_PATH;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

/// Relay page for silent session checks.
pub const SILENT_CHECK_SSO_HTML: &str = include_str!("../static/silent-check-sso.html");

/// How long `login` waits for the browser to come back.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(300);

struct HttpResponse {
    status: u16,
    reason: &'static str,
    body: String,
}

impl HttpResponse {
    fn html(status: u16, reason: &'static str, body: impl Into<String>) -> Self {
        Self {
            status,
            reason,
            body: body.into(),
        }
    }
}

/// Listener bound to the app origin's port.
pub struct RedirectListener {
    listener: TcpListener,
    origin: Url,
    timeout: Duration,
}

impl RedirectListener {
    /// Bind `127.0.0.1:<port of origin>`.
    pub async fn bind(origin: &Url, timeout: Duration) -> Result<Self> {
        let port = origin
            .port_or_known_default()
            .context("application origin has no port")?;
        let addr = format!("127.0.0.1:{}", port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;

        info!(port, "redirect listener ready");
        Ok(Self {
            listener,
            origin: origin.clone(),
            timeout,
        })
    }

    pub fn local_port(&self) -> Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Serve requests until a login redirect arrives, then return it as seen
    /// on the app origin.
    pub async fn wait_for_redirect(self) -> Result<Url> {
        let (tx, mut rx) = mpsc::channel::<Url>(1);
        let origin = self.origin.clone();
        let listener = self.listener;

        let server = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((socket, _)) => {
                        let tx = tx.clone();
                        let origin = origin.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(socket, &origin, tx).await {
                                warn!(error = %e, "error handling connection");
                            }
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "accept error");
                        break;
                    }
                }
            }
        });

        let result = tokio::time::timeout(self.timeout, rx.recv()).await;
        server.abort();

        match result {
            Ok(Some(url)) => Ok(url),
            Ok(None) => anyhow::bail!("redirect listener stopped"),
            Err(_) => anyhow::bail!(
                "no login redirect within {} seconds",
                self.timeout.as_secs()
            ),
        }
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    origin: &Url,
    tx: mpsc::Sender<Url>,
) -> Result<()> {
    let (reader, mut writer) = socket.split();
    let mut reader = BufReader::new(reader);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    debug!(request = %request_line.trim(), "received request");
    let (response, redirect) = route(&request_line, origin);

    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        response.reason,
        response.body.len()
    );
    writer.write_all(head.as_bytes()).await?;
    writer.write_all(response.body.as_bytes()).await?;
    writer.flush().await?;

    if let Some(url) = redirect {
        let _ = tx.send(url).await;
    }
    Ok(())
}

/// Decide the answer to one request line, and whether it carried the login
/// redirect.
fn route(request_line: &str, origin: &Url) -> (HttpResponse, Option<Url>) {
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return (HttpResponse::html(400, "Bad Request", "Bad Request"), None);
    };
    if method != "GET" {
        return (
            HttpResponse::html(405, "Method Not Allowed", "Method Not Allowed"),
            None,
        );
    }

    let Ok(url) = origin.join(target) else {
        return (HttpResponse::html(400, "Bad Request", "Bad Request"), None);
    };

    if url.path() == SILENT_CHECK_SSO_PATH {
        return (HttpResponse::html(200, "OK", SILENT_CHECK_SSO_HTML), None);
    }

    let has = |key: &str| url.query_pairs().any(|(k, _)| k == key);
    if has("code") && has("state") {
        let body = page(
            "Login received",
            "You can close this window and return to the terminal.",
        );
        return (HttpResponse::html(200, "OK", body), Some(url));
    }
    if has("error") {
        let error = url
            .query_pairs()
            .find(|(k, _)| k == "error")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();
        let body = page("Login failed", &format!("Error: {}", escape(&error)));
        return (HttpResponse::html(200, "OK", body), Some(url));
    }

    (HttpResponse::html(404, "Not Found", "Not Found"), None)
}

fn page(title: &str, message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>DataMed - {title}</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px;">
<h1>{title}</h1>
<p>{message}</p>
</body>
</html>"#
    )
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
