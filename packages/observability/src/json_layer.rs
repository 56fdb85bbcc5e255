//! JSON line layer with credential scrubbing.
//!
//! Each event becomes one object: `ts`, `level`, `service`, `pid`, `target`,
//! `msg`, the event's fields and the names of the enclosing spans. Values are
//! scrubbed twice: by field name (`access_token`, `authorization`, ...) and
//! by content, so a JWT or a callback URL logged under an innocent name does
//! not leak either.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt;
use std::io::Write;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Replacement written in place of credential values.
pub const REDACTED: &str = "[REDACTED]";

const SENSITIVE_NAMES: &[&str] = &[
    "token",
    "authorization",
    "verifier",
    "password",
    "secret",
    "cookie",
];

/// Query parameters that carry one-time codes or tokens in provider URLs.
const SENSITIVE_PARAMS: &[&str] = &[
    "code",
    "code_verifier",
    "id_token_hint",
    "refresh_token",
    "access_token",
    "session_code",
];

/// True when a field name suggests it carries a credential.
///
/// `_len` and `_present` companions describe a credential without revealing
/// it and pass through.
pub fn is_sensitive_field(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with("_len") || lower.ends_with("_present") {
        return false;
    }
    SENSITIVE_NAMES.iter().any(|n| lower.contains(n))
}

fn looks_like_jwt(value: &str) -> bool {
    let value = value.strip_prefix("Bearer ").unwrap_or(value);
    value.starts_with("eyJ")
        && value.split('.').count() == 3
        && value.bytes().all(|b| {
            b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_' | b'=' | b'+' | b'/')
        })
}

/// Remove credentials from a free-form value.
///
/// Whole-value JWTs are replaced; in URLs and query strings only the values
/// of [`SENSITIVE_PARAMS`] are.
pub fn scrub(value: &str) -> Cow<'_, str> {
    if looks_like_jwt(value) {
        return Cow::Borrowed(REDACTED);
    }
    if !value.contains('=') {
        return Cow::Borrowed(value);
    }

    let mut out = String::with_capacity(value.len());
    let mut changed = false;
    let mut rest = value;
    while let Some(eq) = rest.find('=') {
        let key_start = rest[..eq]
            .rfind(|c: char| matches!(c, '?' | '&' | ' ' | '"'))
            .map(|i| i + 1)
            .unwrap_or(0);
        let key = &rest[key_start..eq];
        out.push_str(&rest[..=eq]);
        rest = &rest[eq + 1..];

        let end = rest
            .find(|c: char| matches!(c, '&' | ' ' | '"' | '#'))
            .unwrap_or(rest.len());
        if SENSITIVE_PARAMS.contains(&key) && end > 0 {
            out.push_str(REDACTED);
            changed = true;
        } else {
            out.push_str(&rest[..end]);
        }
        rest = &rest[end..];
    }
    out.push_str(rest);

    if changed {
        Cow::Owned(out)
    } else {
        Cow::Borrowed(value)
    }
}

/// One serialized log line.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub ts: String,
    pub level: &'static str,
    pub service: String,
    pub pid: u32,
    pub target: String,
    pub msg: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub spans: Vec<String>,
}

#[derive(Default)]
struct Fields {
    map: Map<String, Value>,
    msg: String,
}

impl Fields {
    fn put(&mut self, field: &Field, value: Value) {
        let value = match value {
            _ if is_sensitive_field(field.name()) => Value::String(REDACTED.into()),
            Value::String(s) => Value::String(scrub(&s).into_owned()),
            other => other,
        };
        self.map.insert(field.name().into(), value);
    }

    fn put_text(&mut self, field: &Field, text: String) {
        if field.name() == "message" {
            self.msg = scrub(&text).into_owned();
        } else {
            self.put(field, Value::String(text));
        }
    }
}

impl Visit for Fields {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put_text(field, format!("{:?}", value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put_text(field, value.to_owned());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put_text(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.put(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, value.into());
    }
}

/// Layer writing each event as one scrubbed JSON line.
pub struct JsonLayer<W> {
    service: String,
    pid: u32,
    make_writer: W,
}

impl<W> JsonLayer<W> {
    pub fn new(service: impl Into<String>, make_writer: W) -> Self {
        Self {
            service: service.into(),
            pid: std::process::id(),
            make_writer,
        }
    }
}

impl<S, W> Layer<S> for JsonLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut fields = Fields::default();
        event.record(&mut fields);

        let spans = ctx
            .event_scope(event)
            .map(|scope| scope.from_root().map(|s| s.name().to_string()).collect())
            .unwrap_or_default();

        let meta = event.metadata();
        let entry = LogEntry {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            level: meta.level().as_str(),
            service: self.service.clone(),
            pid: self.pid,
            target: meta.target().to_string(),
            msg: fields.msg,
            fields: fields.map,
            spans,
        };

        if let Ok(line) = serde_json::to_string(&entry) {
            let _ = writeln!(self.make_writer.make_writer(), "{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn lines(&self) -> Vec<Value> {
            String::from_utf8(self.0.lock().clone())
                .unwrap()
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect()
        }
    }

    impl std::io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture<F: FnOnce()>(f: F) -> Vec<Value> {
        let capture = Capture::default();
        let subscriber =
            tracing_subscriber::registry().with(JsonLayer::new("datamed-session", capture.clone()));
        tracing::subscriber::with_default(subscriber, f);
        capture.lines()
    }

    #[test]
    fn test_sensitive_field_names() {
        assert!(is_sensitive_field("access_token"));
        assert!(is_sensitive_field("Authorization"));
        assert!(is_sensitive_field("code_verifier"));
        assert!(!is_sensitive_field("token_len"));
        assert!(!is_sensitive_field("refresh_token_present"));
        assert!(!is_sensitive_field("username"));
    }

    #[test]
    fn test_scrub_callback_url() {
        assert_eq!(
            scrub("http://localhost:3000/?code=abc123&state=xyz"),
            "http://localhost:3000/?code=[REDACTED]&state=xyz"
        );
        assert_eq!(
            scrub("https://idp/logout?id_token_hint=eyJx.eyJy.sig&client_id=datamed-client"),
            "https://idp/logout?id_token_hint=[REDACTED]&client_id=datamed-client"
        );
        assert_eq!(scrub("realm=datamed"), "realm=datamed");
        assert!(matches!(scrub("no params here"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_scrub_bare_jwt() {
        assert_eq!(scrub("eyJhbGciOi.eyJzdWIi.c2ln"), REDACTED);
        assert_eq!(scrub("Bearer eyJhbGciOi.eyJzdWIi.c2ln"), REDACTED);
        assert_eq!(scrub("eyJ but not a token"), "eyJ but not a token");
    }

    #[test]
    fn test_layer_writes_scrubbed_line() {
        let lines = capture(|| {
            tracing::info!(
                access_token = "raw",
                token_len = 3,
                location = "http://localhost:3000/?code=c0de&state=s",
                "redirecting"
            );
        });

        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line["service"], "datamed-session");
        assert_eq!(line["level"], "INFO");
        assert_eq!(line["msg"], "redirecting");
        assert_eq!(line["access_token"], REDACTED);
        assert_eq!(line["token_len"], 3);
        assert_eq!(
            line["location"],
            "http://localhost:3000/?code=[REDACTED]&state=s"
        );
    }

    #[test]
    fn test_layer_records_span_scope() {
        let lines = capture(|| {
            let outer = tracing::info_span!("initialize");
            let _outer = outer.enter();
            let inner = tracing::info_span!("settle");
            let _inner = inner.enter();
            tracing::debug!("settled");
        });

        assert_eq!(lines[0]["spans"], serde_json::json!(["initialize", "settle"]));
    }
}
