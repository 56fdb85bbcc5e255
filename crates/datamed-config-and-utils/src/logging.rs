//! Logging initialization for the client.
//!
//! Thin wrappers over the observability crate. Everything lands as JSONL in
//! `~/.datamed/logs/client.jsonl`.

use crate::Paths;
use observability::LogConfig;

/// Service name written into every log line.
pub const SERVICE_NAME: &str = "datamed-session";

/// Initialize logging for the `datamed-session` binary, writing to
/// [`Paths::log_file`].
///
/// Set `DATAMED_LOG_STDERR=1` to mirror lines to stderr.
///
/// ```ignore
/// init_logging(&paths, "info");
/// tracing::info!("client started");
/// ```
pub fn init_logging(paths: &Paths, level: &str) {
    observability::init(log_config(paths, level, stderr_requested()));
}

fn stderr_requested() -> bool {
    std::env::var("DATAMED_LOG_STDERR")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn log_config(paths: &Paths, level: &str, also_stderr: bool) -> LogConfig {
    LogConfig::for_service(SERVICE_NAME)
        .level(parse_level(level).as_str().to_lowercase())
        .log_path(paths.log_file())
        .with_stderr(also_stderr)
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
