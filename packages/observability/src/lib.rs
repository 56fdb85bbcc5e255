//! # Observability
//!
//! Structured logging for the DataMed client.
//!
//! Library crates only emit `tracing` events. The binary calls [`init`] once;
//! every event then lands as a JSON line in `~/.datamed/logs/client.jsonl`
//! (see [`LogConfig::log_path`]) with credentials scrubbed, so a session can
//! be followed with `tail -f ~/.datamed/logs/client.jsonl | jq`.
//!
//! ```rust,ignore
//! observability::init(
//!     observability::LogConfig::for_service("datamed-session")
//!         .level("debug")
//!         .with_stderr(true),
//! );
//! tracing::info!("ready");
//! ```

mod file_sink;
mod json_layer;

use std::path::PathBuf;

pub use file_sink::RotatingFile;
pub use json_layer::{is_sensitive_field, scrub, JsonLayer, LogEntry, REDACTED};

/// Size at which the log file is rotated.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Written into every line as `service`.
    pub service_name: String,
    /// Filter used when `RUST_LOG` is unset.
    pub default_level: String,
    /// Defaults to `~/.datamed/logs/client.jsonl`.
    pub log_path: Option<PathBuf>,
    /// Also print compact lines to stderr.
    pub also_stderr: bool,
    /// Rotation threshold; 0 disables rotation.
    pub max_file_bytes: u64,
}

impl LogConfig {
    pub fn for_service(name: impl Into<String>) -> Self {
        Self {
            service_name: name.into(),
            ..Default::default()
        }
    }

    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.default_level = level.into();
        self
    }

    pub fn with_stderr(mut self, enabled: bool) -> Self {
        self.also_stderr = enabled;
        self
    }

    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "datamed".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

/// Install the global subscriber.
///
/// An unwritable log file degrades to stderr-only logging instead of failing;
/// a second call is a no-op.
pub fn init(config: LogConfig) {
    match file_sink::install(&config) {
        Ok(path) => tracing::debug!(log_path = %path.display(), "logging initialized"),
        Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {}
        Err(error) => {
            file_sink::install_stderr_only(&config);
            tracing::warn!(%error, "log file unavailable, logging to stderr only");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = LogConfig::for_service("datamed-session")
            .level("debug")
            .with_stderr(true)
            .log_path("/tmp/x.jsonl");
        assert_eq!(config.service_name, "datamed-session");
        assert_eq!(config.default_level, "debug");
        assert!(config.also_stderr);
        assert_eq!(config.log_path, Some(PathBuf::from("/tmp/x.jsonl")));
        assert_eq!(config.max_file_bytes, DEFAULT_MAX_FILE_BYTES);
    }
}
