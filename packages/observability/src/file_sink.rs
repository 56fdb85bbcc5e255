//! Append-only JSONL file with one rotated generation.

use crate::json_layer::JsonLayer;
use crate::LogConfig;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub(crate) fn default_log_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".datamed")
        .join("logs")
        .join("client.jsonl")
}

/// `client.jsonl` -> `client.jsonl.1`
fn rotated_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".1");
    PathBuf::from(name)
}

struct Sink {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
}

impl Sink {
    fn rotate(&mut self) -> io::Result<()> {
        fs::rename(&self.path, rotated_path(&self.path))?;
        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

/// Shared handle to the log file.
///
/// Every line is written with a single `write_all` on an `O_APPEND` file, so
/// lines from concurrent CLI invocations interleave but never tear. When the
/// file passes `max_bytes` it is moved aside to `<name>.1`, replacing the
/// previous generation.
#[derive(Clone)]
pub struct RotatingFile {
    sink: Arc<Mutex<Sink>>,
}

impl RotatingFile {
    pub fn open(path: &Path, max_bytes: u64) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let written = file.metadata()?.len();

        Ok(Self {
            sink: Arc::new(Mutex::new(Sink {
                path: path.to_path_buf(),
                file,
                written,
                max_bytes,
            })),
        })
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut sink = self.sink.lock();
        if sink.max_bytes > 0 && sink.written >= sink.max_bytes {
            // A failed rotation keeps appending to the oversized file.
            let _ = sink.rotate();
        }
        sink.file.write_all(buf)?;
        sink.written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.lock().file.flush()
    }
}

impl<'a> MakeWriter<'a> for RotatingFile {
    type Writer = RotatingFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the file layer, plus a compact stderr layer when asked, as the
/// global subscriber.
pub(crate) fn install(config: &LogConfig) -> io::Result<PathBuf> {
    let path = config.log_path.clone().unwrap_or_else(default_log_path);
    let file = RotatingFile::open(&path, config.max_file_bytes)?;

    let stderr = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(io::stderr)
            .with_filter(env_filter(&config.default_level))
    });

    tracing_subscriber::registry()
        .with(
            JsonLayer::new(config.service_name.clone(), file)
                .with_filter(env_filter(&config.default_level)),
        )
        .with(stderr)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e.to_string()))?;

    Ok(path)
}

/// Fallback when the log file cannot be opened.
pub(crate) fn install_stderr_only(config: &LogConfig) {
    let _ = tracing_subscriber::fmt()
        .compact()
        .with_env_filter(env_filter(&config.default_level))
        .with_writer(io::stderr)
        .with_target(true)
        .finish()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_parent_dirs_and_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("client.jsonl");

        RotatingFile::open(&path, 0).unwrap().write_all(b"one\n").unwrap();
        RotatingFile::open(&path, 0).unwrap().write_all(b"two\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn test_rotates_past_max_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("client.jsonl");

        let mut file = RotatingFile::open(&path, 8).unwrap();
        file.write_all(b"first line\n").unwrap();
        file.write_all(b"second\n").unwrap();
        file.write_all(b"third\n").unwrap();

        assert_eq!(fs::read_to_string(rotated_path(&path)).unwrap(), "first line\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "second\nthird\n");
    }

    #[test]
    fn test_existing_size_counts_toward_rotation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("client.jsonl");
        fs::write(&path, "0123456789\n").unwrap();

        RotatingFile::open(&path, 8).unwrap().write_all(b"new\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
        assert_eq!(fs::read_to_string(rotated_path(&path)).unwrap(), "0123456789\n");
    }

    #[test]
    fn test_rotated_path() {
        assert_eq!(
            rotated_path(Path::new("/tmp/logs/client.jsonl")),
            PathBuf::from("/tmp/logs/client.jsonl.1")
        );
    }
}
