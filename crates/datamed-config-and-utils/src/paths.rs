//! File system layout under `~/.datamed`.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

const BASE_DIR_NAME: &str = ".datamed";

/// Overrides the base directory when set and non-empty.
pub const HOME_ENV: &str = "DATAMED_HOME";

/// Resolves every file the client reads or writes.
#[derive(Debug, Clone)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    /// Paths rooted at `$DATAMED_HOME`, else `~/.datamed`.
    pub fn new() -> CoreResult<Self> {
        Self::resolve(|key| std::env::var(key).ok(), dirs::home_dir())
    }

    fn resolve<F>(lookup: F, home: Option<PathBuf>) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(HOME_ENV).filter(|d| !d.trim().is_empty()) {
            return Ok(Self::with_base_dir(PathBuf::from(dir)));
        }
        let home = home.ok_or_else(|| {
            CoreError::Path(format!("no home directory; set {} instead", HOME_ENV))
        })?;
        Ok(Self::with_base_dir(home.join(BASE_DIR_NAME)))
    }

    /// Paths rooted at a custom directory (tests, portable installs).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// `~/.datamed/config.json`
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Durable key/value store backing the session flag, cookie jar and
    /// provider state (`~/.datamed/storage.json`).
    pub fn storage_file(&self) -> PathBuf {
        self.base_dir.join("storage.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// `~/.datamed/logs/client.jsonl`
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("client.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
