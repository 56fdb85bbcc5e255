//! CLI command implementations.

mod doctor;
mod session;

pub use doctor::doctor;
pub use session::{callback, login, logout, refresh, register, status, token, watch};

use anyhow::Result;
use datamed_config_and_utils::{Config, Paths};
use datamed_storage::{create_storage, DurableStorage};
use heimdall::{MemoryNavigator, SessionManager};
use std::sync::Arc;
use url::Url;

/// Loaded configuration plus the durable storage every command shares.
pub struct Context {
    pub paths: Paths,
    pub config: Config,
    storage: Arc<dyn DurableStorage>,
}

impl Context {
    pub fn new(paths: Paths, config: Config) -> Result<Self> {
        paths.ensure_dirs()?;
        let storage = create_storage(&paths)?;
        Ok(Self {
            paths,
            config,
            storage,
        })
    }

    /// A session as if the application had just been loaded at `location`.
    pub fn session_at(&self, location: Url) -> Result<(SessionManager, Arc<MemoryNavigator>)> {
        let navigator = Arc::new(MemoryNavigator::new(location));
        let manager =
            SessionManager::from_config(&self.config, self.storage.clone(), navigator.clone())?;
        Ok((manager, navigator))
    }

    /// A session loaded at the application origin.
    pub fn session(&self) -> Result<(SessionManager, Arc<MemoryNavigator>)> {
        self.session_at(self.config.app_origin()?)
    }
}
