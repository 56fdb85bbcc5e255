//! Durable storage for the DataMed client.
//!
//! - [`DurableStorage`]: string key/value store surviving restarts
//! - [`FileStorage`]: JSON file under `~/.datamed/storage.json`
//! - [`MemoryStorage`]: in-process store for tests
//! - [`CookieJar`] / [`SessionStore`]: the `auth_token` cookie and the
//!   `isAuthenticated` flag layered on top

mod cookies;
mod file;
mod keys;
mod memory;
mod session_store;
mod traits;

pub use cookies::{cookie_epoch, Cookie, CookieJar, COOKIE_DATE_FORMAT};
pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use session_store::{SessionStore, AUTH_COOKIE_TTL_HOURS};
pub use traits::DurableStorage;

use datamed_config_and_utils::Paths;
use std::sync::Arc;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Key not found
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Open the default file-backed storage at [`Paths::storage_file`].
pub fn create_storage(paths: &Paths) -> StorageResult<Arc<dyn DurableStorage>> {
    let storage = FileStorage::open(paths.storage_file())?;
    Ok(Arc::new(storage))
}
