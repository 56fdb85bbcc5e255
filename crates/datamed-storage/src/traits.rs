//! Storage trait definitions.

use crate::StorageResult;

/// String key/value storage that survives process restarts.
///
/// Plays the role browser local storage plays for a web client: the session
/// flag, the cookie jar and provider-owned state all live here.
pub trait DurableStorage: Send + Sync {
    /// Store a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Retrieve a value
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Delete a value. Returns whether the key existed.
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Check if a key exists
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// List all keys that start with a given prefix.
    fn list_keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Delete every key under `prefix`, returning how many were removed.
    fn delete_prefix(&self, prefix: &str) -> StorageResult<usize> {
        let keys = self.list_keys_with_prefix(prefix)?;
        let mut removed = 0;
        for key in keys {
            if self.delete(&key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
