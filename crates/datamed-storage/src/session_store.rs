//! High-level API over the durable side effects of a session.

use crate::{Cookie, CookieJar, DurableStorage, StorageKeys, StorageResult};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Lifetime of the `auth_token` cookie.
pub const AUTH_COOKIE_TTL_HOURS: i64 = 24;

/// Reads and writes the authentication flag and the `auth_token` cookie.
///
/// Provider-owned keys are reachable through [`SessionStore::storage`] and
/// are opaque to this type.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn DurableStorage>,
    cookies: CookieJar,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn DurableStorage>) -> Self {
        Self {
            cookies: CookieJar::new(storage.clone()),
            storage,
        }
    }

    pub fn storage(&self) -> &Arc<dyn DurableStorage> {
        &self.storage
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    // ==========================================
    // Authentication flag
    // ==========================================

    pub fn mark_authenticated(&self) -> StorageResult<()> {
        self.storage.set(
            StorageKeys::IS_AUTHENTICATED,
            StorageKeys::AUTHENTICATED_SENTINEL,
        )
    }

    pub fn clear_authenticated(&self) -> StorageResult<()> {
        self.storage.delete(StorageKeys::IS_AUTHENTICATED)?;
        Ok(())
    }

    /// Whether the flag survived from an earlier authenticated run.
    pub fn is_marked_authenticated(&self) -> StorageResult<bool> {
        Ok(self.storage.get(StorageKeys::IS_AUTHENTICATED)?.as_deref()
            == Some(StorageKeys::AUTHENTICATED_SENTINEL))
    }

    // ==========================================
    // Auth cookie
    // ==========================================

    /// Mirror `raw` into the `auth_token` cookie, valid for 24 hours from `now`.
    pub fn write_auth_cookie(&self, raw: &str, now: DateTime<Utc>) -> StorageResult<()> {
        self.cookies.set(&Cookie::new(
            StorageKeys::AUTH_COOKIE_NAME,
            raw,
            now + Duration::hours(AUTH_COOKIE_TTL_HOURS),
        ))
    }

    pub fn expire_auth_cookie(&self) -> StorageResult<()> {
        self.cookies.expire(StorageKeys::AUTH_COOKIE_NAME)
    }

    pub fn auth_cookie(&self) -> StorageResult<Option<Cookie>> {
        self.cookies.get(StorageKeys::AUTH_COOKIE_NAME)
    }

    // ==========================================
    // Bulk
    // ==========================================

    /// Drop the flag and expire the cookie. Safe on an already clean store.
    pub fn clear_session(&self) -> StorageResult<()> {
        self.clear_authenticated()?;
        self.expire_auth_cookie()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStorage;
    use chrono::TimeZone;

    fn store() -> (Arc<MemoryStorage>, SessionStore) {
        let memory = Arc::new(MemoryStorage::new());
        let store = SessionStore::new(memory.clone());
        (memory, store)
    }

    #[test]
    fn test_flag_roundtrip() {
        let (memory, store) = store();
        assert!(!store.is_marked_authenticated().unwrap());

        store.mark_authenticated().unwrap();
        assert_eq!(
            memory.get("isAuthenticated").unwrap(),
            Some("true".to_string())
        );
        assert!(store.is_marked_authenticated().unwrap());

        store.clear_authenticated().unwrap();
        assert!(!store.is_marked_authenticated().unwrap());
    }

    #[test]
    fn test_flag_requires_exact_sentinel() {
        let (memory, store) = store();
        memory.set("isAuthenticated", "yes").unwrap();
        assert!(!store.is_marked_authenticated().unwrap());
    }

    #[test]
    fn test_auth_cookie_expires_after_a_day() {
        let (memory, store) = store();
        let now = Utc.with_ymd_and_hms(2024, 10, 15, 10, 0, 0).unwrap();

        store.write_auth_cookie("a.b.c", now).unwrap();

        assert_eq!(
            memory.get("cookie.auth_token").unwrap().unwrap(),
            "auth_token=a.b.c; path=/; expires=Wed, 16 Oct 2024 10:00:00 GMT"
        );
        let cookie = store.auth_cookie().unwrap().unwrap();
        assert!(!cookie.is_expired(now + Duration::hours(23)));
        assert!(cookie.is_expired(now + Duration::hours(24)));
    }

    #[test]
    fn test_clear_session_on_clean_store() {
        let (_, store) = store();
        store.clear_session().unwrap();

        let cookie = store.auth_cookie().unwrap().unwrap();
        assert_eq!(cookie.value, "");
        assert!(cookie.is_expired(Utc::now()));
        assert!(!store.is_marked_authenticated().unwrap());
    }

    #[test]
    fn test_clear_session_leaves_provider_keys() {
        let (memory, store) = store();
        memory.set(StorageKeys::OIDC_ID_TOKEN, "id").unwrap();
        store.mark_authenticated().unwrap();

        store.clear_session().unwrap();
        assert!(memory.has(StorageKeys::OIDC_ID_TOKEN).unwrap());
    }
}
