//! Cookie jar persisted in durable storage.
//!
//! Each cookie is stored under `cookie.<name>` in its `Set-Cookie` form, e.g.
//! `auth_token=<raw>; path=/; expires=Tue, 15 Oct 2024 10:00:00 GMT`.
//! Clearing a cookie keeps the entry but moves `expires` to the epoch, the
//! same way a browser cookie is deleted.

use crate::{DurableStorage, StorageKeys, StorageResult};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::sync::Arc;

/// RFC 1123 date layout used by the `expires` attribute.
pub const COOKIE_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// One second past the epoch, the conventional "already expired" date.
pub fn cookie_epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(1, 0).single().unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub expires: DateTime<Utc>,
}

impl Cookie {
    /// A root-path cookie expiring at `expires`.
    pub fn new(name: impl Into<String>, value: impl Into<String>, expires: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: "/".to_string(),
            expires,
        }
    }

    /// An empty cookie dated at the epoch, which deletes `name`.
    pub fn expired(name: impl Into<String>) -> Self {
        Self::new(name, "", cookie_epoch())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }

    pub fn to_header(&self) -> String {
        format!(
            "{}={}; path={}; expires={}",
            self.name,
            self.value,
            self.path,
            self.expires.format(COOKIE_DATE_FORMAT)
        )
    }

    /// Parse the `Set-Cookie` form written by [`Cookie::to_header`].
    ///
    /// Unknown attributes are ignored. A cookie without `expires` is
    /// rejected since the jar has no notion of session cookies.
    pub fn parse(header: &str) -> Option<Self> {
        let mut parts = header.split(';').map(str::trim).filter(|p| !p.is_empty());
        let (name, value) = parts.next()?.split_once('=')?;

        let mut path = "/".to_string();
        let mut expires = None;
        for attr in parts {
            let (key, val) = attr.split_once('=').unwrap_or((attr, ""));
            match key.to_ascii_lowercase().as_str() {
                "path" => path = val.to_string(),
                "expires" => {
                    expires = NaiveDateTime::parse_from_str(val, COOKIE_DATE_FORMAT)
                        .ok()
                        .map(|naive| naive.and_utc());
                }
                _ => {}
            }
        }

        Some(Self {
            name: name.to_string(),
            value: value.to_string(),
            path,
            expires: expires?,
        })
    }
}

/// Cookies stored in a [`DurableStorage`].
#[derive(Clone)]
pub struct CookieJar {
    storage: Arc<dyn DurableStorage>,
}

impl CookieJar {
    pub fn new(storage: Arc<dyn DurableStorage>) -> Self {
        Self { storage }
    }

    pub fn set(&self, cookie: &Cookie) -> StorageResult<()> {
        self.storage
            .set(&StorageKeys::cookie(&cookie.name), &cookie.to_header())
    }

    /// The stored cookie, expired or not.
    pub fn get(&self, name: &str) -> StorageResult<Option<Cookie>> {
        Ok(self
            .storage
            .get(&StorageKeys::cookie(name))?
            .and_then(|header| Cookie::parse(&header)))
    }

    /// The cookie's value while it is still live at `now`.
    pub fn value(&self, name: &str, now: DateTime<Utc>) -> StorageResult<Option<String>> {
        Ok(self
            .get(name)?
            .filter(|c| !c.is_expired(now))
            .map(|c| c.value))
    }

    /// Expire `name` immediately. Safe when the cookie was never set.
    pub fn expire(&self, name: &str) -> StorageResult<()> {
        self.set(&Cookie::expired(name))
    }
}
