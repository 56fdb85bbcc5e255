//! Navigation seam.
//!
//! Mirrors the two things a browser page can do with its location: rewrite
//! it in place (history replace, no request) or navigate away.

use parking_lot::Mutex;
use url::Url;

pub trait Navigator: Send + Sync {
    /// The location the application was loaded at.
    fn current_location(&self) -> Url;

    /// Rewrite the visible location without navigating.
    fn replace_location(&self, url: Url);

    /// Navigate away (login page, provider logout, application entry).
    fn redirect(&self, url: Url);
}

/// Records location changes instead of acting on them.
///
/// Used by tests and by hosts that decide themselves what a redirect means
/// (opening a browser, printing a URL).
#[derive(Debug)]
pub struct MemoryNavigator {
    location: Mutex<Url>,
    redirects: Mutex<Vec<Url>>,
}

impl MemoryNavigator {
    pub fn new(location: Url) -> Self {
        Self {
            location: Mutex::new(location),
            redirects: Mutex::new(Vec::new()),
        }
    }

    pub fn redirects(&self) -> Vec<Url> {
        self.redirects.lock().clone()
    }

    pub fn last_redirect(&self) -> Option<Url> {
        self.redirects.lock().last().cloned()
    }

    /// Drain recorded redirects.
    pub fn take_redirects(&self) -> Vec<Url> {
        std::mem::take(&mut *self.redirects.lock())
    }
}

impl Navigator for MemoryNavigator {
    fn current_location(&self) -> Url {
        self.location.lock().clone()
    }

    fn replace_location(&self, url: Url) {
        *self.location.lock() = url;
    }

    fn redirect(&self, url: Url) {
        self.redirects.lock().push(url);
    }
}
