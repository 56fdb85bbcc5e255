//! Refresh scheduling.
//!
//! One background task per authenticated session sleeps until `lead` before
//! the token's `exp`, renews, and goes back to sleep. The task owns no
//! session state; the session manager hands it the work to run.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshConfig {
    /// Renew this long before `exp`.
    pub lead: Duration,
    /// Floor between two renewals, for tokens that live shorter than `lead`.
    pub min_interval: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            lead: Duration::from_secs(70),
            min_interval: Duration::from_secs(5),
        }
    }
}

impl RefreshConfig {
    pub fn with_lead(lead: Duration) -> Self {
        Self {
            lead,
            ..Self::default()
        }
    }

    /// Time to wait before the next renewal, or `None` for a token that
    /// never expires.
    pub fn delay_until_refresh(
        &self,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<Duration> {
        let expires_at = expires_at?;
        let remaining = (expires_at - now).to_std().unwrap_or(Duration::ZERO);
        Some(remaining.saturating_sub(self.lead).max(self.min_interval))
    }
}

/// Holds the handle of the running refresh task, if any.
#[derive(Default)]
pub struct RefreshScheduler {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `work` as the refresh task, aborting any previous one.
    pub fn arm<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(work);
        if let Some(previous) = self.task.lock().replace(handle) {
            previous.abort();
            debug!("replaced previous refresh task");
        }
    }

    /// Abort the refresh task. Must not be called from inside that task.
    pub fn disarm(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            debug!("refresh task disarmed");
        }
    }

    /// Forget the task without aborting it. Used by the task itself when it
    /// is about to finish.
    pub fn release(&self) {
        self.task.lock().take();
    }

    pub fn is_armed(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}
