//! Init timeout guard.
//!
//! Races the provider round trip against a timer. The first branch to finish
//! wins; if the timer wins, the provider future is dropped on the spot, so a
//! late answer can never write into a session that callers already observed
//! as settled.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Outcome of a guarded initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitSettlement<T> {
    Completed(T),
    TimedOut(Duration),
}

#[derive(Debug, Clone, Copy)]
pub struct InitTimeoutGuard {
    budget: Duration,
}

impl InitTimeoutGuard {
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub async fn run<F, T>(&self, round_trip: F) -> InitSettlement<T>
    where
        F: Future<Output = T>,
    {
        match tokio::time::timeout(self.budget, round_trip).await {
            Ok(value) => InitSettlement::Completed(value),
            Err(_) => {
                warn!(
                    budget_secs = self.budget.as_secs_f64(),
                    "provider did not settle before the init budget, cancelling round trip"
                );
                InitSettlement::TimedOut(self.budget)
            }
        }
    }
}
