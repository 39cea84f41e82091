//! Token auto-refresh loop.
//!
//! DESIGN
//! ======
//! A single background task ticks every `interval` and asks the provider for
//! a new ID token when the current one has less than `threshold` lifetime
//! left. The task is owned by a [`RefreshHandle`]; dropping or cancelling the
//! handle aborts it.
//!
//! ERROR HANDLING
//! ==============
//! Refresh failures are logged and retried on the next tick. The session is
//! never cleared because of a failed refresh: the existing token may still be
//! valid, and the provider reports real invalidation through its state
//! stream.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::session::SessionManager;

/// Result of one refresh check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Nobody is signed in.
    NoSession,
    /// Token has enough lifetime left; no provider call was made.
    Fresh,
    /// A new token was written into the session.
    Refreshed,
    /// The user changed while the refresh was in flight; the token was dropped.
    Superseded,
    /// The provider call failed; the session is untouched.
    Failed,
}

#[derive(Clone)]
pub struct TokenRefresher {
    session: Arc<SessionManager>,
    threshold: Duration,
}

impl TokenRefresher {
    #[must_use]
    pub fn new(session: Arc<SessionManager>, threshold: Duration) -> Self {
        Self { session, threshold }
    }

    /// Run one check: at most one provider refresh call.
    pub async fn check_once(&self) -> RefreshOutcome {
        let Some(current) = self.session.current_user() else {
            return RefreshOutcome::NoSession;
        };
        let remaining = current.remaining_lifetime(OffsetDateTime::now_utc());
        if remaining >= self.threshold {
            return RefreshOutcome::Fresh;
        }

        debug!(uid = %current.user_id, remaining_secs = remaining.whole_seconds(), "refreshing token");
        match self.session.provider().refresh_token().await {
            Ok(token) => {
                if self.session.apply_token(&current.user_id, token) {
                    info!(uid = %current.user_id, "token refreshed");
                    RefreshOutcome::Refreshed
                } else {
                    RefreshOutcome::Superseded
                }
            }
            Err(e) => {
                warn!(uid = %current.user_id, error = %e, "token refresh failed; will retry");
                RefreshOutcome::Failed
            }
        }
    }

    /// Spawn the periodic loop. The first check runs immediately.
    #[must_use]
    pub fn spawn(self, interval: Duration) -> RefreshHandle {
        info!(interval_secs = interval.as_secs(), threshold_secs = self.threshold.as_secs(), "token refresh loop started");
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.check_once().await;
            }
        });
        RefreshHandle { task: Some(task) }
    }
}

/// Exclusive owner of the refresh task.
pub struct RefreshHandle {
    task: Option<JoinHandle<()>>,
}

impl RefreshHandle {
    /// Stop the loop. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("token refresh loop cancelled");
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
#[path = "refresh_test.rs"]
mod tests;
