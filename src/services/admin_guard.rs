//! Back-office route guard.
//!
//! SYSTEM CONTEXT
//! ==============
//! Admin routes render only for an authenticated admin session. The decision
//! is recomputed from the live admin snapshot on every evaluation and never
//! cached across navigations.

use std::sync::Arc;

use super::session::{AdminSession, SessionManager, SessionSnapshot};

pub const ADMIN_LOGIN_ROUTE: &str = "/admin/login";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    Loading,
    Unauthenticated,
    Authenticated(AdminSession),
}

impl GuardState {
    #[must_use]
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Self {
        if snapshot.loading {
            return Self::Loading;
        }
        match &snapshot.user {
            Some(admin) => Self::Authenticated(admin.clone()),
            None => Self::Unauthenticated,
        }
    }
}

/// What the guarded route should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome<T> {
    Spinner,
    Redirect(&'static str),
    Render(T),
}

#[derive(Clone)]
pub struct AdminGuard {
    admin: Arc<SessionManager>,
}

impl AdminGuard {
    #[must_use]
    pub fn new(admin: Arc<SessionManager>) -> Self {
        Self { admin }
    }

    #[must_use]
    pub fn state(&self) -> GuardState {
        GuardState::from_snapshot(&self.admin.snapshot())
    }

    /// Evaluate the guard. `children` runs only for an authenticated admin.
    pub fn render<T, F>(&self, children: F) -> GuardOutcome<T>
    where
        F: FnOnce(&AdminSession) -> T,
    {
        match self.state() {
            GuardState::Loading => GuardOutcome::Spinner,
            GuardState::Unauthenticated => GuardOutcome::Redirect(ADMIN_LOGIN_ROUTE),
            GuardState::Authenticated(admin) => GuardOutcome::Render(children(&admin)),
        }
    }
}

#[cfg(test)]
#[path = "admin_guard_test.rs"]
mod tests;
