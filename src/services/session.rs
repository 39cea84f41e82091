//! Auth session manager.
//!
//! ARCHITECTURE
//! ============
//! One `SessionManager` per realm (end user, back office). It owns the
//! in-memory [`Session`] and publishes [`SessionSnapshot`]s over a `watch`
//! channel. Two writers exist: the provider listener task (spawned by
//! [`SessionManager::init`]) and the manager's own sign-in/up/out results.
//! The token refresh loop writes through [`SessionManager::apply_token`].
//!
//! TRADE-OFFS
//! ==========
//! Sign-out clears the local session even when the provider call fails, so
//! the UI can never be stuck in an authenticated state. The provider may
//! still hold its own session in that case.

use std::sync::{Arc, Mutex};

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::AuthError;
use crate::identity::{IdToken, IdentityProvider, ProviderState, ProviderUser};
use crate::notify::{Notifier, Toast};

// =============================================================================
// SESSION
// =============================================================================

/// Authentication realm a manager is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Realm {
    User,
    Admin,
}

impl Realm {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

/// Currently authenticated user and access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub display_name: Option<String>,
    pub email: String,
    pub token: String,
    pub token_expiry: OffsetDateTime,
}

/// Back-office sessions share the shape of end-user sessions.
pub type AdminSession = Session;

impl Session {
    /// Token lifetime left at `now`. Negative once expired.
    #[must_use]
    pub fn remaining_lifetime(&self, now: OffsetDateTime) -> time::Duration {
        self.token_expiry - now
    }
}

impl From<ProviderUser> for Session {
    fn from(user: ProviderUser) -> Self {
        Self {
            user_id: user.uid,
            display_name: user.display_name,
            email: user.email,
            token: user.id_token,
            token_expiry: user.expires_at,
        }
    }
}

/// What subscribers observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub user: Option<Session>,
    /// `true` until the provider's first state delivery.
    pub loading: bool,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self { user: None, loading: true }
    }
}

// =============================================================================
// MANAGER
// =============================================================================

type UserChangeHook = Arc<dyn Fn(Option<&str>) + Send + Sync>;
type UserChangeHooks = Arc<Mutex<Vec<UserChangeHook>>>;

pub struct SessionManager {
    realm: Realm,
    provider: Arc<dyn IdentityProvider>,
    notifier: Arc<dyn Notifier>,
    state: Arc<watch::Sender<SessionSnapshot>>,
    user_change: UserChangeHooks,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    #[must_use]
    pub fn new(realm: Realm, provider: Arc<dyn IdentityProvider>, notifier: Arc<dyn Notifier>) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            realm,
            provider,
            notifier,
            state: Arc::new(state),
            user_change: Arc::new(Mutex::new(Vec::new())),
            listener: Mutex::new(None),
        }
    }

    /// Start listening to the provider. Idempotent.
    pub fn init(&self) {
        let mut listener = self.listener.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if listener.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let rx = self.provider.subscribe();
        let state = Arc::clone(&self.state);
        let hooks = Arc::clone(&self.user_change);
        let realm = self.realm;
        *listener = Some(tokio::spawn(listen(realm, rx, state, hooks)));
        debug!(realm = realm.as_str(), "session listener started");
    }

    /// Detach from the provider. No snapshot is published afterwards except
    /// by explicit sign-in/up/out calls.
    pub fn dispose(&self) {
        let handle = self.listener.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take();
        if let Some(handle) = handle {
            handle.abort();
            debug!(realm = self.realm.as_str(), "session listener stopped");
        }
    }

    #[must_use]
    pub fn realm(&self) -> Realm {
        self.realm
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn current_user(&self) -> Option<Session> {
        self.state.borrow().user.clone()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    /// Latest access token, for API callers.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.state.borrow().user.as_ref().map(|s| s.token.clone())
    }

    /// Wait until the provider has delivered its first state.
    pub async fn ready(&self) -> SessionSnapshot {
        let mut rx = self.subscribe();
        match rx.wait_for(|s| !s.loading).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot(),
        }
    }

    /// Create an account, set its display name, and sign it in.
    ///
    /// # Errors
    ///
    /// Returns the classified provider error; the session is unchanged.
    pub async fn sign_up(&self, email: &str, password: &str, name: &str) -> Result<(), AuthError> {
        let result = self.sign_up_inner(email, password, name).await;
        match result {
            Ok(user) => {
                info!(realm = self.realm.as_str(), uid = %user.uid, "account created");
                self.set_user(Some(Session::from(user)));
                self.notifier.notify(Toast::success("Account created successfully!"));
                Ok(())
            }
            Err(e) => Err(self.report_failure("sign-up", e)),
        }
    }

    async fn sign_up_inner(&self, email: &str, password: &str, name: &str) -> Result<ProviderUser, AuthError> {
        let email = validate_email(email)?;
        validate_password(password)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthError::InvalidInput("name".into()));
        }
        self.provider.create_user(&email, password).await?;
        self.provider.update_profile(name).await
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns the classified provider error; the session is unchanged.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let result = match (validate_email(email), validate_password(password)) {
            (Ok(email), Ok(())) => self.provider.sign_in(&email, password).await,
            (Err(e), _) | (_, Err(e)) => Err(e),
        };
        match result {
            Ok(user) => {
                info!(realm = self.realm.as_str(), uid = %user.uid, "signed in");
                self.set_user(Some(Session::from(user)));
                self.notifier.notify(Toast::success("Signed in successfully!"));
                Ok(())
            }
            Err(e) => Err(self.report_failure("sign-in", e)),
        }
    }

    /// Sign out. The local session is cleared whether or not the provider
    /// call succeeds.
    ///
    /// # Errors
    ///
    /// Returns the classified provider error after clearing the session.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let result = self.provider.sign_out().await;
        self.set_user(None);
        match result {
            Ok(()) => {
                info!(realm = self.realm.as_str(), "signed out");
                self.notifier.notify(Toast::success("Signed out successfully."));
                Ok(())
            }
            Err(e) => Err(self.report_failure("sign-out", e)),
        }
    }

    pub(crate) fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }

    /// Replace the token of the current session if `user_id` is still the
    /// signed-in user. Returns whether the session was updated.
    pub(crate) fn apply_token(&self, user_id: &str, token: IdToken) -> bool {
        self.state.send_if_modified(|snapshot| match snapshot.user.as_mut() {
            Some(session) if session.user_id == user_id => {
                session.token = token.token;
                session.token_expiry = token.expires_at;
                true
            }
            _ => false,
        })
    }

    /// Run `hook` with the new user id whenever the signed-in user changes
    /// (sign-in, sign-out, switch). Token rotation is not a change.
    ///
    /// Hooks run before subscribers observe the new snapshot, while it is
    /// still locked, so they must not call back into this manager.
    pub fn on_user_change<F>(&self, hook: F)
    where
        F: Fn(Option<&str>) + Send + Sync + 'static,
    {
        self.user_change.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(Arc::new(hook));
    }

    fn set_user(&self, user: Option<Session>) {
        publish_user(&self.state, &self.user_change, user, false);
    }

    fn report_failure(&self, op: &'static str, err: AuthError) -> AuthError {
        warn!(realm = self.realm.as_str(), op, error = %err, "auth operation failed");
        self.notifier.notify(Toast::error(err.user_message()));
        err
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn listen(
    realm: Realm,
    mut rx: watch::Receiver<ProviderState>,
    state: Arc<watch::Sender<SessionSnapshot>>,
    hooks: UserChangeHooks,
) {
    loop {
        let delivered = rx.borrow_and_update().clone();
        apply_provider_state(&state, &hooks, delivered);
        if rx.changed().await.is_err() {
            debug!(realm = realm.as_str(), "provider state stream closed");
            break;
        }
    }
}

/// Fold one provider delivery into the snapshot. `Pending` is ignored; any
/// other delivery resolves `loading`.
fn apply_provider_state(
    state: &watch::Sender<SessionSnapshot>,
    hooks: &Mutex<Vec<UserChangeHook>>,
    delivered: ProviderState,
) {
    let user = match delivered {
        ProviderState::Pending => return,
        ProviderState::SignedOut => None,
        ProviderState::SignedIn(user) => Some(Session::from(user)),
    };
    publish_user(state, hooks, user, true);
}

/// Store `user` in the snapshot; `resolve` also ends `loading`. Publishes
/// only if something changed.
fn publish_user(
    state: &watch::Sender<SessionSnapshot>,
    hooks: &Mutex<Vec<UserChangeHook>>,
    user: Option<Session>,
    resolve: bool,
) {
    state.send_if_modified(|snapshot| {
        let first_delivery = resolve && snapshot.loading;
        if resolve {
            snapshot.loading = false;
        }
        if snapshot.user == user {
            return first_delivery;
        }
        let next_id = user.as_ref().map(|s| s.user_id.as_str());
        if snapshot.user.as_ref().map(|s| s.user_id.as_str()) != next_id {
            let hooks: Vec<UserChangeHook> = hooks.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone();
            for hook in &hooks {
                hook(next_id);
            }
        }
        snapshot.user = user;
        true
    });
}

fn validate_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim();
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty() => Ok(email.to_owned()),
        _ => Err(AuthError::InvalidInput("email".into())),
    }
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.is_empty() {
        return Err(AuthError::InvalidInput("password".into()));
    }
    Ok(())
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
