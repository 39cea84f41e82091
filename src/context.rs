//! Application context.
//!
//! DESIGN
//! ======
//! `AppContext` is the single owner of the long-lived client services: the
//! end-user and back-office session managers, the shared query cache, the
//! data-access services built on it, the consent store, and one token
//! refresh loop per realm. Everything that needs a session or the cache
//! receives it from here rather than reaching for globals.
//!
//! LIFECYCLE
//! =========
//! [`AppContext::init`] must run inside a tokio runtime: it starts the
//! provider listeners and refresh loops. [`AppContext::dispose`] stops all of
//! them and is also run on drop. Cached entries are not keyed by user, so
//! the cache is cleared whenever the signed-in end user changes.

use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::cache::QueryCache;
use crate::config::{Config, SessionConfig};
use crate::error::{AuthError, NetworkError};
use crate::identity::IdentityProvider;
use crate::identity::firebase::FirebaseProvider;
use crate::notify::Notifier;
use crate::services::admin_guard::AdminGuard;
use crate::services::chat::ChatService;
use crate::services::consent::{Consent, ConsentStore, FileStorage, KeyValueStorage, StorageError};
use crate::services::profile::ProfileService;
use crate::services::refresh::{RefreshHandle, TokenRefresher};
use crate::services::session::{Realm, SessionManager};
use crate::store::RemoteStore;
use crate::store::supabase::SupabaseStore;

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("missing configuration: {0}")]
    MissingConfig(&'static str),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// External capabilities the context is wired to.
pub struct Dependencies {
    pub user_provider: Arc<dyn IdentityProvider>,
    pub admin_provider: Arc<dyn IdentityProvider>,
    pub store: Arc<dyn RemoteStore>,
    pub notifier: Arc<dyn Notifier>,
    pub storage: Arc<dyn KeyValueStorage>,
}

pub struct AppContext {
    session: Arc<SessionManager>,
    admin: Arc<SessionManager>,
    cache: QueryCache,
    chat: ChatService,
    profile: ProfileService,
    consent: Mutex<ConsentStore>,
    refresh: Mutex<Vec<RefreshHandle>>,
}

impl AppContext {
    /// Wire the services and start listeners and refresh loops.
    #[must_use]
    pub fn init(config: SessionConfig, deps: Dependencies) -> Self {
        let session = Arc::new(SessionManager::new(Realm::User, deps.user_provider, Arc::clone(&deps.notifier)));
        let admin = Arc::new(SessionManager::new(Realm::Admin, deps.admin_provider, deps.notifier));
        let cache = QueryCache::new(config.stale_time);
        session.on_user_change({
            let cache = cache.clone();
            move |user_id: Option<&str>| {
                cache.clear();
                debug!(user_id, "session user changed; cache cleared");
            }
        });
        session.init();
        admin.init();

        let refresh = [&session, &admin]
            .into_iter()
            .map(|manager| {
                TokenRefresher::new(Arc::clone(manager), config.refresh_threshold).spawn(config.refresh_interval)
            })
            .collect();

        let chat = ChatService::new(Arc::clone(&deps.store), Arc::clone(&session), cache.clone());
        let profile = ProfileService::new(deps.store, Arc::clone(&session), cache.clone());
        let consent = ConsentStore::load(deps.storage);

        info!(stale_time_ms = config.stale_time.as_millis(), "app context initialized");
        Self { session, admin, cache, chat, profile, consent: Mutex::new(consent), refresh: Mutex::new(refresh) }
    }

    /// Build production dependencies (Firebase, Supabase, file storage) from
    /// `config` and initialize.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::MissingConfig` if a remote service is not
    /// configured, or the client construction error.
    pub fn from_config(config: &Config, notifier: Arc<dyn Notifier>) -> Result<Self, ContextError> {
        let firebase = config.firebase.as_ref().ok_or(ContextError::MissingConfig("FIREBASE_API_KEY"))?;
        let admin_firebase = config.admin_firebase.as_ref().unwrap_or(firebase);
        let supabase = config
            .supabase
            .as_ref()
            .ok_or(ContextError::MissingConfig("SUPABASE_URL and SUPABASE_ANON_KEY"))?;

        let deps = Dependencies {
            user_provider: Arc::new(FirebaseProvider::new(firebase, config.timeouts)?),
            admin_provider: Arc::new(FirebaseProvider::new(admin_firebase, config.timeouts)?),
            store: Arc::new(SupabaseStore::new(supabase, config.timeouts)?),
            notifier,
            storage: Arc::new(FileStorage::new(&config.consent_file)),
        };
        Ok(Self::init(config.session, deps))
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    #[must_use]
    pub fn admin(&self) -> &Arc<SessionManager> {
        &self.admin
    }

    #[must_use]
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    #[must_use]
    pub fn chat(&self) -> &ChatService {
        &self.chat
    }

    #[must_use]
    pub fn profile(&self) -> &ProfileService {
        &self.profile
    }

    #[must_use]
    pub fn admin_guard(&self) -> AdminGuard {
        AdminGuard::new(Arc::clone(&self.admin))
    }

    /// End-user sign-out. Cached data belongs to the signed-out user, so the
    /// cache is cleared as well.
    ///
    /// # Errors
    ///
    /// Returns the provider error; session and cache are cleared regardless.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let result = self.session.sign_out().await;
        self.cache.clear();
        result
    }

    // =========================================================================
    // CONSENT
    // =========================================================================

    fn consent_store(&self) -> std::sync::MutexGuard<'_, ConsentStore> {
        self.consent.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    #[must_use]
    pub fn consent(&self) -> Option<Consent> {
        self.consent_store().consent()
    }

    #[must_use]
    pub fn needs_consent_prompt(&self) -> bool {
        self.consent_store().needs_prompt()
    }

    /// # Errors
    ///
    /// Returns the storage error if the choice could not be persisted.
    pub fn accept_consent(&self) -> Result<(), StorageError> {
        self.consent_store().accept()
    }

    /// # Errors
    ///
    /// Returns the storage error if the choice could not be persisted.
    pub fn decline_consent(&self) -> Result<(), StorageError> {
        self.consent_store().decline()
    }

    // =========================================================================
    // TEARDOWN
    // =========================================================================

    /// Whether any refresh loop is still running.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.refresh.lock().unwrap_or_else(std::sync::PoisonError::into_inner).iter().any(RefreshHandle::is_active)
    }

    /// Stop refresh loops and provider listeners. Idempotent.
    pub fn dispose(&self) {
        let handles: Vec<RefreshHandle> =
            self.refresh.lock().unwrap_or_else(std::sync::PoisonError::into_inner).drain(..).collect();
        let stopped = handles.len();
        drop(handles);
        self.session.dispose();
        self.admin.dispose();
        if stopped > 0 {
            info!(refresh_loops = stopped, "app context disposed");
        }
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        self.dispose();
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "context_test.rs"]
mod tests;
