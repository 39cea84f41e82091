//! Identity provider capability.
//!
//! SYSTEM CONTEXT
//! ==============
//! The session layer treats the provider as an opaque capability: it never
//! stores passwords, never mints tokens, and learns about user changes only
//! through [`IdentityProvider::subscribe`]. [`firebase::FirebaseProvider`] is
//! the production implementation; tests supply in-memory mocks.

pub mod firebase;

use time::OffsetDateTime;
use tokio::sync::watch;

use crate::error::AuthError;

/// User record as reported by the provider, including its current ID token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderUser {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
    pub id_token: String,
    pub expires_at: OffsetDateTime,
}

/// Freshly minted ID token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

/// Provider-side auth state as seen by subscribers.
///
/// `Pending` is the value before the provider has resolved its persisted
/// state; subscribers must not treat it as "signed out".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProviderState {
    #[default]
    Pending,
    SignedOut,
    SignedIn(ProviderUser),
}

/// Provider-neutral async trait for the identity service. Enables mocking in tests.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an email/password account and sign it in.
    async fn create_user(&self, email: &str, password: &str) -> Result<ProviderUser, AuthError>;

    /// Sign in with email and password.
    async fn sign_in(&self, email: &str, password: &str) -> Result<ProviderUser, AuthError>;

    /// Sign the current user out.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Set the current user's display name.
    async fn update_profile(&self, display_name: &str) -> Result<ProviderUser, AuthError>;

    /// Mint a new ID token for the current user.
    async fn refresh_token(&self) -> Result<IdToken, AuthError>;

    /// Subscribe to state changes. The receiver's current value is the
    /// latest known state; dropping it unsubscribes.
    fn subscribe(&self) -> watch::Receiver<ProviderState>;
}
