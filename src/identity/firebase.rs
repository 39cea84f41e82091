//! Firebase Auth REST client.
//!
//! Thin HTTP wrapper over the Identity Toolkit (`accounts:*`) and Secure
//! Token endpoints. Pure parsing lives in `parse_*` functions for
//! testability; the client itself only sequences requests and publishes
//! state changes.

use std::sync::Mutex;
use std::time::Duration;

use serde::Deserialize;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, info};

use super::{IdToken, IdentityProvider, ProviderState, ProviderUser};
use crate::config::{FirebaseConfig, HttpTimeouts};
use crate::error::AuthError;

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

// =============================================================================
// CLIENT
// =============================================================================

struct CurrentUser {
    user: ProviderUser,
    refresh_token: String,
}

pub struct FirebaseProvider {
    http: reqwest::Client,
    api_key: String,
    identity_toolkit_url: String,
    secure_token_url: String,
    current: Mutex<Option<CurrentUser>>,
    state: watch::Sender<ProviderState>,
}

impl FirebaseProvider {
    /// Build a provider for one realm.
    ///
    /// The REST client keeps no persisted credentials, so the initial state
    /// resolves to `SignedOut` immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &FirebaseConfig, timeouts: HttpTimeouts) -> Result<Self, AuthError> {
        Self::with_base_urls(config, timeouts, IDENTITY_TOOLKIT_URL, SECURE_TOKEN_URL)
    }

    /// Build a provider against non-default endpoints (emulators, stubs).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn with_base_urls(
        config: &FirebaseConfig,
        timeouts: HttpTimeouts,
        identity_toolkit_url: &str,
        secure_token_url: &str,
    ) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| AuthError::Unknown(format!("http client build failed: {e}")))?;
        let (state, _) = watch::channel(ProviderState::SignedOut);
        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            identity_toolkit_url: identity_toolkit_url.trim_end_matches('/').to_owned(),
            secure_token_url: secure_token_url.to_owned(),
            current: Mutex::new(None),
            state,
        })
    }

    async fn post_accounts(&self, method: &str, body: serde_json::Value) -> Result<String, AuthError> {
        let url = format!("{}/accounts:{method}", self.identity_toolkit_url);
        let response = self
            .http
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Unknown(e.to_string()))?;
        read_body(response).await
    }

    fn establish(&self, user: ProviderUser, refresh_token: String) {
        let mut current = self.current.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *current = Some(CurrentUser { user: user.clone(), refresh_token });
        drop(current);
        self.state.send_replace(ProviderState::SignedIn(user));
    }

    /// Replace the current user only if it is still the one a request was
    /// issued for. A sign-out or user switch while the request was in flight
    /// wins over the late response.
    fn establish_if_current(
        &self,
        uid: &str,
        refresh_token_used: &str,
        user: ProviderUser,
        refresh_token: String,
    ) -> Result<(), AuthError> {
        let mut current = self.current.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let unchanged = current.as_ref().is_some_and(|c| c.user.uid == uid && c.refresh_token == refresh_token_used);
        if !unchanged {
            drop(current);
            debug!(uid, "session changed during request; response discarded");
            return Err(AuthError::Unknown("session changed during request".into()));
        }
        *current = Some(CurrentUser { user: user.clone(), refresh_token });
        drop(current);
        self.state.send_replace(ProviderState::SignedIn(user));
        Ok(())
    }

    fn current_credentials(&self) -> Result<(ProviderUser, String), AuthError> {
        let current = self.current.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        current
            .as_ref()
            .map(|c| (c.user.clone(), c.refresh_token.clone()))
            .ok_or_else(|| AuthError::Unknown("no signed-in user".into()))
    }
}

async fn read_body(response: reqwest::Response) -> Result<String, AuthError> {
    let status = response.status();
    let text = response.text().await.map_err(|e| AuthError::Unknown(e.to_string()))?;
    if status.is_success() {
        Ok(text)
    } else {
        Err(parse_error(status.as_u16(), &text))
    }
}

#[async_trait::async_trait]
impl IdentityProvider for FirebaseProvider {
    async fn create_user(&self, email: &str, password: &str) -> Result<ProviderUser, AuthError> {
        let body = serde_json::json!({ "email": email, "password": password, "returnSecureToken": true });
        let text = self.post_accounts("signUp", body).await?;
        let (user, refresh_token) = parse_auth_response(&text, OffsetDateTime::now_utc())?;
        info!(uid = %user.uid, "firebase account created");
        self.establish(user.clone(), refresh_token);
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<ProviderUser, AuthError> {
        let body = serde_json::json!({ "email": email, "password": password, "returnSecureToken": true });
        let text = self.post_accounts("signInWithPassword", body).await?;
        let (user, refresh_token) = parse_auth_response(&text, OffsetDateTime::now_utc())?;
        debug!(uid = %user.uid, "firebase sign-in");
        self.establish(user.clone(), refresh_token);
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let mut current = self.current.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *current = None;
        drop(current);
        self.state.send_replace(ProviderState::SignedOut);
        Ok(())
    }

    async fn update_profile(&self, display_name: &str) -> Result<ProviderUser, AuthError> {
        let (user, refresh_token) = self.current_credentials()?;
        let body = serde_json::json!({
            "idToken": user.id_token,
            "displayName": display_name,
            "returnSecureToken": false,
        });
        let text = self.post_accounts("update", body).await?;
        let uid = user.uid.clone();
        let updated = parse_update_response(&text, user)?;
        self.establish_if_current(&uid, &refresh_token, updated.clone(), refresh_token.clone())?;
        Ok(updated)
    }

    async fn refresh_token(&self) -> Result<IdToken, AuthError> {
        let (user, refresh_token) = self.current_credentials()?;
        let response = self
            .http
            .post(self.secure_token_url.as_str())
            .query(&[("key", self.api_key.as_str())])
            .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token.as_str())])
            .send()
            .await
            .map_err(|e| AuthError::Unknown(e.to_string()))?;
        let text = read_body(response).await?;
        let (token, rotated) = parse_refresh_response(&text, OffsetDateTime::now_utc())?;
        let uid = user.uid.clone();
        let refreshed = ProviderUser { id_token: token.token.clone(), expires_at: token.expires_at, ..user };
        self.establish_if_current(&uid, &refresh_token, refreshed, rotated)?;
        Ok(token)
    }

    fn subscribe(&self) -> watch::Receiver<ProviderState> {
        self.state.subscribe()
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    local_id: String,
    email: String,
    #[serde(default)]
    display_name: Option<String>,
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateResponse {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

// =============================================================================
// PARSING
// =============================================================================

fn expiry_from(expires_in: Option<&str>, now: OffsetDateTime) -> OffsetDateTime {
    let secs = expires_in
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    now + time::Duration::seconds(secs)
}

fn parse_auth_response(json: &str, now: OffsetDateTime) -> Result<(ProviderUser, String), AuthError> {
    let api: AuthResponse =
        serde_json::from_str(json).map_err(|e| AuthError::Unknown(format!("unexpected response: {e}")))?;
    let user = ProviderUser {
        uid: api.local_id,
        email: api.email,
        display_name: api.display_name.filter(|n| !n.is_empty()),
        id_token: api.id_token,
        expires_at: expiry_from(api.expires_in.as_deref(), now),
    };
    Ok((user, api.refresh_token))
}

fn parse_update_response(json: &str, previous: ProviderUser) -> Result<ProviderUser, AuthError> {
    let api: UpdateResponse =
        serde_json::from_str(json).map_err(|e| AuthError::Unknown(format!("unexpected response: {e}")))?;
    Ok(ProviderUser {
        display_name: api.display_name.filter(|n| !n.is_empty()).or(previous.display_name),
        email: api.email.unwrap_or(previous.email),
        ..previous
    })
}

fn parse_refresh_response(json: &str, now: OffsetDateTime) -> Result<(IdToken, String), AuthError> {
    let api: RefreshResponse =
        serde_json::from_str(json).map_err(|e| AuthError::Unknown(format!("unexpected response: {e}")))?;
    let token = IdToken { token: api.id_token, expires_at: expiry_from(Some(&api.expires_in), now) };
    Ok((token, api.refresh_token))
}

fn parse_error(status: u16, body: &str) -> AuthError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => AuthError::from_provider_code(&envelope.error.message),
        Err(_) if status == 429 => AuthError::RateLimited,
        Err(_) => AuthError::Unknown(format!("status {status}: {body}")),
    }
}

#[cfg(test)]
#[path = "firebase_test.rs"]
mod tests;
