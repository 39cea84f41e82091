//! Error taxonomy shared by the session, cache, and data-access layers.
//!
//! DESIGN
//! ======
//! Provider failures are classified once, at the provider boundary, into
//! [`AuthError`]. Everything above that boundary matches on variants and
//! never inspects raw provider codes.

// =============================================================================
// AUTH ERROR
// =============================================================================

/// Classified identity-provider failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// An account already exists for the email.
    #[error("email already in use")]
    AlreadyInUse,
    /// The password does not satisfy the provider's strength policy.
    #[error("weak credential")]
    WeakCredential,
    /// Wrong email/password pair, unknown user, or disabled account.
    #[error("invalid credential")]
    InvalidCredential,
    /// The provider throttled the caller.
    #[error("rate limited")]
    RateLimited,
    /// A required field was empty or malformed before contacting the provider.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Anything the classifier does not recognize.
    #[error("auth error: {0}")]
    Unknown(String),
}

impl AuthError {
    /// Classify a provider error code (e.g. `EMAIL_EXISTS`,
    /// `auth/email-already-in-use`).
    ///
    /// REST codes may carry a suffix (`WEAK_PASSWORD : Password should be at
    /// least 6 characters`), so only the leading token is matched.
    #[must_use]
    pub fn from_provider_code(code: &str) -> Self {
        let head = code.split([':', ' ']).next().unwrap_or_default().trim();
        match head {
            "EMAIL_EXISTS" | "auth/email-already-in-use" => Self::AlreadyInUse,
            "WEAK_PASSWORD" | "auth/weak-password" => Self::WeakCredential,
            "INVALID_PASSWORD"
            | "INVALID_LOGIN_CREDENTIALS"
            | "EMAIL_NOT_FOUND"
            | "USER_DISABLED"
            | "INVALID_EMAIL"
            | "auth/invalid-credential"
            | "auth/wrong-password"
            | "auth/user-not-found"
            | "auth/user-disabled"
            | "auth/invalid-email" => Self::InvalidCredential,
            "TOO_MANY_ATTEMPTS_TRY_LATER" | "auth/too-many-requests" => Self::RateLimited,
            _ => Self::Unknown(code.to_owned()),
        }
    }

    /// Message suitable for display in a toast.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::AlreadyInUse => "This email is already registered. Please sign in instead.".into(),
            Self::WeakCredential => "Password is too weak. Use at least 6 characters.".into(),
            Self::InvalidCredential => "Invalid email or password.".into(),
            Self::RateLimited => "Too many attempts. Please try again later.".into(),
            Self::InvalidInput(field) => format!("Please provide a valid {field}."),
            Self::Unknown(_) => "Something went wrong. Please try again.".into(),
        }
    }
}

// =============================================================================
// NETWORK ERROR
// =============================================================================

/// Transport-level failure talking to a remote service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    /// Timeouts, connection resets, 429 and 5xx responses.
    #[error("transient network error: {0}")]
    Transient(String),
    /// Everything else: 4xx responses, malformed bodies.
    #[error("network error: {0}")]
    Permanent(String),
}

impl NetworkError {
    /// Classify a non-success HTTP status.
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = format!("status {status}: {body}");
        if status == 429 || status >= 500 {
            Self::Transient(detail)
        } else {
            Self::Permanent(detail)
        }
    }

    /// Classify a `reqwest` send/read failure.
    #[must_use]
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Self::Transient(err.to_string())
        } else {
            Self::Permanent(err.to_string())
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

// =============================================================================
// VALIDATION ERROR
// =============================================================================

/// Caller attempted an operation its session does not allow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("user not authenticated")]
    Unauthenticated,
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

// =============================================================================
// QUERY ERROR
// =============================================================================

/// Error surfaced by cache queries and mutations.
///
/// `Clone` is required because one in-flight fetch resolves every caller
/// waiting on the same key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// Cached or fetched data did not have the expected shape.
    #[error("decode failed: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
