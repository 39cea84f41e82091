use super::*;

// =============================================================================
// AuthError::from_provider_code
// =============================================================================

#[test]
fn classify_already_in_use() {
    assert_eq!(AuthError::from_provider_code("EMAIL_EXISTS"), AuthError::AlreadyInUse);
    assert_eq!(AuthError::from_provider_code("auth/email-already-in-use"), AuthError::AlreadyInUse);
}

#[test]
fn classify_weak_password_with_suffix() {
    let err = AuthError::from_provider_code("WEAK_PASSWORD : Password should be at least 6 characters");
    assert_eq!(err, AuthError::WeakCredential);
}

#[test]
fn classify_invalid_credential_variants() {
    for code in ["INVALID_PASSWORD", "EMAIL_NOT_FOUND", "INVALID_LOGIN_CREDENTIALS", "auth/wrong-password"] {
        assert_eq!(AuthError::from_provider_code(code), AuthError::InvalidCredential, "code {code}");
    }
}

#[test]
fn classify_rate_limited() {
    let err = AuthError::from_provider_code("TOO_MANY_ATTEMPTS_TRY_LATER : Access disabled");
    assert_eq!(err, AuthError::RateLimited);
}

#[test]
fn classify_unknown_keeps_raw_code() {
    assert_eq!(AuthError::from_provider_code("QUOTA_EXCEEDED"), AuthError::Unknown("QUOTA_EXCEEDED".into()));
}

#[test]
fn user_messages_are_distinct() {
    let errs = [
        AuthError::AlreadyInUse,
        AuthError::WeakCredential,
        AuthError::InvalidCredential,
        AuthError::RateLimited,
        AuthError::Unknown("x".into()),
    ];
    let mut messages: Vec<String> = errs.iter().map(AuthError::user_message).collect();
    messages.sort();
    messages.dedup();
    assert_eq!(messages.len(), errs.len());
}

#[test]
fn invalid_input_message_names_field() {
    assert!(AuthError::InvalidInput("email".into()).user_message().contains("email"));
}

// =============================================================================
// NetworkError::from_status
// =============================================================================

#[test]
fn status_429_and_5xx_are_transient() {
    assert!(NetworkError::from_status(429, "").is_transient());
    assert!(NetworkError::from_status(503, "").is_transient());
}

#[test]
fn status_4xx_is_permanent() {
    let err = NetworkError::from_status(404, "not found");
    assert!(!err.is_transient());
    assert!(err.to_string().contains("404"));
}

// =============================================================================
// QueryError conversions
// =============================================================================

#[test]
fn query_error_from_validation_is_transparent() {
    let err: QueryError = ValidationError::Unauthenticated.into();
    assert_eq!(err.to_string(), "user not authenticated");
}

#[test]
fn query_error_from_serde() {
    let serde_err = serde_json::from_str::<u32>("\"nope\"").unwrap_err();
    let err: QueryError = serde_err.into();
    assert!(matches!(err, QueryError::Decode(_)));
}
