use super::*;
use crate::context::test_helpers::MockProvider;
use crate::notify::ToastLog;
use crate::services::session::Realm;

const THRESHOLD: Duration = Duration::from_secs(300);
const INTERVAL: Duration = Duration::from_secs(60);

async fn signed_in(token_ttl: time::Duration) -> (Arc<MockProvider>, Arc<SessionManager>) {
    let provider = Arc::new(MockProvider::signed_out().with_account("ada@example.com", "secret1", "uid-ada"));
    provider.set_token_ttl(token_ttl);
    let session = Arc::new(SessionManager::new(Realm::User, provider.clone(), Arc::new(ToastLog::new())));
    session.sign_in("ada@example.com", "secret1").await.unwrap();
    (provider, session)
}

// =============================================================================
// check_once
// =============================================================================

#[tokio::test]
async fn no_session_makes_no_call() {
    let provider = Arc::new(MockProvider::signed_out());
    let session = Arc::new(SessionManager::new(Realm::User, provider.clone(), Arc::new(ToastLog::new())));
    let refresher = TokenRefresher::new(session, THRESHOLD);

    assert_eq!(refresher.check_once().await, RefreshOutcome::NoSession);
    assert_eq!(provider.refresh_calls(), 0);
}

#[tokio::test]
async fn ample_lifetime_makes_no_call() {
    let (provider, session) = signed_in(time::Duration::hours(1)).await;
    let refresher = TokenRefresher::new(session, THRESHOLD);

    assert_eq!(refresher.check_once().await, RefreshOutcome::Fresh);
    assert_eq!(provider.refresh_calls(), 0);
}

#[tokio::test]
async fn short_lifetime_refreshes_exactly_once_per_check() {
    let (provider, session) = signed_in(time::Duration::minutes(1)).await;
    let before = session.token().unwrap();
    let refresher = TokenRefresher::new(session.clone(), THRESHOLD);

    assert_eq!(refresher.check_once().await, RefreshOutcome::Refreshed);
    assert_eq!(provider.refresh_calls(), 1);
    assert_ne!(session.token().unwrap(), before);

    // Minted tokens keep the short lifetime, so the next check refreshes again.
    assert_eq!(refresher.check_once().await, RefreshOutcome::Refreshed);
    assert_eq!(provider.refresh_calls(), 2);
}

#[tokio::test]
async fn expired_token_is_refreshed() {
    let (provider, session) = signed_in(time::Duration::seconds(-30)).await;
    let refresher = TokenRefresher::new(session, THRESHOLD);

    assert_eq!(refresher.check_once().await, RefreshOutcome::Refreshed);
    assert_eq!(provider.refresh_calls(), 1);
}

#[tokio::test]
async fn failed_refresh_keeps_session_and_retries_next_check() {
    let (provider, session) = signed_in(time::Duration::minutes(1)).await;
    let before = session.current_user().unwrap();
    provider.set_fail_refresh(true);
    let refresher = TokenRefresher::new(session.clone(), THRESHOLD);

    assert_eq!(refresher.check_once().await, RefreshOutcome::Failed);
    assert_eq!(session.current_user(), Some(before));

    provider.set_fail_refresh(false);
    assert_eq!(refresher.check_once().await, RefreshOutcome::Refreshed);
    assert_eq!(provider.refresh_calls(), 2);
}

// =============================================================================
// spawn / RefreshHandle
// =============================================================================

#[tokio::test(start_paused = true)]
async fn loop_refreshes_once_per_tick_until_cancelled() {
    let (provider, session) = signed_in(time::Duration::minutes(1)).await;
    let mut handle = TokenRefresher::new(session, THRESHOLD).spawn(INTERVAL);
    assert!(handle.is_active());

    // Ticks at 0s, 60s, 120s.
    tokio::time::sleep(Duration::from_secs(150)).await;
    assert_eq!(provider.refresh_calls(), 3);

    handle.cancel();
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(provider.refresh_calls(), 3);
    assert!(!handle.is_active());
}

#[tokio::test(start_paused = true)]
async fn loop_with_ample_lifetime_never_refreshes() {
    let (provider, session) = signed_in(time::Duration::hours(2)).await;
    let _handle = TokenRefresher::new(session, THRESHOLD).spawn(INTERVAL);

    tokio::time::sleep(Duration::from_secs(250)).await;
    assert_eq!(provider.refresh_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn dropping_handle_stops_loop() {
    let (provider, session) = signed_in(time::Duration::minutes(1)).await;
    let handle = TokenRefresher::new(session, THRESHOLD).spawn(INTERVAL);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(provider.refresh_calls(), 1);

    drop(handle);
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(provider.refresh_calls(), 1);
}
