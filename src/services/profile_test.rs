use std::time::Duration;

use super::*;
use crate::context::test_helpers::{ADA_EMAIL, ADA_UID, MemoryStore, MockProvider, signed_in_session};
use crate::notify::ToastLog;
use crate::services::session::Realm;

async fn fixture(rows: Vec<serde_json::Value>) -> (Arc<MemoryStore>, QueryCache, ProfileService) {
    let (_provider, session) = signed_in_session().await;
    let store = Arc::new(MemoryStore::new());
    store.seed(PROFILES_TABLE, rows);
    let cache = QueryCache::new(Duration::from_secs(30));
    let service = ProfileService::new(store.clone(), session, cache.clone());
    (store, cache, service)
}

fn ada_row() -> serde_json::Value {
    serde_json::json!({
        "id": ADA_UID,
        "display_name": "Ada",
        "email": ADA_EMAIL,
        "company": "Analytical Engines",
        "avatar_url": null,
        "updated_at": "2026-02-01T09:30:00Z",
    })
}

#[tokio::test]
async fn profile_reads_own_row() {
    let (store, _, service) = fixture(vec![ada_row(), serde_json::json!({"id": "uid-other", "email": "o@x.io"})]).await;

    let profile = service.profile().await.unwrap().unwrap();

    assert_eq!(profile.id, ADA_UID);
    assert_eq!(profile.company.as_deref(), Some("Analytical Engines"));
    assert!(profile.updated_at.is_some());
    assert_eq!(store.select_calls(), 1);
}

#[tokio::test]
async fn missing_profile_is_none_and_cached() {
    let (store, _, service) = fixture(Vec::new()).await;
    assert_eq!(service.profile().await.unwrap(), None);
    assert_eq!(service.profile().await.unwrap(), None);
    assert_eq!(store.select_calls(), 1);
}

#[tokio::test]
async fn profile_requires_session() {
    let provider = Arc::new(MockProvider::signed_out());
    let session = Arc::new(SessionManager::new(Realm::User, provider, Arc::new(ToastLog::new())));
    let store = Arc::new(MemoryStore::new());
    let service = ProfileService::new(store.clone(), session, QueryCache::new(Duration::from_secs(30)));

    let err = service.profile().await.unwrap_err();
    assert_eq!(err, QueryError::Validation(ValidationError::Unauthenticated));
    assert_eq!(store.select_calls(), 0);

    let err = service
        .update_profile(ProfileUpdate { company: Some("x".into()), ..ProfileUpdate::default() })
        .await
        .unwrap_err();
    assert_eq!(err, QueryError::Validation(ValidationError::Unauthenticated));
}

#[tokio::test]
async fn update_writes_through_and_replaces_cached_profile() {
    let (store, cache, service) = fixture(vec![ada_row()]).await;
    service.profile().await.unwrap();

    let update = ProfileUpdate { display_name: Some("Countess".into()), ..ProfileUpdate::default() };
    let updated = service.update_profile(update).await.unwrap();

    assert_eq!(updated.display_name.as_deref(), Some("Countess"));
    assert_eq!(updated.company.as_deref(), Some("Analytical Engines"));
    assert_eq!(cache.get_query_data::<Option<Profile>>(&QueryKey::profile(ADA_UID)), Some(Some(updated.clone())));
    assert_eq!(service.profile().await.unwrap(), Some(updated));
    assert_eq!(store.select_calls(), 1);
    assert!(!service.is_updating());
}

#[tokio::test]
async fn update_creates_missing_row() {
    let (store, _, service) = fixture(Vec::new()).await;
    assert_eq!(service.profile().await.unwrap(), None);

    let update = ProfileUpdate { company: Some("Babbage & Co".into()), ..ProfileUpdate::default() };
    let created = service.update_profile(update).await.unwrap();

    assert_eq!(created.id, ADA_UID);
    assert_eq!(created.email, ADA_EMAIL);
    assert_eq!(created.company.as_deref(), Some("Babbage & Co"));
    assert_eq!(store.rows(PROFILES_TABLE).len(), 1);
    assert_eq!(service.profile().await.unwrap(), Some(created));
}

#[tokio::test]
async fn empty_update_is_rejected() {
    let (store, _, service) = fixture(vec![ada_row()]).await;
    let err = service.update_profile(ProfileUpdate::default()).await.unwrap_err();
    assert_eq!(err, QueryError::Validation(ValidationError::Empty("profile update")));
    assert_eq!(store.rows(PROFILES_TABLE)[0]["display_name"], "Ada");
}

#[tokio::test]
async fn failed_update_keeps_cached_profile() {
    let (store, cache, service) = fixture(vec![ada_row()]).await;
    let before = service.profile().await.unwrap();
    store.set_fail_writes(true);

    let update = ProfileUpdate { display_name: Some("Nope".into()), ..ProfileUpdate::default() };
    assert!(service.update_profile(update).await.is_err());

    assert_eq!(cache.get_query_data::<Option<Profile>>(&QueryKey::profile(ADA_UID)), Some(before));
}
