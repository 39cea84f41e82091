use std::time::Duration;

use futures::FutureExt;
use time::OffsetDateTime;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::*;
use crate::cache::QueryOptions;
use crate::error::{NetworkError, ValidationError};
use crate::models::{Message, MessagePage, MessageRole};

fn saved(project_id: &str, content: &str) -> Message {
    Message {
        id: Uuid::new_v4(),
        project_id: project_id.into(),
        user_id: "uid-ada".into(),
        role: MessageRole::User,
        content: content.into(),
        created_at: OffsetDateTime::now_utc(),
    }
}

fn append_mutation(cache: &QueryCache) -> Mutation<String, Message> {
    cache
        .mutation(
            |content: String| async move {
                if content == "fail" {
                    return Err(QueryError::Network(NetworkError::Transient("connection reset".into())));
                }
                Ok(saved("p1", &content))
            },
            |message: &Message| vec![CachePatch::AppendMessage { message: message.clone() }],
        )
        .affecting(|_: &String| vec![QueryKey::messages("p1")])
}

fn seeded_cache() -> QueryCache {
    let cache = QueryCache::new(Duration::from_secs(30));
    cache.set_query_data(QueryKey::messages("p1"), &MessagePage::default()).unwrap();
    cache
}

#[tokio::test]
async fn success_applies_patch_before_returning() {
    let cache = seeded_cache();
    let mutation = append_mutation(&cache);

    let message = mutation.mutate_async("hello".into()).await.unwrap();

    let page: MessagePage = cache.get_query_data(&QueryKey::messages("p1")).unwrap();
    assert_eq!(page.messages, vec![message]);
    assert_eq!(page.total_count, 1);
    assert!(mutation.error().is_none());
}

#[tokio::test]
async fn failure_leaves_cache_untouched_and_records_error() {
    let cache = seeded_cache();
    let mutation = append_mutation(&cache);

    let err = mutation.mutate_async("fail".into()).await.unwrap_err();

    assert!(matches!(err, QueryError::Network(_)));
    assert_eq!(mutation.error(), Some(err));
    let page: MessagePage = cache.get_query_data(&QueryKey::messages("p1")).unwrap();
    assert_eq!(page, MessagePage::default());
}

#[tokio::test]
async fn new_call_clears_previous_error() {
    let cache = seeded_cache();
    let mutation = append_mutation(&cache);
    mutation.mutate_async("fail".into()).await.unwrap_err();

    mutation.mutate_async("ok".into()).await.unwrap();
    assert!(mutation.error().is_none());
}

#[tokio::test]
async fn pending_is_tracked_on_mutation_and_keys() {
    let cache = seeded_cache();
    let (tx, rx) = oneshot::channel::<()>();
    let rx = rx.shared();
    let mutation: Mutation<(), ()> = cache
        .mutation(
            move |()| {
                let rx = rx.clone();
                async move {
                    let _ = rx.await;
                    Ok(())
                }
            },
            |_: &()| Vec::new(),
        )
        .affecting(|_: &()| vec![QueryKey::messages("p1")]);

    let call = mutation.mutate_async(());
    tokio::pin!(call);
    assert!(futures::poll!(&mut call).is_pending());
    assert!(mutation.is_pending());
    assert_eq!(cache.pending_mutations(&QueryKey::messages("p1")), 1);

    tx.send(()).unwrap();
    call.await.unwrap();
    assert!(!mutation.is_pending());
    assert_eq!(cache.pending_mutations(&QueryKey::messages("p1")), 0);
}

#[tokio::test]
async fn dropped_call_releases_pending() {
    let cache = seeded_cache();
    let mutation: Mutation<(), ()> = cache
        .mutation(|()| futures::future::pending::<Result<(), QueryError>>(), |_: &()| Vec::new())
        .affecting(|_: &()| vec![QueryKey::messages("p1")]);

    {
        let call = mutation.mutate_async(());
        tokio::pin!(call);
        assert!(futures::poll!(&mut call).is_pending());
        assert!(mutation.is_pending());
    }

    assert!(!mutation.is_pending());
    assert_eq!(cache.pending_mutations(&QueryKey::messages("p1")), 0);
}

#[tokio::test]
async fn validation_error_passes_through() {
    let cache = seeded_cache();
    let mutation: Mutation<(), ()> =
        cache.mutation(|()| async { Err(QueryError::Validation(ValidationError::Unauthenticated)) }, |_: &()| Vec::new());

    let err = mutation.mutate_async(()).await.unwrap_err();
    assert_eq!(err, QueryError::Validation(ValidationError::Unauthenticated));
}

#[tokio::test]
async fn refetch_in_flight_during_mutation_keeps_patch() {
    let cache = seeded_cache();
    let key = QueryKey::messages("p1");
    cache.invalidate(&key);
    let mutation = append_mutation(&cache);
    let (release, released) = oneshot::channel::<()>();

    let refetch = cache.query(
        key.clone(),
        move || async move {
            let _ = released.await;
            Ok::<_, QueryError>(MessagePage::default())
        },
        QueryOptions::default(),
    );
    tokio::pin!(refetch);
    assert!(futures::poll!(&mut refetch).is_pending());

    let message = mutation.mutate_async("hello".into()).await.unwrap();
    release.send(()).unwrap();
    refetch.await.unwrap();

    let page: MessagePage = cache.get_query_data(&key).unwrap();
    assert_eq!(page.messages, vec![message]);
    assert_eq!(page.total_count, 1);
    assert!(!cache.state::<MessagePage>(&key).is_fetching);
}
