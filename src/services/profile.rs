//! Current user's profile: cached read plus write-through update.

use std::sync::Arc;

use super::session::SessionManager;
use crate::cache::{CachePatch, Mutation, QueryCache, QueryKey, QueryOptions};
use crate::error::{QueryError, ValidationError};
use crate::models::{Profile, ProfileUpdate};
use crate::store::{Filter, RemoteStore, SelectQuery};

pub const PROFILES_TABLE: &str = "profiles";

pub struct ProfileService {
    store: Arc<dyn RemoteStore>,
    session: Arc<SessionManager>,
    cache: QueryCache,
    update: Mutation<ProfileUpdate, Profile>,
}

impl ProfileService {
    #[must_use]
    pub fn new(store: Arc<dyn RemoteStore>, session: Arc<SessionManager>, cache: QueryCache) -> Self {
        let update = {
            let store = Arc::clone(&store);
            let session = Arc::clone(&session);
            cache.mutation(
                move |update: ProfileUpdate| {
                    let store = Arc::clone(&store);
                    let session = Arc::clone(&session);
                    async move { write_profile(store.as_ref(), &session, update).await }
                },
                |profile: &Profile| vec![CachePatch::ReplaceProfile { profile: profile.clone() }],
            )
        };
        Self { store, session, cache, update }
    }

    /// Profile row of the signed-in user, `None` if it was never created.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::Unauthenticated` without a session, or the
    /// fetch error.
    pub async fn profile(&self) -> Result<Option<Profile>, QueryError> {
        let current = self.session.current_user().ok_or(ValidationError::Unauthenticated)?;
        let store = Arc::clone(&self.store);
        let key = QueryKey::profile(&current.user_id);
        let user_id = current.user_id.clone();
        self.cache
            .query(
                key,
                move || async move { fetch_profile(store.as_ref(), &user_id, &current.token).await },
                QueryOptions::default(),
            )
            .await
    }

    /// Apply `update` to the signed-in user's profile, creating the row if
    /// it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::Empty` for an update with no fields,
    /// `ValidationError::Unauthenticated` without a session, or the store's
    /// error.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Profile, QueryError> {
        if update == ProfileUpdate::default() {
            return Err(ValidationError::Empty("profile update").into());
        }
        self.update.mutate_async(update).await
    }

    #[must_use]
    pub fn is_updating(&self) -> bool {
        self.update.is_pending()
    }
}

async fn fetch_profile(store: &dyn RemoteStore, user_id: &str, token: &str) -> Result<Option<Profile>, QueryError> {
    let query = SelectQuery { limit: Some(1), ..SelectQuery::default() }.filter(Filter::eq("id", user_id));
    let result = store.select(PROFILES_TABLE, &query, Some(token)).await?;
    match result.rows.into_iter().next() {
        Some(row) => Ok(Some(serde_json::from_value(row)?)),
        None => Ok(None),
    }
}

async fn write_profile(store: &dyn RemoteStore, session: &SessionManager, update: ProfileUpdate) -> Result<Profile, QueryError> {
    let current = session.current_user().ok_or(ValidationError::Unauthenticated)?;
    let patch = serde_json::to_value(&update)?;
    let filters = [Filter::eq("id", current.user_id.as_str())];
    let updated = store.update(PROFILES_TABLE, &filters, patch.clone(), Some(&current.token)).await?;
    if let Some(row) = updated.into_iter().next() {
        return Ok(serde_json::from_value(row)?);
    }

    let mut row = patch;
    if let Some(fields) = row.as_object_mut() {
        fields.insert("id".into(), current.user_id.clone().into());
        fields.insert("email".into(), current.email.clone().into());
        if !fields.contains_key("display_name") {
            fields.insert("display_name".into(), current.display_name.clone().into());
        }
    } else {
        return Err(QueryError::Decode("profile update is not an object".into()));
    }
    let created = store.insert(PROFILES_TABLE, row, Some(&current.token)).await?;
    Ok(serde_json::from_value(created)?)
}

#[cfg(test)]
#[path = "profile_test.rs"]
mod tests;
