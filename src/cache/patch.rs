//! Typed optimistic cache patches.
//!
//! Each mutation kind has one reducer here. Reducers only ever extend or
//! replace what a fresh fetch would return for the same key; they never
//! invent entries that were not fetched.

use std::collections::HashMap;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{CacheEntry, QueryKey};
use crate::error::QueryError;
use crate::models::{Message, MessagePage, Profile};

/// Mutable view of the cache entries, handed to reducers under the lock.
pub struct CacheSnapshot<'a> {
    entries: &'a mut HashMap<QueryKey, CacheEntry>,
}

impl<'a> CacheSnapshot<'a> {
    pub(super) fn new(entries: &'a mut HashMap<QueryKey, CacheEntry>) -> Self {
        Self { entries }
    }

    /// Decoded value of `key`, or `None` if nothing has been fetched.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Decode` if the cached value is not a `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &QueryKey) -> Result<Option<T>, QueryError> {
        match self.entries.get(key).and_then(|e| e.value.as_ref()) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Overwrite the value of an entry that already holds data. Freshness is
    /// left as it was.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Decode` if `data` does not serialize.
    pub fn put<T: Serialize>(&mut self, key: &QueryKey, data: &T) -> Result<bool, QueryError> {
        let value = serde_json::to_value(data)?;
        match self.entries.get_mut(key) {
            Some(entry) if entry.value.is_some() => {
                entry.value = Some(value);
                entry.version += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn invalidate(&mut self, key: &QueryKey) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.updated_at = None;
        }
    }
}

/// One reducer per mutation kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachePatch {
    /// Append a saved message to its project's list and bump `total_count`.
    AppendMessage { message: Message },
    /// Replace a user's cached profile.
    ReplaceProfile { profile: Profile },
}

impl CachePatch {
    /// Entry this patch targets.
    #[must_use]
    pub fn key(&self) -> QueryKey {
        match self {
            Self::AppendMessage { message } => QueryKey::messages(&message.project_id),
            Self::ReplaceProfile { profile } => QueryKey::profile(&profile.id),
        }
    }

    /// Apply to `snapshot`. Returns whether anything changed; a patch for an
    /// entry with no data is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Decode` if the target entry has the wrong shape.
    pub fn apply(&self, snapshot: &mut CacheSnapshot<'_>) -> Result<bool, QueryError> {
        let key = self.key();
        match self {
            Self::AppendMessage { message } => {
                let Some(mut page) = snapshot.get::<MessagePage>(&key)? else {
                    return Ok(false);
                };
                // A refetch that raced the insert may already contain the row.
                if page.messages.iter().any(|m| m.id == message.id) {
                    return Ok(false);
                }
                page.messages.push(message.clone());
                page.total_count += 1;
                snapshot.put(&key, &page)
            }
            Self::ReplaceProfile { profile } => {
                if snapshot.get::<Option<Profile>>(&key)?.is_none() {
                    return Ok(false);
                }
                snapshot.put(&key, &Some(profile))
            }
        }
    }
}

#[cfg(test)]
#[path = "patch_test.rs"]
mod tests;
