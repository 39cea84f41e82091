//! Project chat messages: cached list plus write-through save.

use std::sync::Arc;

use tracing::info;

use super::session::SessionManager;
use crate::cache::{CachePatch, Mutation, QueryCache, QueryKey, QueryOptions};
use crate::error::{QueryError, ValidationError};
use crate::models::{Message, MessagePage, MessageRole, NewMessage};
use crate::store::{Direction, Filter, RemoteStore, SelectQuery};

pub const MESSAGES_TABLE: &str = "messages";

pub struct ChatService {
    store: Arc<dyn RemoteStore>,
    session: Arc<SessionManager>,
    cache: QueryCache,
    save: Mutation<NewMessage, Message>,
}

impl ChatService {
    #[must_use]
    pub fn new(store: Arc<dyn RemoteStore>, session: Arc<SessionManager>, cache: QueryCache) -> Self {
        let save = {
            let store = Arc::clone(&store);
            let session = Arc::clone(&session);
            cache
                .mutation(
                    move |new: NewMessage| {
                        let store = Arc::clone(&store);
                        let session = Arc::clone(&session);
                        async move { insert_message(store.as_ref(), &session, new).await }
                    },
                    |message: &Message| vec![CachePatch::AppendMessage { message: message.clone() }],
                )
                .affecting(|new: &NewMessage| vec![QueryKey::messages(&new.project_id)])
        };
        Self { store, session, cache, save }
    }

    /// Messages of `project_id` in creation order.
    ///
    /// # Errors
    ///
    /// Returns a network or decode error from the fetch.
    pub async fn messages(&self, project_id: &str) -> Result<MessagePage, QueryError> {
        let store = Arc::clone(&self.store);
        let token = self.session.token();
        let project_id_owned = project_id.to_owned();
        self.cache
            .query(
                QueryKey::messages(project_id),
                move || async move { fetch_messages(store.as_ref(), &project_id_owned, token.as_deref()).await },
                QueryOptions::default(),
            )
            .await
    }

    /// Store a message and append it to the cached list of its project.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::Unauthenticated` without a session,
    /// `ValidationError::Empty` for blank content, or the store's error. The
    /// cached list is unchanged on error.
    pub async fn save_message(&self, project_id: &str, role: MessageRole, content: &str) -> Result<Message, QueryError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ValidationError::Empty("message").into());
        }
        let new = NewMessage { project_id: project_id.to_owned(), role, content: content.to_owned() };
        self.save.mutate_async(new).await
    }

    #[must_use]
    pub fn is_saving(&self) -> bool {
        self.save.is_pending()
    }

    #[must_use]
    pub fn save_error(&self) -> Option<QueryError> {
        self.save.error()
    }
}

async fn fetch_messages(store: &dyn RemoteStore, project_id: &str, token: Option<&str>) -> Result<MessagePage, QueryError> {
    let query = SelectQuery::default()
        .filter(Filter::eq("project_id", project_id))
        .order_by("created_at", Direction::Asc)
        .with_count();
    let result = store.select(MESSAGES_TABLE, &query, token).await?;
    let messages = result
        .rows
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<Message>, _>>()?;
    let total_count = result.total_count.unwrap_or(messages.len() as u64);
    Ok(MessagePage { messages, total_count })
}

async fn insert_message(store: &dyn RemoteStore, session: &SessionManager, new: NewMessage) -> Result<Message, QueryError> {
    let current = session.current_user().ok_or(ValidationError::Unauthenticated)?;
    let row = serde_json::json!({
        "project_id": new.project_id,
        "user_id": current.user_id,
        "role": new.role,
        "content": new.content,
    });
    let stored = store.insert(MESSAGES_TABLE, row, Some(&current.token)).await?;
    let message: Message = serde_json::from_value(stored)?;
    info!(project_id = %message.project_id, message_id = %message.id, "message saved");
    Ok(message)
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
