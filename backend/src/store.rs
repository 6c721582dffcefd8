//! Record store for agents and chat history

use async_trait::async_trait;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use shared::{HistoryMessage, MessageSender};
use uuid::Uuid;

use crate::db::{interact, DbPool, StoreError};
use crate::models::{Assistant, ChatMessage, NewAssistant, NewChat, NewChatMessage};

#[async_trait]
pub trait AssistantStore: Send + Sync {
    async fn insert(&self, new_assistant: NewAssistant) -> Result<Assistant, StoreError>;

    /// Non-deleted agents, newest first
    async fn list_active(&self) -> Result<Vec<Assistant>, StoreError>;

    async fn find_active(&self, assistant_id: &str) -> Result<Option<Assistant>, StoreError>;

    /// Returns false when no live agent had that id
    async fn soft_delete(&self, assistant_id: &str) -> Result<bool, StoreError>;
}

/// One question/answer pair to append to a thread's history
#[derive(Debug, Clone)]
pub struct Exchange {
    pub question: String,
    pub answer: String,
    pub asked_at: NaiveDateTime,
    pub answered_at: NaiveDateTime,
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Append an exchange, creating the chat record for the thread if needed
    async fn record_exchange(
        &self,
        assistant: Uuid,
        thread_id: &str,
        exchange: Exchange,
    ) -> Result<(), StoreError>;

    /// Messages of a thread in chronological order, or `None` for an unknown thread
    async fn history(
        &self,
        assistant: Uuid,
        thread_id: &str,
    ) -> Result<Option<Vec<HistoryMessage>>, StoreError>;
}

/// Postgres-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssistantStore for PgStore {
    async fn insert(&self, new_assistant: NewAssistant) -> Result<Assistant, StoreError> {
        use crate::schema::assistants;

        interact(&self.pool, move |conn| {
            diesel::insert_into(assistants::table)
                .values(&new_assistant)
                .returning(Assistant::as_returning())
                .get_result(conn)
        })
        .await
    }

    async fn list_active(&self) -> Result<Vec<Assistant>, StoreError> {
        use crate::schema::assistants;

        interact(&self.pool, |conn| {
            assistants::table
                .filter(assistants::is_deleted.eq(false))
                .order(assistants::created_at.desc())
                .select(Assistant::as_select())
                .load(conn)
        })
        .await
    }

    async fn find_active(&self, assistant_id: &str) -> Result<Option<Assistant>, StoreError> {
        use crate::schema::assistants;

        let assistant_id = assistant_id.to_string();
        interact(&self.pool, move |conn| {
            assistants::table
                .filter(assistants::assistant_id.eq(assistant_id))
                .filter(assistants::is_deleted.eq(false))
                .select(Assistant::as_select())
                .first(conn)
                .optional()
        })
        .await
    }

    async fn soft_delete(&self, assistant_id: &str) -> Result<bool, StoreError> {
        use crate::schema::assistants;

        let assistant_id = assistant_id.to_string();
        let updated = interact(&self.pool, move |conn| {
            diesel::update(
                assistants::table
                    .filter(assistants::assistant_id.eq(assistant_id))
                    .filter(assistants::is_deleted.eq(false)),
            )
            .set(assistants::is_deleted.eq(true))
            .execute(conn)
        })
        .await?;

        Ok(updated > 0)
    }
}

#[async_trait]
impl ChatStore for PgStore {
    async fn record_exchange(
        &self,
        assistant: Uuid,
        thread_id: &str,
        exchange: Exchange,
    ) -> Result<(), StoreError> {
        use crate::schema::{chat_messages, chats};

        let thread_id = thread_id.to_string();
        interact(&self.pool, move |conn| {
            conn.transaction(|conn| {
                let chat_id: Uuid = diesel::insert_into(chats::table)
                    .values(&NewChat {
                        assistant_id: assistant,
                        thread_id,
                    })
                    .on_conflict((chats::assistant_id, chats::thread_id))
                    .do_update()
                    .set(chats::updated_at.eq(diesel::dsl::now))
                    .returning(chats::id)
                    .get_result(conn)?;

                let messages = vec![
                    NewChatMessage {
                        chat_id,
                        sender: MessageSender::User.as_str().to_string(),
                        content: exchange.question,
                        created_at: exchange.asked_at,
                    },
                    NewChatMessage {
                        chat_id,
                        sender: MessageSender::Assistant.as_str().to_string(),
                        content: exchange.answer,
                        created_at: exchange.answered_at,
                    },
                ];

                diesel::insert_into(chat_messages::table)
                    .values(&messages)
                    .execute(conn)?;

                Ok(())
            })
        })
        .await
    }

    async fn history(
        &self,
        assistant: Uuid,
        thread_id: &str,
    ) -> Result<Option<Vec<HistoryMessage>>, StoreError> {
        use crate::schema::{chat_messages, chats};

        let thread_id = thread_id.to_string();
        interact(&self.pool, move |conn| {
            let chat_id = chats::table
                .filter(chats::thread_id.eq(thread_id))
                .filter(chats::assistant_id.eq(assistant))
                .select(chats::id)
                .first::<Uuid>(conn)
                .optional()?;

            let Some(chat_id) = chat_id else {
                return Ok(None);
            };

            let messages: Vec<ChatMessage> = chat_messages::table
                .filter(chat_messages::chat_id.eq(chat_id))
                .order(chat_messages::created_at.asc())
                .select(ChatMessage::as_select())
                .load(conn)?;

            Ok(Some(messages.into_iter().filter_map(to_history).collect()))
        })
        .await
    }
}

fn to_history(message: ChatMessage) -> Option<HistoryMessage> {
    Some(HistoryMessage {
        sender: MessageSender::parse(&message.sender)?,
        content: message.content,
        timestamp: message.created_at,
    })
}
