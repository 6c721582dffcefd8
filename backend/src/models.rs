use chrono::NaiveDateTime;
use diesel::prelude::*;
use shared::{AssistantInfo, TableDescriptor};
use uuid::Uuid;

/// Stored agent row. Deliberately not `Serialize`: it carries the SQL password.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::assistants)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Assistant {
    pub id: Uuid,
    pub assistant_id: String,
    pub agent_name: String,
    pub sql_username: String,
    pub sql_password: String,
    pub instructions: String,
    pub description: String,
    pub photo_option: String,
    pub tables: serde_json::Value,
    pub assistant_types: serde_json::Value,
    pub user_selected_model: String,
    pub is_deleted: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Assistant {
    /// API view of the row, without credentials
    pub fn to_info(&self) -> AssistantInfo {
        AssistantInfo {
            assistant_id: self.assistant_id.clone(),
            agent_name: self.agent_name.clone(),
            sql_username: self.sql_username.clone(),
            instructions: self.instructions.clone(),
            description: self.description.clone(),
            photo_option: self.photo_option.clone(),
            tables: TableDescriptor::list_from_value(self.tables.clone()),
            assistant_types: serde_json::from_value(self.assistant_types.clone())
                .unwrap_or_default(),
            user_selected_model: self.user_selected_model.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::assistants)]
pub struct NewAssistant {
    pub assistant_id: String,
    pub agent_name: String,
    pub sql_username: String,
    pub sql_password: String,
    pub instructions: String,
    pub description: String,
    pub photo_option: String,
    pub tables: serde_json::Value,
    pub assistant_types: serde_json::Value,
    pub user_selected_model: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::chats)]
pub struct NewChat {
    pub assistant_id: Uuid,
    pub thread_id: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::chat_messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ChatMessage {
    pub sender: String,
    pub content: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::chat_messages)]
pub struct NewChatMessage {
    pub chat_id: Uuid,
    pub sender: String,
    pub content: String,
    pub created_at: NaiveDateTime,
}
