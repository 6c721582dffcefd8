//! API request/response types and endpoint paths
//!
//! Field names follow the browser client's camelCase form payloads; the
//! `assistant_id` and `thread_id` keys keep their snake_case spelling because
//! the client reads them back verbatim.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    deserialize_lenient_tables, ContentBlock, HistoryMessage, QueryResults, TableDescriptor,
    Visualization,
};

/// Body of `POST /api/v1/assistants`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssistantRequest {
    #[serde(default, deserialize_with = "deserialize_scalar_string")]
    pub agent_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_scalar_string")]
    pub sql_username: Option<String>,
    #[serde(default, deserialize_with = "deserialize_scalar_string")]
    pub sql_password: Option<String>,
    /// Ignored: instructions are always generated from the tables
    #[serde(default, deserialize_with = "deserialize_scalar_string")]
    pub instructions: Option<String>,
    #[serde(default, deserialize_with = "deserialize_scalar_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_scalar_string")]
    pub photo_option: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_tables")]
    pub tables: Vec<TableDescriptor>,
    #[serde(default, deserialize_with = "deserialize_string_or_list")]
    pub assistant_types: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_scalar_string")]
    pub user_selected_model: Option<String>,
}

/// Form fields arrive as whatever the client had at hand: numbers and booleans
/// are taken as their text, anything else counts as absent
fn deserialize_scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn deserialize_string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(s)) if s.is_empty() => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(list)) => list,
        None => Vec::new(),
    })
}

/// A stored agent as exposed over the API. The SQL password is never included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantInfo {
    #[serde(rename = "assistant_id")]
    pub assistant_id: String,
    pub agent_name: String,
    pub sql_username: String,
    pub instructions: String,
    pub description: String,
    pub photo_option: String,
    pub tables: Vec<TableDescriptor>,
    pub assistant_types: Vec<String>,
    pub user_selected_model: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAssistantResponse {
    pub message: String,
    pub assistant: AssistantInfo,
}

/// Body of `POST /api/v1/assistants/:assistantId/chat`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default, alias = "threadId", alias = "threadID")]
    pub thread_id: Option<String>,
}

impl ChatRequest {
    /// The caller-supplied thread id, if it is usable
    pub fn existing_thread(&self) -> Option<&str> {
        self.thread_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty() && *id != "null" && *id != "undefined")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: Vec<ContentBlock>,
    pub thread_id: String,
    #[serde(default, skip_serializing_if = "QueryResults::is_empty")]
    pub query_results: QueryResults,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualization: Option<Visualization>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatHistoryResponse {
    pub thread_id: String,
    pub messages: Vec<HistoryMessage>,
}

/// JSON error body returned by every failing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// API endpoint paths
pub mod endpoints {
    pub const HEALTH: &str = "/";
    pub const ASSISTANTS: &str = "/api/v1/assistants";
    pub const ASSISTANTS_ALL: &str = "/api/v1/assistants/all";

    pub fn assistant(id: &str) -> String {
        format!("/api/v1/assistants/{}", id)
    }

    pub fn assistant_chat(id: &str) -> String {
        format!("/api/v1/assistants/{}/chat", id)
    }

    pub fn assistant_chat_history(id: &str, thread_id: &str) -> String {
        format!("/api/v1/assistants/{}/chats/{}", id, thread_id)
    }
}
