use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

// Constants shared between backend and clients
pub mod protocol;

// API request/response types and endpoint paths
pub mod api;
pub use api::{
    AssistantInfo, ChatHistoryResponse, ChatRequest, ChatResponse, CreateAssistantRequest,
    CreateAssistantResponse, ErrorResponse,
};

/// SQL data type of a described column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    Int,
    Varchar,
    Text,
    Boolean,
    Date,
    Float,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Int => "INT",
            DataType::Varchar => "VARCHAR",
            DataType::Text => "TEXT",
            DataType::Boolean => "BOOLEAN",
            DataType::Date => "DATE",
            DataType::Float => "FLOAT",
        }
    }
}

/// Key role of a described column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnRole {
    #[default]
    None,
    Primary,
    Foreign,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub column_name: String,
    /// The create form does not always send a type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
    #[serde(default, rename = "columnType")]
    pub role: ColumnRole,
}

/// A table as described by the user when defining an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDescriptor {
    pub table_name: String,
    #[serde(default)]
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    /// Interpret loosely-typed JSON as a table list.
    ///
    /// Accepts an array, or a string holding a JSON array. Anything else,
    /// including an array with malformed entries, yields an empty list.
    pub fn list_from_value(value: serde_json::Value) -> Vec<TableDescriptor> {
        match value {
            serde_json::Value::String(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            value @ serde_json::Value::Array(_) => {
                serde_json::from_value(value).unwrap_or_default()
            }
            _ => Vec::new(),
        }
    }
}

/// Deserialize a table list without ever rejecting the request body
pub fn deserialize_lenient_tables<'de, D>(deserializer: D) -> Result<Vec<TableDescriptor>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.map(TableDescriptor::list_from_value).unwrap_or_default())
}

/// Text payload of an assistant message content block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub value: String,
    #[serde(default)]
    pub annotations: Vec<serde_json::Value>,
}

/// One block of assistant message content, as returned by the assistant API
/// and relayed verbatim to the browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: TextContent },
    ImageFile { image_file: serde_json::Value },
    ImageUrl { image_url: serde_json::Value },
    Refusal { refusal: String },
    #[serde(other)]
    Unsupported,
}

impl ContentBlock {
    pub fn text(value: impl Into<String>) -> Self {
        ContentBlock::Text {
            text: TextContent {
                value: value.into(),
                annotations: Vec::new(),
            },
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(&text.value),
            _ => None,
        }
    }
}

/// Outcome of running one labelled query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    #[serde(rename = "ok")]
    Success { rows: Vec<serde_json::Value> },
    Failed { reason: String },
}

impl QueryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, QueryOutcome::Success { .. })
    }
}

/// Label -> outcome, in execution order
pub type QueryResults = IndexMap<String, QueryOutcome>;

/// Chart suggested by the assistant alongside its answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visualization {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insight: Option<String>,
    pub data: Vec<ChartPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    #[serde(deserialize_with = "deserialize_label")]
    pub label: String,
    pub value: f64,
}

/// Chart labels are frequently years or ids emitted as bare numbers
fn deserialize_label<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

/// Author of a stored chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSender {
    User,
    Assistant,
}

impl MessageSender {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageSender::User => "user",
            MessageSender::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MessageSender::User),
            "assistant" => Some(MessageSender::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub sender: MessageSender,
    pub content: String,
    pub timestamp: chrono::NaiveDateTime,
}
