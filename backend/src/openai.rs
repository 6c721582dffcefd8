//! Assistant API client (OpenAI Assistants v2)
//!
//! The orchestrator and registry only see the [`AssistantApi`] trait; the
//! reqwest implementation lives here alongside the wire types.

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::{Deserialize, Serialize};
use shared::ContentBlock;

/// Header required by the v2 assistants endpoints
const BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

/// Messages fetched per listing; the reply to the latest run is always near the top
const MESSAGE_PAGE_SIZE: &str = "20";

#[derive(Debug, thiserror::Error)]
pub enum AssistantApiError {
    #[error("assistant API request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("assistant API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to parse assistant API response: {0}")]
    Parse(String),
}

/// Assistant object as returned by the create call
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteAssistant {
    /// Treated as optional so a response without an id is reported, not a parse error
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thread {
    pub id: String,
}

/// Lifecycle status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Terminal statuses other than `completed`
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RunStatus::Failed | RunStatus::Cancelled | RunStatus::Expired | RunStatus::Incomplete
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Expired => "expired",
            RunStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

impl ThreadMessage {
    pub fn is_assistant(&self) -> bool {
        self.role == "assistant"
    }

    /// All text blocks joined with newlines
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Deserialize)]
struct MessageList {
    data: Vec<ThreadMessage>,
}

#[derive(Debug, Serialize)]
struct CreateAssistantBody<'a> {
    name: &'a str,
    instructions: &'a str,
    model: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateMessageBody<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateRunBody<'a> {
    assistant_id: &'a str,
}

/// The remote assistant operations this service depends on
#[async_trait]
pub trait AssistantApi: Send + Sync {
    async fn create_assistant(
        &self,
        name: &str,
        instructions: &str,
        model: &str,
    ) -> Result<RemoteAssistant, AssistantApiError>;

    async fn create_thread(&self) -> Result<Thread, AssistantApiError>;

    async fn add_user_message(&self, thread_id: &str, content: &str)
        -> Result<(), AssistantApiError>;

    async fn create_run(&self, thread_id: &str, assistant_id: &str)
        -> Result<Run, AssistantApiError>;

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantApiError>;

    /// Messages on the thread, newest first
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, AssistantApiError>;
}

/// Whether an id has the shape the assistant API issues (`thread_abc123`, `asst_...`)
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// reqwest-backed client for the OpenAI Assistants API
pub struct OpenAiClient {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, AssistantApiError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AssistantApiError::Parse(format!("base URL {:?}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(AssistantApiError::Parse(format!(
                "base URL {:?} cannot hold a path",
                base_url.as_str()
            )));
        }

        Ok(Self {
            client: Client::builder().build()?,
            base_url,
            api_key: api_key.to_string(),
        })
    }

    /// Endpoint URL under the base path. Each segment is percent-encoded, so
    /// ids containing `/`, `?` or `#` stay inside their own segment.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(segments))
            .bearer_auth(&self.api_key)
            .header(BETA_HEADER.0, BETA_HEADER.1)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, AssistantApiError> {
        let status = response.status();

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AssistantApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AssistantApiError::Parse(e.to_string()))
    }
}

#[async_trait]
impl AssistantApi for OpenAiClient {
    async fn create_assistant(
        &self,
        name: &str,
        instructions: &str,
        model: &str,
    ) -> Result<RemoteAssistant, AssistantApiError> {
        let response = self
            .request(Method::POST, &["assistants"])
            .json(&CreateAssistantBody {
                name,
                instructions,
                model,
            })
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn create_thread(&self) -> Result<Thread, AssistantApiError> {
        let response = self
            .request(Method::POST, &["threads"])
            .json(&serde_json::json!({}))
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn add_user_message(
        &self,
        thread_id: &str,
        content: &str,
    ) -> Result<(), AssistantApiError> {
        let response = self
            .request(Method::POST, &["threads", thread_id, "messages"])
            .json(&CreateMessageBody {
                role: "user",
                content,
            })
            .send()
            .await?;
        let _: serde_json::Value = self.handle_response(response).await?;
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, AssistantApiError> {
        let response = self
            .request(Method::POST, &["threads", thread_id, "runs"])
            .json(&CreateRunBody { assistant_id })
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantApiError> {
        let response = self
            .request(Method::GET, &["threads", thread_id, "runs", run_id])
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, AssistantApiError> {
        let response = self
            .request(Method::GET, &["threads", thread_id, "messages"])
            .query(&[("order", "desc"), ("limit", MESSAGE_PAGE_SIZE)])
            .send()
            .await?;
        let list: MessageList = self.handle_response(response).await?;
        Ok(list.data)
    }
}
