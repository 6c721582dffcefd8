//! Agent definitions: validation, remote creation and local bookkeeping

use shared::CreateAssistantRequest;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::{Assistant, NewAssistant};
use crate::openai::AssistantApi;
use crate::schema_format::{format_table_schema, generate_instructions};
use crate::store::AssistantStore;

/// Names of the required create fields that are absent or empty, in declaration order
pub fn missing_fields(req: &CreateAssistantRequest) -> Vec<&'static str> {
    let required = [
        ("agentName", &req.agent_name),
        ("sqlUsername", &req.sql_username),
        ("sqlPassword", &req.sql_password),
    ];

    required
        .into_iter()
        .filter(|(_, value)| value.as_deref().map_or(true, str::is_empty))
        .map(|(name, _)| name)
        .collect()
}

pub struct AssistantRegistry {
    store: Arc<dyn AssistantStore>,
    api: Arc<dyn AssistantApi>,
    default_model: String,
}

impl AssistantRegistry {
    pub fn new(
        store: Arc<dyn AssistantStore>,
        api: Arc<dyn AssistantApi>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            store,
            api,
            default_model: default_model.into(),
        }
    }

    /// Create the remote assistant, then record it locally.
    ///
    /// Not idempotent: every call mints a new remote assistant.
    pub async fn create(&self, req: CreateAssistantRequest) -> Result<Assistant, AppError> {
        let missing = missing_fields(&req);
        if !missing.is_empty() {
            return Err(AppError::Validation(missing));
        }

        if req.tables.is_empty() {
            warn!("Creating agent without a usable table description");
        }
        let instructions = generate_instructions(&format_table_schema(&req.tables));

        let agent_name = req.agent_name.unwrap_or_default();
        let model = req
            .user_selected_model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.default_model.clone());

        let remote = self
            .api
            .create_assistant(&agent_name, &instructions, &model)
            .await?;
        let assistant_id = remote.id.filter(|id| !id.is_empty()).ok_or_else(|| {
            AppError::Upstream("assistant creation returned no id".to_string())
        })?;
        info!(
            "Created remote assistant {} ({:?}, model {:?})",
            assistant_id, remote.name, remote.model
        );

        let record = NewAssistant {
            assistant_id,
            agent_name,
            sql_username: req.sql_username.unwrap_or_default(),
            sql_password: req.sql_password.unwrap_or_default(),
            instructions,
            description: req.description.unwrap_or_default(),
            photo_option: req.photo_option.unwrap_or_default(),
            tables: serde_json::to_value(&req.tables).unwrap_or_default(),
            assistant_types: serde_json::to_value(&req.assistant_types).unwrap_or_default(),
            user_selected_model: model,
        };

        Ok(self.store.insert(record).await?)
    }

    pub async fn list(&self) -> Result<Vec<Assistant>, AppError> {
        Ok(self.store.list_active().await?)
    }

    pub async fn get(&self, assistant_id: &str) -> Result<Assistant, AppError> {
        self.store
            .find_active(assistant_id)
            .await?
            .ok_or(AppError::NotFound("Assistant"))
    }

    pub async fn delete(&self, assistant_id: &str) -> Result<(), AppError> {
        if self.store.soft_delete(assistant_id).await? {
            info!("Soft-deleted assistant {}", assistant_id);
            Ok(())
        } else {
            Err(AppError::NotFound("Assistant"))
        }
    }
}
