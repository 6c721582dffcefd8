use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use shared::{AssistantInfo, CreateAssistantRequest, CreateAssistantResponse};
use std::sync::Arc;

use crate::{error::AppError, AppState};

pub async fn create_assistant(
    State(app_state): State<Arc<AppState>>,
    body: Result<Json<CreateAssistantRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateAssistantResponse>), AppError> {
    let Json(req) = body?;
    let assistant = app_state.registry.create(req).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateAssistantResponse {
            message: "Assistant created successfully".to_string(),
            assistant: assistant.to_info(),
        }),
    ))
}

pub async fn list_assistants(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<AssistantInfo>>, AppError> {
    let assistants = app_state.registry.list().await?;
    Ok(Json(assistants.iter().map(|a| a.to_info()).collect()))
}

pub async fn get_assistant(
    State(app_state): State<Arc<AppState>>,
    Path(assistant_id): Path<String>,
) -> Result<Json<AssistantInfo>, AppError> {
    let assistant = app_state.registry.get(&assistant_id).await?;
    Ok(Json(assistant.to_info()))
}

/// Soft delete: the remote assistant is left in place
pub async fn delete_assistant(
    State(app_state): State<Arc<AppState>>,
    Path(assistant_id): Path<String>,
) -> Result<StatusCode, AppError> {
    app_state.registry.delete(&assistant_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
