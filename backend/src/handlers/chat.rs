use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use shared::{ChatHistoryResponse, ChatRequest, ChatResponse};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    error::AppError, openai::is_valid_id, orchestrator::TurnRequest, store::Exchange,
    visualization::parse_visualization, AppState,
};

pub async fn chat(
    State(app_state): State<Arc<AppState>>,
    Path(assistant_id): Path<String>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ChatResponse>), AppError> {
    let assistant = app_state.registry.get(&assistant_id).await?;
    let Json(req) = body?;

    let question = req.question.trim();
    if question.is_empty() {
        return Err(AppError::Validation(vec!["question"]));
    }
    // thread ids become assistant API path segments
    if req.existing_thread().is_some_and(|id| !is_valid_id(id)) {
        return Err(AppError::InvalidField("thread_id"));
    }

    let asked_at = Utc::now().naive_utc();
    let cancel = app_state.shutdown.child_token();
    let outcome = app_state
        .orchestrator
        .run_turn(
            TurnRequest {
                assistant_id: &assistant.assistant_id,
                question,
                thread_id: req.existing_thread(),
            },
            &cancel,
        )
        .await?;

    if outcome.created_thread {
        info!("Started chat {} with {}", outcome.thread_id, assistant.assistant_id);
    }

    let exchange = Exchange {
        question: question.to_string(),
        answer: outcome.reply.text(),
        asked_at,
        answered_at: Utc::now().naive_utc(),
    };
    if let Err(e) = app_state
        .chats
        .record_exchange(assistant.id, &outcome.thread_id, exchange)
        .await
    {
        warn!("Failed to save chat history for {}: {}", outcome.thread_id, e);
    }

    let visualization = parse_visualization(&outcome.reply.content);

    Ok((
        StatusCode::CREATED,
        Json(ChatResponse {
            response: outcome.reply.content,
            thread_id: outcome.thread_id,
            query_results: outcome.query_results,
            visualization,
        }),
    ))
}

pub async fn chat_history(
    State(app_state): State<Arc<AppState>>,
    Path((assistant_id, thread_id)): Path<(String, String)>,
) -> Result<Json<ChatHistoryResponse>, AppError> {
    let assistant = app_state.registry.get(&assistant_id).await?;

    let messages = app_state
        .chats
        .history(assistant.id, &thread_id)
        .await?
        .ok_or(AppError::NotFound("Chat"))?;

    Ok(Json(ChatHistoryResponse {
        thread_id,
        messages,
    }))
}
