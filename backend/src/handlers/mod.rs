pub mod assistants;
pub mod chat;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::AppState;

/// API routes; static files and middleware are layered on in `main`
pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        // Health check / root
        .route("/", get(|| async { "SQL Agent Backend" }))

        // Agent definitions
        .route("/api/v1/assistants", post(assistants::create_assistant))
        .route("/api/v1/assistants/all", get(assistants::list_assistants))
        .route(
            "/api/v1/assistants/:assistant_id",
            get(assistants::get_assistant).delete(assistants::delete_assistant),
        )

        // Conversations
        .route("/api/v1/assistants/:assistant_id/chat", post(chat::chat))
        .route(
            "/api/v1/assistants/:assistant_id/chats/:thread_id",
            get(chat::chat_history),
        )
        .with_state(app_state)
}
