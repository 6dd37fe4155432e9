//! Liveness and capability routes.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/hello", get(hello))
        .route("/chat/status", get(get_status))
}

/// GET /api/hello
async fn hello() -> Json<serde_json::Value> {
    Json(json!({ "message": "Hello from Parley!" }))
}

/// GET /api/chat/status: what the server can currently do.
async fn get_status(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    let conversations = state.store.list_conversations().await?.len();
    let tools = state
        .agent
        .as_ref()
        .map(|agent| agent.tools().names())
        .unwrap_or_default();

    Ok(Json(json!({
        "llmAvailable": state.model.is_some(),
        "model": state.model.as_ref().map(|m| m.model_name().to_string()),
        "retrieverAvailable": state.retriever.is_some(),
        "tools": tools,
        "conversations": conversations,
    })))
}
