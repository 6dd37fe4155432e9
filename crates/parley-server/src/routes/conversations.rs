//! Conversation CRUD routes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/conversations/{id}",
            get(get_conversation).delete(delete_conversation),
        )
}

/// POST /conversations
async fn create_conversation(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conversation_id = state.store.create_conversation().await?;
    info!("Created conversation {}", conversation_id);
    Ok(Json(json!({ "conversation_id": conversation_id })))
}

/// GET /conversations
async fn list_conversations(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let summaries = state.store.list_conversations().await?;
    Ok(Json(json!(summaries)))
}

/// GET /conversations/{id}
async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conversation = state
        .store
        .get_conversation(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Conversation"))?;

    let messages: Vec<_> = conversation.messages.iter().map(|m| m.record()).collect();

    Ok(Json(json!({
        "id": conversation.id,
        "created_at": conversation.created_at,
        "updated_at": conversation.updated_at,
        "messages": messages,
    })))
}

/// DELETE /conversations/{id}
async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.store.delete_conversation(&id).await? {
        info!("Deleted conversation {}", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("Conversation"))
    }
}
