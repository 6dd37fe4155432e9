//! Browser chat routes: the client POSTs a message, then opens an
//! EventSource on GET to receive the retrieval-augmented answer.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::Event;
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router};
use parley_chat::prompts::render_rag_prompt;
use parley_chat::{ChatMessage, ChatModel, ChatRequest, StreamChunk};
use parley_core::Role;
use parley_resolve::{format_documents, DEFAULT_TOP_K};
use parley_store::MessageRecord;
use serde::Deserialize;
use serde_json::json;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use super::{conversation_messages, sse_response, sse_single, RequestMessage, SseStream};
use crate::error::ApiError;
use crate::state::AppState;

/// Stored in place of the text of an image-only message.
pub const IMAGE_PLACEHOLDER: &str = "[Image received]";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/chat/stream", post(receive_message).get(stream_answer))
}

#[derive(Debug, Default, Deserialize)]
pub struct UiChatRequest {
    #[serde(default)]
    pub messages: Vec<RequestMessage>,
    #[serde(default)]
    pub context: Option<UiContext>,
    #[serde(default, rename = "sessionState")]
    pub session_state: Option<SessionState>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UiContext {
    /// Image attached by the client, as a data URI.
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub conversation_id: Option<String>,
}

// ---------------------------------------------------------------
// POST: store the user's message
// ---------------------------------------------------------------

async fn receive_message(
    State(state): State<Arc<AppState>>,
    body: Result<Json<UiChatRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(req) = body?;
    let conversation_id = req
        .session_state
        .and_then(|s| s.conversation_id)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            ApiError::bad_request("Invalid request: 'conversation_id' is required in sessionState.")
        })?;

    if state.store.get_conversation(&conversation_id).await?.is_none() {
        return Err(ApiError::not_found("Conversation"));
    }

    let attached_image = req.context.and_then(|c| c.file).is_some();
    let messages = conversation_messages(req.messages);
    let content = storable_content(
        messages.last(),
        attached_image,
        state.config.show_multimodal_features,
    )
    .ok_or_else(|| ApiError::bad_request("No messages or image provided in the request."))?;

    state
        .store
        .add_message(&conversation_id, Role::User, &content)
        .await?;
    info!("Stored user message for conversation {}", conversation_id);

    Ok(Json(json!({
        "status": "message_received",
        "conversation_id": conversation_id,
    })))
}

/// What to store for the latest message: its text, or the image
/// placeholder when it only carries an image and multimodal input is on.
fn storable_content(
    last: Option<&ChatMessage>,
    attached_image: bool,
    multimodal: bool,
) -> Option<String> {
    let text = last
        .and_then(|m| m.text())
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    if text.is_some() {
        return text;
    }

    let has_image = attached_image || last.is_some_and(|m| m.content.has_image());
    (multimodal && has_image).then(|| IMAGE_PLACEHOLDER.to_string())
}

// ---------------------------------------------------------------
// GET: stream the answer (SSE)
// ---------------------------------------------------------------

async fn stream_answer(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StreamQuery>,
) -> Response {
    match prepare_answer(&state, query).await {
        Ok(prepared) => sse_response(StatusCode::OK, answer_stream(state, prepared).await),
        Err(e) => {
            warn!("Rejected chat stream: {}", e.message);
            sse_single(e.status, error_payload(&e.message, e.kind()))
        }
    }
}

struct PreparedAnswer {
    model: Arc<dyn ChatModel>,
    conversation_id: String,
    history: Vec<MessageRecord>,
}

async fn prepare_answer(state: &AppState, query: StreamQuery) -> Result<PreparedAnswer, ApiError> {
    let Some(model) = state.model.clone() else {
        error!("Chat model not configured");
        return Err(ApiError::internal("Server agent not available."));
    };

    let conversation_id = query
        .conversation_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("Invalid request: 'conversation_id' is required."))?;

    if state.store.get_conversation(&conversation_id).await?.is_none() {
        return Err(ApiError::not_found("Conversation"));
    }

    let history = state.store.get_messages(&conversation_id).await?;
    if history.is_empty() {
        return Err(ApiError::bad_request("No messages found in conversation."));
    }

    Ok(PreparedAnswer {
        model,
        conversation_id,
        history,
    })
}

async fn answer_stream(state: Arc<AppState>, prepared: PreparedAnswer) -> SseStream {
    let PreparedAnswer {
        model,
        conversation_id,
        history,
    } = prepared;

    let question = history
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.clone())
        .unwrap_or_default();

    let context = retrieve_context(&state, &question).await;
    let mut messages = vec![ChatMessage::system(render_rag_prompt(&context, &question))];
    messages.extend(history_messages(&history));

    debug!(
        "RAG answer for conversation {} with {} messages, {} bytes of context",
        conversation_id,
        messages.len(),
        context.len()
    );

    Box::pin(async_stream::stream! {
        let request = ChatRequest::new(messages).with_temperature(state.config.temperature);
        let mut llm = model.stream(request);
        let mut full_response = String::new();

        while let Some(chunk) = llm.next().await {
            match chunk {
                StreamChunk::Token(text) => {
                    if text.is_empty() {
                        continue;
                    }
                    full_response.push_str(&text);
                    let event = json!({
                        "choices": [{ "delta": { "content": text }, "finish_reason": null }]
                    });
                    yield Ok::<_, Infallible>(Event::default().data(event.to_string()));
                }
                StreamChunk::ToolCalls(_) => {}
                StreamChunk::Done { .. } => break,
                StreamChunk::Error(e) => {
                    error!("Chat stream failed for conversation {}: {}", conversation_id, e);
                    yield Ok(Event::default().data(error_payload(&e, "LlmError").to_string()));
                    return;
                }
            }
        }

        if !full_response.is_empty() {
            if let Err(e) = state
                .store
                .add_message(&conversation_id, Role::Assistant, &full_response)
                .await
            {
                warn!("Failed to store assistant reply: {}", e);
            }
        }

        info!("Chat stream complete for conversation {}", conversation_id);
        let complete = json!({
            "event": "complete",
            "conversation_id": conversation_id,
            "choices": [{ "delta": {}, "finish_reason": "stop" }]
        });
        yield Ok(Event::default().data(complete.to_string()));
    })
}

/// Top-k chunks for `question`, joined. Empty when there is no retriever,
/// no question, or retrieval fails.
async fn retrieve_context(state: &AppState, question: &str) -> String {
    let Some(retriever) = state.retriever.as_ref() else {
        return String::new();
    };
    if question.trim().is_empty() {
        return String::new();
    }

    match retriever.retrieve(question, DEFAULT_TOP_K).await {
        Ok(chunks) => {
            info!("Retrieved {} chunks for RAG query", chunks.len());
            format_documents(&chunks)
        }
        Err(e) => {
            warn!("Retrieval failed, answering without context: {}", e);
            String::new()
        }
    }
}

/// Stored turns as model messages. Tool records are never stored, so they are skipped.
fn history_messages(history: &[MessageRecord]) -> impl Iterator<Item = ChatMessage> + '_ {
    history
        .iter()
        .filter(|m| m.role != Role::Tool)
        .map(|m| ChatMessage::new(m.role, m.content.as_str()))
}

fn error_payload(message: &str, kind: &str) -> serde_json::Value {
    json!({ "error": { "message": message, "type": kind } })
}
