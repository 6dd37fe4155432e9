//! Agent routes: the tool-using assistant, as plain JSON, NDJSON or SSE.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::sse::Event;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::Stream;
use parley_chat::ChatMessage;
use parley_core::Role;
use parley_runtime::{AgentEvent, AgentGraph, AgentInput};
use parley_store::ConversationStore;
use serde::Deserialize;
use serde_json::json;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use super::{conversation_messages, sse_response, sse_single, RequestMessage, SseStream};
use crate::error::ApiError;
use crate::state::AppState;

const NDJSON: &str = "application/x-ndjson";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chat", post(chat))
        .route("/chat-stream", post(chat_ndjson))
        .route("/chat-sse", post(chat_sse))
}

#[derive(Debug, Default, Deserialize)]
pub struct AgentChatRequest {
    #[serde(default)]
    pub messages: Vec<RequestMessage>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// A validated request, ready to run.
struct AgentTurn {
    agent: AgentGraph,
    input: AgentInput,
    conversation_id: Option<String>,
}

// ---------------------------------------------------------------
// Non-streaming
// ---------------------------------------------------------------

async fn chat(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AgentChatRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(req) = body?;
    let turn = prepare_turn(&state, req).await?;
    info!(
        "Invoking agent (non-stream) for conversation {:?}",
        turn.conversation_id
    );

    let user_input = turn.input.input.clone();
    let outcome = turn.agent.invoke(turn.input).await.map_err(|e| {
        error!("Agent run failed: {}", e);
        ApiError::internal(e.to_string())
    })?;

    if let Some(id) = turn.conversation_id.as_deref() {
        persist_turn(state.store.as_ref(), id, &user_input, &outcome.output).await;
    }

    Ok(Json(json!({
        "response": outcome.output,
        "conversation_id": turn.conversation_id,
    })))
}

// ---------------------------------------------------------------
// Streaming (NDJSON)
// ---------------------------------------------------------------

async fn chat_ndjson(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AgentChatRequest>, JsonRejection>,
) -> Response {
    let turn = match read_turn(&state, body).await {
        Ok(turn) => turn,
        Err(e) => {
            let line = format!("{}\n", json!({ "error": e.message }));
            return (e.status, [(header::CONTENT_TYPE, NDJSON)], line).into_response();
        }
    };
    info!(
        "Invoking agent (NDJSON stream) for conversation {:?}",
        turn.conversation_id
    );

    let lines = answer_pieces(state, turn).map(|piece| {
        let line = match piece {
            Piece::Chunk(c) => json!({ "chunk": c }),
            Piece::Error(e) => json!({ "error": e }),
        };
        Ok::<_, Infallible>(format!("{}\n", line))
    });

    (
        [(header::CONTENT_TYPE, NDJSON)],
        Body::from_stream(lines),
    )
        .into_response()
}

// ---------------------------------------------------------------
// Streaming (SSE)
// ---------------------------------------------------------------

async fn chat_sse(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AgentChatRequest>, JsonRejection>,
) -> Response {
    let turn = match read_turn(&state, body).await {
        Ok(turn) => turn,
        Err(e) => return sse_single(e.status, json!({ "error": e.message })),
    };
    info!(
        "Invoking agent (SSE stream) for conversation {:?}",
        turn.conversation_id
    );

    let events: SseStream = Box::pin(answer_pieces(state, turn).map(|piece| {
        let payload = match piece {
            Piece::Chunk(c) => json!({ "chunk": c }),
            Piece::Error(e) => json!({ "error": e }),
        };
        Ok::<_, Infallible>(Event::default().data(payload.to_string()))
    }));

    sse_response(StatusCode::OK, events)
}

// ---------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------

enum Piece {
    Chunk(String),
    Error(String),
}

/// Run the agent and keep only what clients see: non-empty answer pieces
/// and a terminal error. The turn is persisted once the run finishes.
fn answer_pieces(state: Arc<AppState>, turn: AgentTurn) -> impl Stream<Item = Piece> + Send {
    async_stream::stream! {
        let AgentTurn { agent, input, conversation_id } = turn;
        let user_input = input.input.clone();
        let mut events = agent.stream(input);
        let mut full_response = String::new();

        while let Some(event) = events.next().await {
            match event {
                AgentEvent::Output { content } => {
                    if content.is_empty() {
                        continue;
                    }
                    full_response.push_str(&content);
                    yield Piece::Chunk(content);
                }
                AgentEvent::ToolStart { name, arguments } => {
                    debug!("Tool '{}' started with {}", name, arguments);
                }
                AgentEvent::ToolEnd { name, output } => {
                    debug!("Tool '{}' returned {} bytes", name, output.len());
                }
                AgentEvent::Finished { iterations, .. } => {
                    if let Some(id) = conversation_id.as_deref() {
                        persist_turn(state.store.as_ref(), id, &user_input, &full_response).await;
                    }
                    info!(
                        "Agent stream complete for conversation {:?} after {} iterations",
                        conversation_id, iterations
                    );
                    return;
                }
                AgentEvent::Error { message } => {
                    error!("Agent stream failed for conversation {:?}: {}", conversation_id, message);
                    yield Piece::Error(message);
                    return;
                }
            }
        }
    }
}

async fn read_turn(
    state: &AppState,
    body: Result<Json<AgentChatRequest>, JsonRejection>,
) -> Result<AgentTurn, ApiError> {
    let Json(req) = body?;
    prepare_turn(state, req).await
}

/// Validate the request and build the agent input: stored history first,
/// then earlier request messages, with the final user message as input.
async fn prepare_turn(state: &AppState, req: AgentChatRequest) -> Result<AgentTurn, ApiError> {
    let Some(agent) = state.agent.clone() else {
        error!("Agent not configured");
        return Err(ApiError::internal("Server agent not available."));
    };

    if req.messages.is_empty() {
        return Err(ApiError::bad_request(
            "Invalid request: 'messages' are required.",
        ));
    }

    let conversation_id = req.conversation_id.filter(|id| !id.is_empty());
    let mut chat_history = Vec::new();

    if let Some(id) = conversation_id.as_deref() {
        if state.store.get_conversation(id).await?.is_none() {
            return Err(ApiError::not_found("Conversation"));
        }
        for record in state.store.get_messages(id).await? {
            if matches!(record.role, Role::User | Role::Assistant) {
                chat_history.push(ChatMessage::new(record.role, record.content));
            }
        }
    }

    let (input, earlier) = split_input(conversation_messages(req.messages));
    chat_history.extend(earlier);

    let input = input
        .filter(|text| !text.is_empty())
        .ok_or_else(|| ApiError::bad_request("No user input message found."))?;

    Ok(AgentTurn {
        agent,
        input: AgentInput::new(input).with_history(chat_history),
        conversation_id,
    })
}

/// The last message's text when it comes from the user, plus the earlier
/// user/assistant turns as history.
fn split_input(mut messages: Vec<ChatMessage>) -> (Option<String>, Vec<ChatMessage>) {
    let input = match messages.last() {
        Some(last) if last.role == Role::User => {
            let text = last.text().map(str::to_string);
            messages.pop();
            text
        }
        _ => None,
    };

    let history = messages
        .into_iter()
        .filter(|m| matches!(m.role, Role::User | Role::Assistant))
        .map(|m| ChatMessage::new(m.role, m.content))
        .collect();

    (input, history)
}

async fn persist_turn(store: &dyn ConversationStore, conversation_id: &str, input: &str, output: &str) {
    for (role, content) in [(Role::User, input), (Role::Assistant, output)] {
        if let Err(e) = store.add_message(conversation_id, role, content).await {
            warn!("Failed to persist {} message for {}: {}", role, conversation_id, e);
        }
    }
}
