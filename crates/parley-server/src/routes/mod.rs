//! HTTP route handlers.

pub mod agent;
pub mod chat;
pub mod conversations;
pub mod status;

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;

use axum::http::{header, HeaderName, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures::Stream;
use parley_chat::{null_as_empty, ChatMessage, MessageContent};
use parley_core::Role;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::state::AppState;

pub(crate) type SseStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Build the main Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(conversations::routes())
        .merge(chat::routes())
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(status::routes())
        .merge(agent::routes())
}

/// SSE response with proxy buffering and caching disabled.
pub(crate) fn sse_response(status: StatusCode, stream: SseStream) -> Response {
    (
        status,
        [
            (header::CACHE_CONTROL, "no-cache"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        Sse::new(stream),
    )
        .into_response()
}

/// A one-event SSE response carrying `payload`.
pub(crate) fn sse_single(status: StatusCode, payload: serde_json::Value) -> Response {
    let stream: SseStream = Box::pin(futures::stream::once(async move {
        Ok::<_, Infallible>(Event::default().data(payload.to_string()))
    }));
    sse_response(status, stream)
}

/// A message as clients send it. The role stays a string so that roles
/// Parley does not handle (`system`, `developer`, `tool`) can be skipped.
#[derive(Debug, Deserialize)]
pub struct RequestMessage {
    pub role: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: MessageContent,
}

/// User and assistant turns, in order.
pub(crate) fn conversation_messages(messages: Vec<RequestMessage>) -> Vec<ChatMessage> {
    messages
        .into_iter()
        .filter_map(|m| {
            let role = match m.role.as_str() {
                "user" => Role::User,
                "assistant" => Role::Assistant,
                other => {
                    debug!("Skipping request message with role '{}'", other);
                    return None;
                }
            };
            Some(ChatMessage::new(role, m.content))
        })
        .collect()
}
