//! Shared fixtures: a scripted chat model and request helpers.
#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use parking_lot::Mutex;
use parley_chat::{BoxedStream, ChatModel, ChatRequest, StreamChunk, ToolCall};
use parley_core::ParleyConfig;
use parley_ingest::{Chunk, DocumentMetadata};
use parley_resolve::{HybridRetriever, Retriever};
use parley_server::{build_router, AppState};
use serde_json::Value;
use tower::ServiceExt;

/// Replays scripted turns in order and records every request.
pub struct ScriptedModel {
    turns: Mutex<Vec<Vec<StreamChunk>>>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new(mut turns: Vec<Vec<StreamChunk>>) -> Arc<Self> {
        turns.reverse();
        Arc::new(Self {
            turns: Mutex::new(turns),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// A model that answers every call with `tokens`.
    pub fn replying(tokens: &[&str]) -> Arc<Self> {
        Self::new(vec![text_turn(tokens)])
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted-model"
    }

    fn stream(&self, request: ChatRequest) -> BoxedStream {
        self.requests.lock().push(request);
        let turn = self
            .turns
            .lock()
            .pop()
            .unwrap_or_else(|| text_turn(&["(no script)"]));
        Box::pin(tokio_stream::iter(turn))
    }
}

pub fn done() -> StreamChunk {
    StreamChunk::Done {
        tokens_used: 1,
        finish_reason: Some("stop".into()),
    }
}

pub fn text_turn(tokens: &[&str]) -> Vec<StreamChunk> {
    let mut turn: Vec<StreamChunk> = tokens.iter().map(|t| StreamChunk::Token(t.to_string())).collect();
    turn.push(done());
    turn
}

pub fn tool_turn(id: &str, name: &str, arguments: &str) -> Vec<StreamChunk> {
    vec![
        StreamChunk::ToolCalls(vec![ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }]),
        done(),
    ]
}

/// Configuration with no upstream endpoint.
pub fn test_config() -> ParleyConfig {
    ParleyConfig::from_lookup(|_| None).unwrap()
}

pub fn movie_retriever() -> Arc<dyn Retriever> {
    let chunks = [
        "Heat (1995) is a crime film directed by Michael Mann starring Al Pacino and Robert De Niro.",
        "Alien (1979) is a science fiction horror film directed by Ridley Scott.",
        "Amelie (2001) is a French romantic comedy starring Audrey Tautou.",
    ]
    .iter()
    .enumerate()
    .map(|(i, text)| Chunk {
        text: text.to_string(),
        metadata: DocumentMetadata::default(),
        chunk_index: i,
    })
    .collect();
    Arc::new(HybridRetriever::keyword_only(chunks))
}

pub fn app_with(model: Option<Arc<dyn ChatModel>>, retriever: Option<Arc<dyn Retriever>>) -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(test_config(), model, retriever));
    (build_router(state.clone()), state)
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }

    /// Payloads of every `data:` line.
    pub fn sse_data(&self) -> Vec<Value> {
        self.body
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|data| serde_json::from_str(data.trim()).unwrap())
            .collect()
    }

    pub fn ndjson(&self) -> Vec<Value> {
        self.body
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> TestResponse {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    TestResponse {
        status,
        headers,
        body: String::from_utf8(bytes.to_vec()).unwrap(),
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn create_conversation(app: &Router) -> String {
    let response = send(app, post_json("/conversations", serde_json::json!({}))).await;
    assert_eq!(response.status, StatusCode::OK);
    response.json()["conversation_id"].as_str().unwrap().to_string()
}
