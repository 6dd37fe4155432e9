//! The OpenAI-compatible client against a local fake upstream.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use parley_chat::{
    ChatMessage, ChatModel, ChatRequest, Embedder, OpenAiCompatModel, OpenAiEmbedder, StreamChunk, ToolSpec,
};
use serde_json::{json, Value};
use tokio_stream::StreamExt;

#[derive(Default)]
struct Upstream {
    bodies: Mutex<Vec<Value>>,
    auth: Mutex<Vec<String>>,
}

fn sse(lines: &[Value]) -> String {
    let mut body: String = lines.iter().map(|l| format!("data: {}\n\n", l)).collect();
    body.push_str("data: [DONE]\n\n");
    body
}

async fn completions(
    State(upstream): State<Arc<Upstream>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if let Some(auth) = headers.get(header::AUTHORIZATION) {
        upstream.auth.lock().push(auth.to_str().unwrap_or_default().to_string());
    }
    let wants_tools = body.get("tools").is_some();
    upstream.bodies.lock().push(body);

    let lines = if wants_tools {
        vec![
            json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "id": "call_abc", "function": {"name": "movie_database_search", "arguments": "{\"que"}}
            ]}, "finish_reason": null}]}),
            json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "ry\":\"Heat\"}"}}
            ]}, "finish_reason": null}]}),
            json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}),
        ]
    } else {
        vec![
            json!({"choices": [{"delta": {"role": "assistant", "content": ""}, "finish_reason": null}]}),
            json!({"choices": [{"delta": {"content": "Hello"}, "finish_reason": null}]}),
            json!({"choices": [{"delta": {"content": " world"}, "finish_reason": null}]}),
            json!({"choices": [{"delta": {}, "finish_reason": "stop"}]}),
        ]
    };

    ([(header::CONTENT_TYPE, "text/event-stream")], sse(&lines))
}

async fn embeddings(Json(body): Json<Value>) -> impl IntoResponse {
    let inputs = body["input"].as_array().cloned().unwrap_or_default();
    // Returned out of order; the client must sort by index.
    let data: Vec<Value> = inputs
        .iter()
        .enumerate()
        .rev()
        .map(|(i, text)| {
            let len = text.as_str().unwrap_or_default().len() as f32;
            json!({"index": i, "embedding": [len, 1.0]})
        })
        .collect();
    Json(json!({"data": data}))
}

async fn failing() -> impl IntoResponse {
    (StatusCode::UNAUTHORIZED, "bad token")
}

/// A 200 stream whose only payload is an error object.
async fn streamed_error() -> impl IntoResponse {
    let body = format!(
        "data: {}\n\n",
        json!({"error": {"message": "quota exceeded", "type": "insufficient_quota"}})
    );
    ([(header::CONTENT_TYPE, "text/event-stream")], body)
}

/// Tool-call fragments with no finish reason and no `[DONE]` marker.
async fn truncated() -> impl IntoResponse {
    let lines = [
        json!({"choices": [{"delta": {"tool_calls": [
            {"index": 1, "id": "call_b", "function": {"name": "movie_database_search", "arguments": "{\"query\":"}}
        ]}, "finish_reason": null}]}),
        json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "id": "call_a", "function": {"name": "movie_database_search", "arguments": "{}"}},
            {"index": 1, "function": {"arguments": "\"Alien\"}"}}
        ]}, "finish_reason": null}]}),
    ];
    let body: String = lines.iter().map(|l| format!("data: {}\n\n", l)).collect();
    ([(header::CONTENT_TYPE, "text/event-stream")], body)
}

async fn spawn_upstream() -> (String, Arc<Upstream>) {
    let upstream = Arc::new(Upstream::default());
    let app = Router::new()
        .route("/v1/chat/completions", post(completions))
        .route("/v1/embeddings", post(embeddings))
        .route("/broken/chat/completions", post(failing))
        .route("/erroring/chat/completions", post(streamed_error))
        .route("/truncated/chat/completions", post(truncated))
        .with_state(upstream.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), upstream)
}

#[tokio::test]
async fn test_streamed_text_completion() {
    let (base, upstream) = spawn_upstream().await;
    let model = OpenAiCompatModel::new(reqwest::Client::new(), format!("{}/v1/", base), "sk-test", "gpt-4o-mini");

    let completion = model
        .complete(ChatRequest::new(vec![ChatMessage::user("hi")]).with_temperature(0.2))
        .await
        .unwrap();
    assert_eq!(completion.content, "Hello world");
    assert_eq!(completion.finish_reason.as_deref(), Some("stop"));
    assert!(completion.tool_calls.is_empty());

    let body = upstream.bodies.lock()[0].clone();
    assert_eq!(body["model"], "gpt-4o-mini");
    assert_eq!(body["stream"], true);
    assert_eq!(body["temperature"], 0.2);
    assert_eq!(body["messages"], json!([{"role": "user", "content": "hi"}]));
    assert_eq!(upstream.auth.lock()[0], "Bearer sk-test");
}

#[tokio::test]
async fn test_streamed_tool_call_fragments() {
    let (base, upstream) = spawn_upstream().await;
    let model = OpenAiCompatModel::new(reqwest::Client::new(), format!("{}/v1", base), "k", "m");

    let request = ChatRequest::new(vec![ChatMessage::user("When was Heat released?")]).with_tools(vec![ToolSpec {
        name: "movie_database_search".into(),
        description: "Search movies".into(),
        parameters: json!({"type": "object", "properties": {"query": {"type": "string"}}}),
    }]);
    let completion = model.complete(request).await.unwrap();

    assert_eq!(completion.tool_calls.len(), 1);
    let call = &completion.tool_calls[0];
    assert_eq!(call.id, "call_abc");
    assert_eq!(call.name, "movie_database_search");
    assert_eq!(call.arguments, r#"{"query":"Heat"}"#);

    let body = upstream.bodies.lock()[0].clone();
    assert_eq!(body["tools"][0]["type"], "function");
    assert_eq!(body["tools"][0]["function"]["name"], "movie_database_search");
}

#[tokio::test]
async fn test_upstream_error_status() {
    let (base, _) = spawn_upstream().await;
    let model = OpenAiCompatModel::new(reqwest::Client::new(), format!("{}/broken", base), "k", "m");

    let err = model
        .complete(ChatRequest::new(vec![ChatMessage::user("hi")]))
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("401"), "{}", message);
    assert!(message.contains("bad token"), "{}", message);
}

#[tokio::test]
async fn test_streamed_error_payload() {
    let (base, _) = spawn_upstream().await;
    let model = OpenAiCompatModel::new(reqwest::Client::new(), format!("{}/erroring", base), "k", "m");

    let chunks: Vec<StreamChunk> = model
        .stream(ChatRequest::new(vec![ChatMessage::user("hi")]))
        .collect()
        .await;
    assert_eq!(chunks, vec![StreamChunk::Error("quota exceeded".into())]);

    let err = model
        .complete(ChatRequest::new(vec![ChatMessage::user("hi")]))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("quota exceeded"), "{}", err);
}

#[tokio::test]
async fn test_transport_failure() {
    // Reserve a port, then close it so nothing is listening.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let model = OpenAiCompatModel::new(reqwest::Client::new(), format!("http://{}/v1", addr), "k", "m");
    let err = model
        .complete(ChatRequest::new(vec![ChatMessage::user("hi")]))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Request failed:"), "{}", err);
}

#[tokio::test]
async fn test_pending_tool_calls_flushed_at_end_of_body() {
    let (base, _) = spawn_upstream().await;
    let model = OpenAiCompatModel::new(reqwest::Client::new(), format!("{}/truncated", base), "k", "m");

    let completion = model
        .complete(ChatRequest::new(vec![ChatMessage::user("Alien?")]))
        .await
        .unwrap();
    assert!(completion.finish_reason.is_none());

    let ids: Vec<&str> = completion.tool_calls.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["call_a", "call_b"]);
    assert_eq!(completion.tool_calls[1].arguments, r#"{"query":"Alien"}"#);
}

#[tokio::test]
async fn test_embeddings_in_input_order() {
    let (base, _) = spawn_upstream().await;
    let embedder = OpenAiEmbedder::new(reqwest::Client::new(), format!("{}/v1", base), "k", "text-embedding-3-small");

    let vectors = embedder
        .embed(&["a".to_string(), "abc".to_string()])
        .await
        .unwrap();
    assert_eq!(vectors, vec![vec![1.0, 1.0], vec![3.0, 1.0]]);
}
