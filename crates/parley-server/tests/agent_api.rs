//! Agent routes: JSON, NDJSON and SSE framings over a scripted model.

mod common;

use axum::http::StatusCode;
use common::*;
use parley_chat::StreamChunk;
use parley_core::Role;
use serde_json::json;

fn ask(text: &str) -> serde_json::Value {
    json!({"messages": [{"role": "user", "content": text}]})
}

#[tokio::test]
async fn test_chat_with_tool_call() {
    let model = ScriptedModel::new(vec![
        tool_turn("call_1", "movie_database_search", r#"{"query":"Alien"}"#),
        text_turn(&["Alien was released in 1979."]),
    ]);
    let (app, _) = app_with(Some(model.clone()), Some(movie_retriever()));

    let response = send(&app, post_json("/api/chat", ask("When was Alien released?"))).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json(),
        json!({"response": "Alien was released in 1979.", "conversation_id": null})
    );

    let requests = model.requests.lock();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tools[0].name, "movie_database_search");
    let observation = requests[1].messages.last().unwrap();
    assert_eq!(observation.role, Role::Tool);
    assert!(observation.text().unwrap().contains("Ridley Scott"));
}

#[tokio::test]
async fn test_chat_persists_and_replays_history() {
    let model = ScriptedModel::new(vec![text_turn(&["Nice to meet you, Ana."]), text_turn(&["Ana."])]);
    let (app, state) = app_with(Some(model.clone()), None);
    let id = create_conversation(&app).await;

    let body = json!({
        "messages": [{"role": "user", "content": "My name is Ana."}],
        "conversation_id": id
    });
    let response = send(&app, post_json("/api/chat", body)).await;
    assert_eq!(response.json()["conversation_id"], id.as_str());

    let body = json!({
        "messages": [{"role": "user", "content": "What is my name?"}],
        "conversation_id": id
    });
    let response = send(&app, post_json("/api/chat", body)).await;
    assert_eq!(response.json()["response"], "Ana.");

    // system, stored user + assistant, new input
    let requests = model.requests.lock();
    let second = &requests[1].messages;
    assert_eq!(second.len(), 4);
    assert_eq!(second[1].text(), Some("My name is Ana."));
    assert_eq!(second[2].role, Role::Assistant);
    assert_eq!(second[3].text(), Some("What is my name?"));
    drop(requests);

    assert_eq!(state.store.get_messages(&id).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_chat_validation() {
    let (app, _) = app_with(None, None);
    let response = send(&app, post_json("/api/chat", ask("hi"))).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json(), json!({"error": "Server agent not available."}));

    let (app, _) = app_with(Some(ScriptedModel::replying(&["x"])), None);

    let response = send(&app, post_json("/api/chat", json!({"messages": []}))).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json(),
        json!({"error": "Invalid request: 'messages' are required."})
    );

    let trailing_assistant = json!({"messages": [
        {"role": "user", "content": "hi"},
        {"role": "assistant", "content": "hello"}
    ]});
    let response = send(&app, post_json("/api/chat", trailing_assistant)).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json(), json!({"error": "No user input message found."}));
}

#[tokio::test]
async fn test_chat_stream_ndjson() {
    let model = ScriptedModel::replying(&["Heat ", "", "is from 1995."]);
    let (app, state) = app_with(Some(model), None);
    let id = create_conversation(&app).await;

    let body = json!({
        "messages": [{"role": "user", "content": "When is Heat from?"}],
        "conversation_id": id
    });
    let response = send(&app, post_json("/api/chat-stream", body)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers["content-type"], "application/x-ndjson");
    assert_eq!(
        response.ndjson(),
        vec![json!({"chunk": "Heat "}), json!({"chunk": "is from 1995."})]
    );

    let messages = state.store.get_messages(&id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, "Heat is from 1995.");
}

#[tokio::test]
async fn test_chat_stream_ndjson_errors() {
    let (app, _) = app_with(None, None);
    let response = send(&app, post_json("/api/chat-stream", ask("hi"))).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers["content-type"], "application/x-ndjson");
    assert_eq!(response.ndjson(), vec![json!({"error": "Server agent not available."})]);

    let model = ScriptedModel::new(vec![vec![StreamChunk::Error("upstream down".into())]]);
    let (app, _) = app_with(Some(model), None);
    let response = send(&app, post_json("/api/chat-stream", ask("hi"))).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.ndjson(), vec![json!({"error": "upstream down"})]);
}

#[tokio::test]
async fn test_chat_sse() {
    let model = ScriptedModel::new(vec![
        tool_turn("call_1", "movie_database_search", r#"{"query":"Amelie"}"#),
        text_turn(&["Audrey ", "Tautou."]),
    ]);
    let (app, _) = app_with(Some(model), Some(movie_retriever()));

    let response = send(&app, post_json("/api/chat-sse", ask("Who stars in Amelie?"))).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers["x-accel-buffering"], "no");
    assert_eq!(
        response.sse_data(),
        vec![json!({"chunk": "Audrey "}), json!({"chunk": "Tautou."})]
    );
}

#[tokio::test]
async fn test_chat_sse_rejects_empty_messages() {
    let (app, _) = app_with(Some(ScriptedModel::replying(&["x"])), None);
    let response = send(&app, post_json("/api/chat-sse", json!({}))).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response.sse_data(),
        vec![json!({"error": "Invalid request: 'messages' are required."})]
    );
}

#[tokio::test]
async fn test_chat_accepts_openai_style_history() {
    let model = ScriptedModel::replying(&["Again: hello."]);
    let (app, _) = app_with(Some(model.clone()), None);

    let body = json!({"messages": [
        {"role": "developer", "content": "Answer briefly."},
        {"role": "user", "content": "hi"},
        {"role": "assistant", "content": null},
        {"role": "user", "content": "again"}
    ]});
    let response = send(&app, post_json("/api/chat", body)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["response"], "Again: hello.");

    // system prompt, user, empty assistant turn, new input
    let requests = model.requests.lock();
    let messages = &requests[0].messages;
    let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
    assert_eq!(messages[2].text(), Some(""));
    assert_eq!(messages[3].text(), Some("again"));
    assert!(messages.iter().all(|m| m.text() != Some("Answer briefly.")));
}

#[tokio::test]
async fn test_malformed_body_uses_route_framing() {
    let (app, _) = app_with(Some(ScriptedModel::replying(&["x"])), None);
    let malformed = json!({"messages": "nope"});

    let response = send(&app, post_json("/api/chat", malformed.clone())).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let error = response.json()["error"].as_str().unwrap().to_string();
    assert!(error.starts_with("Invalid request:"), "{}", error);

    let response = send(&app, post_json("/api/chat-stream", malformed.clone())).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.headers["content-type"], "application/x-ndjson");
    let lines = response.ndjson();
    assert_eq!(lines.len(), 1);
    assert!(lines[0]["error"].as_str().unwrap().starts_with("Invalid request:"));

    let response = send(&app, post_json("/api/chat-sse", malformed)).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.headers["content-type"], "text/event-stream");
    let events = response.sse_data();
    assert_eq!(events.len(), 1);
    assert!(events[0]["error"].as_str().unwrap().starts_with("Invalid request:"));
}
