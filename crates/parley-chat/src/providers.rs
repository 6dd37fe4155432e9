//! Chat model providers.
//!
//! Every backend exposes the same token stream. The OpenAI-compatible
//! implementation covers OpenAI, GitHub Models and local servers (Ollama,
//! llama.cpp, vLLM) since they share the `/chat/completions` SSE format.

use std::collections::BTreeMap;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use parley_core::{Error, LlmEndpoint, Result};
use reqwest::Client;
use serde_json::{json, Value};
use tokio_stream::StreamExt;
use tracing::{debug, error};

use crate::types::{ChatMessage, ChatRequest, Completion, ToolCall};

/// Boxed stream type for returning different stream implementations.
pub type BoxedStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;

/// A single streamed item from the model.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Token(String),
    /// Complete tool calls, emitted once per turn after all fragments arrived.
    ToolCalls(Vec<ToolCall>),
    Done {
        tokens_used: usize,
        finish_reason: Option<String>,
    },
    Error(String),
}

/// A chat-completion backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Start a streaming completion. Failures surface as `StreamChunk::Error`.
    fn stream(&self, request: ChatRequest) -> BoxedStream;

    /// Run a completion to the end and collect it.
    async fn complete(&self, request: ChatRequest) -> Result<Completion> {
        collect_completion(self.stream(request)).await
    }
}

/// Drain a chunk stream into a single completion.
pub async fn collect_completion(mut stream: BoxedStream) -> Result<Completion> {
    let mut completion = Completion::default();
    while let Some(chunk) = stream.next().await {
        match chunk {
            StreamChunk::Token(text) => completion.content.push_str(&text),
            StreamChunk::ToolCalls(calls) => completion.tool_calls.extend(calls),
            StreamChunk::Done {
                tokens_used,
                finish_reason,
            } => {
                completion.tokens_used = tokens_used;
                completion.finish_reason = finish_reason;
                break;
            }
            StreamChunk::Error(e) => return Err(Error::Llm(e)),
        }
    }
    Ok(completion)
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenAiCompatModel {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
}

impl OpenAiCompatModel {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: parley_core::config::DEFAULT_TEMPERATURE,
        }
    }

    pub fn from_endpoint(client: Client, endpoint: &LlmEndpoint) -> Self {
        Self::new(client, &endpoint.base_url, &endpoint.api_key, &endpoint.model)
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    fn request_body(&self, request: &ChatRequest) -> Value {
        let messages: Vec<Value> = request.messages.iter().map(message_to_wire).collect();
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature.unwrap_or(self.temperature),
            "stream": true,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = json!(tools);
        }
        body
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn stream(&self, request: ChatRequest) -> BoxedStream {
        let client = self.client.clone();
        let url = format!("{}/chat/completions", self.base_url);
        let api_key = self.api_key.clone();
        let model = self.model.clone();
        let body = self.request_body(&request);

        Box::pin(async_stream::stream! {
            debug!("Streaming from {} with model {}", url, model);

            let response = match client
                .post(&url)
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    yield StreamChunk::Error(format!("Request failed: {}", e));
                    return;
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                error!("Chat API returned {}", status);
                yield StreamChunk::Error(format!("API error {}: {}", status, body));
                return;
            }

            let mut stream = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            let mut token_count = 0usize;
            let mut finish_reason: Option<String> = None;
            let mut pending = PendingToolCalls::default();

            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        yield StreamChunk::Error(format!("Stream read error: {}", e));
                        return;
                    }
                };
                buffer.extend_from_slice(&bytes);

                // Process complete SSE lines; a partial UTF-8 sequence stays buffered.
                while let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=line_end).collect();
                    let line = String::from_utf8_lossy(&raw);
                    let line = line.trim();

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }
                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();

                    if data == "[DONE]" {
                        if let Some(calls) = pending.take() {
                            yield StreamChunk::ToolCalls(calls);
                        }
                        yield StreamChunk::Done { tokens_used: token_count, finish_reason };
                        return;
                    }

                    let parsed: Value = match serde_json::from_str(data) {
                        Ok(v) => v,
                        Err(e) => {
                            debug!("Skipping unparseable SSE payload: {}", e);
                            continue;
                        }
                    };

                    if let Some(err) = parsed.get("error") {
                        let msg = err["message"]
                            .as_str()
                            .map(|s| s.to_string())
                            .unwrap_or_else(|| err.to_string());
                        error!("Chat API streamed an error: {}", msg);
                        yield StreamChunk::Error(msg);
                        return;
                    }

                    let choice = &parsed["choices"][0];
                    let delta = &choice["delta"];

                    if let Some(content) = delta["content"].as_str() {
                        if !content.is_empty() {
                            token_count += 1;
                            yield StreamChunk::Token(content.to_string());
                        }
                    }
                    if let Some(fragments) = delta["tool_calls"].as_array() {
                        pending.absorb(fragments);
                    }
                    if let Some(reason) = choice["finish_reason"].as_str() {
                        finish_reason = Some(reason.to_string());
                        if reason == "tool_calls" {
                            if let Some(calls) = pending.take() {
                                yield StreamChunk::ToolCalls(calls);
                            }
                        }
                    }
                }
            }

            if let Some(calls) = pending.take() {
                yield StreamChunk::ToolCalls(calls);
            }
            yield StreamChunk::Done { tokens_used: token_count, finish_reason };
        })
    }
}

/// Tool-call fragments keyed by their `index` within the turn.
#[derive(Default)]
struct PendingToolCalls {
    calls: BTreeMap<u64, ToolCall>,
}

impl PendingToolCalls {
    fn absorb(&mut self, fragments: &[Value]) {
        for fragment in fragments {
            let index = fragment["index"].as_u64().unwrap_or(0);
            let entry = self.calls.entry(index).or_insert_with(|| ToolCall {
                id: String::new(),
                name: String::new(),
                arguments: String::new(),
            });
            if let Some(id) = fragment["id"].as_str() {
                if entry.id.is_empty() {
                    entry.id = id.to_string();
                }
            }
            if let Some(name) = fragment["function"]["name"].as_str() {
                if entry.name.is_empty() {
                    entry.name = name.to_string();
                }
            }
            if let Some(args) = fragment["function"]["arguments"].as_str() {
                entry.arguments.push_str(args);
            }
        }
    }

    fn take(&mut self) -> Option<Vec<ToolCall>> {
        if self.calls.is_empty() {
            return None;
        }
        let calls = std::mem::take(&mut self.calls)
            .into_iter()
            .map(|(index, mut call)| {
                if call.id.is_empty() {
                    call.id = format!("call_{}", index);
                }
                call
            })
            .collect();
        Some(calls)
    }
}

/// Serialize a message in the `/chat/completions` wire format.
pub fn message_to_wire(message: &ChatMessage) -> Value {
    let mut value = json!({
        "role": message.role.as_str(),
        "content": message.content,
    });
    if !message.tool_calls.is_empty() {
        let calls: Vec<Value> = message
            .tool_calls
            .iter()
            .map(|c| {
                json!({
                    "id": c.id,
                    "type": "function",
                    "function": {"name": c.name, "arguments": c.arguments},
                })
            })
            .collect();
        value["tool_calls"] = json!(calls);
    }
    if let Some(id) = &message.tool_call_id {
        value["tool_call_id"] = json!(id);
    }
    value
}
