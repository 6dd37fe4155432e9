//! Agent graph: alternates LLM calls and tool execution until the model
//! answers without requesting tools.
//!
//! ```text
//!   Agent --tool calls--> Tools --> Agent
//!   Agent --no tool calls--> End
//! ```

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use parley_chat::{ChatMessage, ChatModel, ChatRequest, StreamChunk, ToolCall};
use parley_core::config::{DEFAULT_MAX_ITERATIONS, DEFAULT_TEMPERATURE};
use parley_core::{Error, Result};
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::tools::ToolRegistry;
use crate::types::*;

pub type AgentStream = Pin<Box<dyn Stream<Item = AgentEvent> + Send>>;

/// A compiled two-node agent graph.
#[derive(Clone)]
pub struct AgentGraph {
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolRegistry>,
    system_prompt: String,
    max_iterations: usize,
    temperature: f64,
}

impl AgentGraph {
    pub fn new(model: Arc<dyn ChatModel>, tools: ToolRegistry, system_prompt: impl Into<String>) -> Self {
        Self {
            model,
            tools: Arc::new(tools),
            system_prompt: system_prompt.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    /// Cap on LLM calls per run.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Messages for the first LLM call: system prompt, history, new input.
    pub fn initial_messages(&self, input: &AgentInput) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(input.chat_history.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt.as_str()));
        messages.extend(input.chat_history.iter().cloned());
        messages.push(ChatMessage::user(input.input.as_str()));
        messages
    }

    /// Run the graph, reporting progress as events.
    ///
    /// With tools registered, a turn's text is only released once the turn
    /// ends without tool calls; with no tools every delta streams immediately.
    pub fn stream(&self, input: AgentInput) -> AgentStream {
        let model = self.model.clone();
        let tools = self.tools.clone();
        let max_iterations = self.max_iterations;
        let temperature = self.temperature;
        let mut messages = self.initial_messages(&input);

        Box::pin(async_stream::stream! {
            let specs = tools.specs();
            let live = specs.is_empty();
            let mut node = Node::Agent;
            let mut iterations = 0usize;
            let mut pending_calls: Vec<ToolCall> = Vec::new();
            let mut output = String::new();

            loop {
                match node {
                    Node::Agent => {
                        if iterations >= max_iterations {
                            warn!("Agent stopped after {} iterations", iterations);
                            yield AgentEvent::Error {
                                message: format!("Agent stopped after {} iterations", iterations),
                            };
                            return;
                        }
                        iterations += 1;
                        debug!("Agent iteration {} with {} messages", iterations, messages.len());

                        let request = ChatRequest::new(messages.clone())
                            .with_tools(specs.clone())
                            .with_temperature(temperature);
                        let mut llm = model.stream(request);

                        let mut turn_text = String::new();
                        let mut held: Vec<String> = Vec::new();
                        let mut calls: Vec<ToolCall> = Vec::new();

                        while let Some(chunk) = llm.next().await {
                            match chunk {
                                StreamChunk::Token(text) => {
                                    turn_text.push_str(&text);
                                    if live {
                                        yield AgentEvent::Output { content: text };
                                    } else {
                                        held.push(text);
                                    }
                                }
                                StreamChunk::ToolCalls(c) => calls.extend(c),
                                StreamChunk::Done { .. } => break,
                                StreamChunk::Error(e) => {
                                    yield AgentEvent::Error { message: e };
                                    return;
                                }
                            }
                        }

                        if calls.is_empty() {
                            for text in held {
                                yield AgentEvent::Output { content: text };
                            }
                            output = turn_text;
                            node = Node::End;
                        } else {
                            messages.push(ChatMessage::assistant_tool_calls(turn_text, calls.clone()));
                            pending_calls = calls;
                            node = Node::Tools;
                        }
                    }
                    Node::Tools => {
                        for call in std::mem::take(&mut pending_calls) {
                            info!("Agent calling tool '{}'", call.name);
                            yield AgentEvent::ToolStart {
                                name: call.name.clone(),
                                arguments: call.arguments.clone(),
                            };
                            let observation = tools.dispatch(&call).await;
                            yield AgentEvent::ToolEnd {
                                name: call.name.clone(),
                                output: observation.clone(),
                            };
                            messages.push(ChatMessage::tool_result(call.id, observation));
                        }
                        node = Node::Agent;
                    }
                    Node::End => {
                        yield AgentEvent::Finished { output: output.clone(), iterations };
                        return;
                    }
                }
            }
        })
    }

    /// Run the graph to completion.
    pub async fn invoke(&self, input: AgentInput) -> Result<AgentOutcome> {
        let mut stream = self.stream(input);
        let mut outcome = AgentOutcome::default();
        let mut pending: Option<(String, String)> = None;

        while let Some(event) = stream.next().await {
            match event {
                AgentEvent::ToolStart { name, arguments } => pending = Some((name, arguments)),
                AgentEvent::ToolEnd { name, output } => {
                    let arguments = pending
                        .take()
                        .filter(|(n, _)| *n == name)
                        .map(|(_, a)| a)
                        .unwrap_or_default();
                    outcome.tool_calls.push(ToolInvocation {
                        name,
                        arguments,
                        output,
                    });
                }
                AgentEvent::Output { .. } => {}
                AgentEvent::Finished { output, iterations } => {
                    outcome.output = output;
                    outcome.iterations = iterations;
                    return Ok(outcome);
                }
                AgentEvent::Error { message } => return Err(Error::Llm(message)),
            }
        }

        Err(Error::Internal("Agent stream ended without a result".into()))
    }
}
