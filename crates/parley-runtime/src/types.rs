//! Agent input, events and outcome.

use parley_chat::ChatMessage;
use serde::Serialize;

/// Graph node currently being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Node {
    /// LLM call.
    Agent,
    /// Execution of the tool calls requested by the last LLM turn.
    Tools,
    End,
}

/// One agent run: the new user input plus prior turns.
#[derive(Debug, Clone, Default)]
pub struct AgentInput {
    pub input: String,
    pub chat_history: Vec<ChatMessage>,
}

impl AgentInput {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            chat_history: Vec::new(),
        }
    }

    pub fn with_history(mut self, chat_history: Vec<ChatMessage>) -> Self {
        self.chat_history = chat_history;
        self
    }
}

/// Progress reported while the agent runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    ToolStart { name: String, arguments: String },
    ToolEnd { name: String, output: String },
    /// A piece of the final answer.
    Output { content: String },
    Finished { output: String, iterations: usize },
    Error { message: String },
}

/// A tool call made during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: String,
    pub output: String,
}

/// Result of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AgentOutcome {
    pub output: String,
    pub iterations: usize,
    pub tool_calls: Vec<ToolInvocation>,
}
