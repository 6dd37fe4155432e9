//! Tools the agent can call, and the registry that dispatches them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parley_chat::{ToolCall, ToolSpec};
use parley_core::{Error, Result};
use parley_resolve::{format_documents, Retriever, DEFAULT_TOP_K};
use serde_json::{json, Value};
use tracing::{error, info, warn};

/// A callable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;

    /// Run the tool. The returned text is handed back to the model verbatim.
    async fn call(&self, args: Value) -> Result<String>;
}

/// Registered tools, in registration order.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.spec().name;
        match self.by_name.get(&name) {
            Some(&i) => self.tools[i] = tool,
            None => {
                self.by_name.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.spec().name).collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    /// Run a requested call. Failures become the observation text so the
    /// model can react to them.
    pub async fn dispatch(&self, call: &ToolCall) -> String {
        let Some(&i) = self.by_name.get(&call.name) else {
            warn!("Model requested unknown tool '{}'", call.name);
            return format!("Error: unknown tool '{}'", call.name);
        };

        let args = if call.arguments.trim().is_empty() {
            json!({})
        } else {
            match serde_json::from_str::<Value>(&call.arguments) {
                Ok(v) => v,
                Err(e) => return format!("Error: invalid arguments: {}", e),
            }
        };

        match self.tools[i].call(args).await {
            Ok(output) => output,
            Err(e) => {
                warn!("Tool '{}' failed: {}", call.name, e);
                format!("Error: {}", e)
            }
        }
    }
}

pub const MOVIE_SEARCH_TOOL: &str = "movie_database_search";

/// Searches the movie documents through a retriever.
pub struct MovieSearchTool {
    retriever: Arc<dyn Retriever>,
    k: usize,
}

impl MovieSearchTool {
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self {
            retriever,
            k: DEFAULT_TOP_K,
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }
}

#[async_trait]
impl Tool for MovieSearchTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: MOVIE_SEARCH_TOOL.into(),
            description: "Searches and returns information from the movie database. Use this for \
                          any questions about movies, actors, plots, directors, or release dates. \
                          Input should be the user's question."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "The search query."}
                },
                "required": ["query"],
            }),
        }
    }

    async fn call(&self, args: Value) -> Result<String> {
        let query = match &args {
            Value::String(s) => s.as_str(),
            _ => args["query"]
                .as_str()
                .ok_or_else(|| Error::Tool("missing string argument 'query'".into()))?,
        };
        info!("Tool '{}' invoked with query: '{}'", MOVIE_SEARCH_TOOL, query);

        match self.retriever.retrieve(query, self.k).await {
            Ok(chunks) if chunks.is_empty() => {
                info!("Tool '{}' found no documents", MOVIE_SEARCH_TOOL);
                Ok(String::new())
            }
            Ok(chunks) => {
                let formatted = format_documents(&chunks);
                info!(
                    "Tool '{}' returning {} documents ({} chars)",
                    MOVIE_SEARCH_TOOL,
                    chunks.len(),
                    formatted.len()
                );
                Ok(formatted)
            }
            Err(e) => {
                error!("Retrieval failed in '{}': {}", MOVIE_SEARCH_TOOL, e);
                Ok(String::new())
            }
        }
    }
}
