//! Shared application state.

use std::sync::Arc;

use parley_chat::prompts::AGENT_SYSTEM_PROMPT;
use parley_chat::{ChatModel, Embedder, OpenAiCompatModel, OpenAiEmbedder};
use parley_core::ParleyConfig;
use parley_ingest::{load_documents, RecursiveChunker, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use parley_resolve::{HybridRetriever, Retriever};
use parley_runtime::{AgentGraph, MovieSearchTool, ToolRegistry};
use parley_store::{ConversationStore, InMemoryConversationStore};
use tracing::{info, warn};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: ParleyConfig,
    pub store: Arc<dyn ConversationStore>,
    /// `None` when no LLM endpoint is configured.
    pub model: Option<Arc<dyn ChatModel>>,
    pub retriever: Option<Arc<dyn Retriever>>,
    pub agent: Option<AgentGraph>,
}

impl AppState {
    /// Assemble state around an in-memory store. The agent is built from the
    /// model, with the movie search tool when a retriever is present.
    pub fn new(
        config: ParleyConfig,
        model: Option<Arc<dyn ChatModel>>,
        retriever: Option<Arc<dyn Retriever>>,
    ) -> Self {
        let agent = model
            .as_ref()
            .map(|model| build_agent(&config, model.clone(), retriever.clone()));

        Self {
            config,
            store: Arc::new(InMemoryConversationStore::new()),
            model,
            retriever,
            agent,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = store;
        self
    }

    /// Build everything the configuration asks for: upstream client,
    /// document index, agent.
    pub async fn from_config(config: ParleyConfig) -> Self {
        let client = reqwest::Client::new();
        let model = build_model(&config, client.clone());
        let retriever = build_retriever(&config, client).await;
        Self::new(config, model, retriever)
    }
}

/// Chat client for the configured endpoint, if any.
pub fn build_model(config: &ParleyConfig, client: reqwest::Client) -> Option<Arc<dyn ChatModel>> {
    let Some(endpoint) = config.endpoint.as_ref() else {
        warn!(
            "No credentials for OPENAI_HOST={}, LLM routes will be unavailable",
            config.host
        );
        return None;
    };
    info!(
        "Using {} model '{}' at {}",
        endpoint.host, endpoint.model, endpoint.base_url
    );
    let model = OpenAiCompatModel::from_endpoint(client, endpoint).with_temperature(config.temperature);
    Some(Arc::new(model))
}

/// Index the configured documents. Failures leave the server without a
/// retriever rather than stopping startup.
pub async fn build_retriever(
    config: &ParleyConfig,
    client: reqwest::Client,
) -> Option<Arc<dyn Retriever>> {
    let path = config.documents_path.as_ref()?;

    let documents = match load_documents(path) {
        Ok(docs) if !docs.is_empty() => docs,
        Ok(_) => {
            warn!("No documents found at {}", path.display());
            return None;
        }
        Err(e) => {
            warn!("Failed to load documents from {}: {}", path.display(), e);
            return None;
        }
    };

    let chunks = RecursiveChunker::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP).split_documents(&documents);
    info!("Loaded {} documents, {} chunks", documents.len(), chunks.len());

    let embedder = config
        .endpoint
        .as_ref()
        .map(|endpoint| Arc::new(OpenAiEmbedder::from_endpoint(client, endpoint)) as Arc<dyn Embedder>);

    Some(Arc::new(HybridRetriever::build(chunks, embedder).await))
}

fn build_agent(
    config: &ParleyConfig,
    model: Arc<dyn ChatModel>,
    retriever: Option<Arc<dyn Retriever>>,
) -> AgentGraph {
    let mut tools = ToolRegistry::new();
    if let Some(retriever) = retriever {
        tools.register(Arc::new(MovieSearchTool::new(retriever)));
    }
    info!("Agent ready with tools: {:?}", tools.names());

    AgentGraph::new(model, tools, AGENT_SYSTEM_PROMPT)
        .with_max_iterations(config.max_iterations)
        .with_temperature(config.temperature)
}

