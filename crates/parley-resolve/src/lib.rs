//! Parley Resolve: retrieval over document chunks.

pub mod hybrid;
pub mod keyword;
pub mod types;
pub mod vector;

use async_trait::async_trait;
use parley_core::Result;

pub use hybrid::HybridRetriever;
pub use keyword::KeywordIndex;
pub use types::*;
pub use vector::VectorIndex;

/// Default number of chunks handed to the model.
pub const DEFAULT_TOP_K: usize = 3;

/// Finds the chunks most relevant to a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>>;
}

/// Join chunk texts into a single context block.
pub fn format_documents(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
