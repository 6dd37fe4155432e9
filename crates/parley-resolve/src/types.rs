//! Resolver types.

use parley_ingest::Chunk;
use serde::{Deserialize, Serialize};

/// Which index produced a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverKind {
    /// BM25 keyword search.
    Keyword,
    /// Cosine similarity over embeddings.
    Vector,
}

/// A retrieved chunk with its relevance score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f64,
    pub resolver: ResolverKind,
}
