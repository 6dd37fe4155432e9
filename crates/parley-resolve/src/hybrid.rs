//! Hybrid retriever: vector search when embeddings are available, BM25 otherwise.

use std::sync::Arc;

use async_trait::async_trait;
use parley_chat::Embedder;
use parley_core::Result;
use parley_ingest::Chunk;
use tracing::{debug, info, warn};

use crate::keyword::KeywordIndex;
use crate::types::ScoredChunk;
use crate::vector::VectorIndex;
use crate::Retriever;

const EMBED_BATCH: usize = 64;

struct VectorBackend {
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
}

/// Retriever over a fixed chunk set.
pub struct HybridRetriever {
    keyword: KeywordIndex,
    vector: Option<VectorBackend>,
}

impl HybridRetriever {
    /// Keyword-only retriever.
    pub fn keyword_only(chunks: Vec<Chunk>) -> Self {
        info!("Built keyword index over {} chunks", chunks.len());
        Self {
            keyword: KeywordIndex::build(chunks),
            vector: None,
        }
    }

    /// Embed every chunk up front. If embedding fails the retriever still
    /// works, keyword-only.
    pub async fn build(chunks: Vec<Chunk>, embedder: Option<Arc<dyn Embedder>>) -> Self {
        let Some(embedder) = embedder else {
            return Self::keyword_only(chunks);
        };

        match embed_chunks(&chunks, embedder.as_ref()).await {
            Ok(embeddings) => match VectorIndex::build(chunks.clone(), embeddings) {
                Ok(index) => {
                    info!(
                        "Built vector index over {} chunks, dim={}",
                        index.len(),
                        index.dim()
                    );
                    Self {
                        keyword: KeywordIndex::build(chunks),
                        vector: Some(VectorBackend { index, embedder }),
                    }
                }
                Err(e) => {
                    warn!("Vector index unavailable, using keyword search: {}", e);
                    Self::keyword_only(chunks)
                }
            },
            Err(e) => {
                warn!("Embedding chunks failed, using keyword search: {}", e);
                Self::keyword_only(chunks)
            }
        }
    }

    pub fn has_vectors(&self) -> bool {
        self.vector.is_some()
    }

    pub fn len(&self) -> usize {
        self.keyword.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyword.is_empty()
    }
}

async fn embed_chunks(chunks: &[Chunk], embedder: &dyn Embedder) -> Result<Vec<Vec<f32>>> {
    let mut embeddings = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(EMBED_BATCH) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        embeddings.extend(embedder.embed(&texts).await?);
    }
    Ok(embeddings)
}

#[async_trait]
impl Retriever for HybridRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        if let Some(backend) = &self.vector {
            match backend.embedder.embed(&[query.to_string()]).await {
                Ok(mut vectors) if !vectors.is_empty() => {
                    let query_vec = vectors.swap_remove(0);
                    let results = backend.index.search(&query_vec, k)?;
                    debug!("Vector search returned {} chunks", results.len());
                    return Ok(results);
                }
                Ok(_) => warn!("Embedder returned no vector for query, using keyword search"),
                Err(e) => warn!("Query embedding failed, using keyword search: {}", e),
            }
        }

        let results = self.keyword.search(query, k);
        debug!("Keyword search returned {} chunks", results.len());
        Ok(results)
    }
}
