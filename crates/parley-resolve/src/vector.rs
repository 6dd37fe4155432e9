//! Dense vector index with cosine similarity.

use ndarray::{Array1, Array2, Axis};
use parley_core::{Error, Result};
use parley_ingest::Chunk;

use crate::types::{ResolverKind, ScoredChunk};

/// Row-normalized embedding matrix, shape (N, dim).
pub struct VectorIndex {
    chunks: Vec<Chunk>,
    matrix: Array2<f32>,
}

impl VectorIndex {
    /// Build from chunks and their embeddings (same order, same length).
    pub fn build(chunks: Vec<Chunk>, embeddings: Vec<Vec<f32>>) -> Result<Self> {
        if chunks.len() != embeddings.len() {
            return Err(Error::Retrieval(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }
        let dim = embeddings.first().map(|e| e.len()).unwrap_or(0);
        if embeddings.iter().any(|e| e.len() != dim) {
            return Err(Error::Retrieval("Embeddings have mixed dimensions".into()));
        }

        let flat: Vec<f32> = embeddings.into_iter().flatten().collect();
        let mut matrix = Array2::from_shape_vec((chunks.len(), dim), flat)
            .map_err(|e| Error::Retrieval(e.to_string()))?;
        for mut row in matrix.axis_iter_mut(Axis(0)) {
            let norm = row.dot(&row).sqrt();
            if norm > 0.0 {
                row /= norm;
            }
        }

        Ok(Self { chunks, matrix })
    }

    pub fn dim(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Top `k` chunks by cosine similarity to `query`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if self.chunks.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dim() {
            return Err(Error::Retrieval(format!(
                "Query has dimension {}, index has {}",
                query.len(),
                self.dim()
            )));
        }

        let mut q = Array1::from_vec(query.to_vec());
        let norm = q.dot(&q).sqrt();
        if norm > 0.0 {
            q /= norm;
        }
        let scores = self.matrix.dot(&q);

        let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        ranked.truncate(k);

        Ok(ranked
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.chunks[i].clone(),
                score: score as f64,
                resolver: ResolverKind::Vector,
            })
            .collect())
    }
}
