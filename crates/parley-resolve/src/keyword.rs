//! In-memory BM25 keyword index.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use parley_ingest::Chunk;
use regex::Regex;

use crate::types::{ResolverKind, ScoredChunk};

const K1: f64 = 1.2;
const B: f64 = 0.75;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("valid regex"));

/// Lowercased alphanumeric runs.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

struct IndexedChunk {
    chunk: Chunk,
    term_freqs: HashMap<String, usize>,
    length: usize,
}

/// BM25 over a fixed chunk set.
pub struct KeywordIndex {
    entries: Vec<IndexedChunk>,
    doc_freqs: HashMap<String, usize>,
    avg_len: f64,
}

impl KeywordIndex {
    pub fn build(chunks: Vec<Chunk>) -> Self {
        let mut doc_freqs: HashMap<String, usize> = HashMap::new();
        let mut entries = Vec::with_capacity(chunks.len());
        let mut total_len = 0usize;

        for chunk in chunks {
            let tokens = tokenize(&chunk.text);
            let mut term_freqs: HashMap<String, usize> = HashMap::new();
            for token in &tokens {
                *term_freqs.entry(token.clone()).or_insert(0) += 1;
            }
            for term in term_freqs.keys() {
                *doc_freqs.entry(term.clone()).or_insert(0) += 1;
            }
            total_len += tokens.len();
            entries.push(IndexedChunk {
                chunk,
                term_freqs,
                length: tokens.len(),
            });
        }

        let avg_len = if entries.is_empty() {
            0.0
        } else {
            total_len as f64 / entries.len() as f64
        };

        Self {
            entries,
            doc_freqs,
            avg_len,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top `k` chunks by BM25 score. Chunks sharing no term with the query are excluded.
    pub fn search(&self, query: &str, k: usize) -> Vec<ScoredChunk> {
        let terms: HashSet<String> = tokenize(query).into_iter().collect();
        if terms.is_empty() || self.entries.is_empty() || k == 0 {
            return Vec::new();
        }

        let n = self.entries.len() as f64;
        let mut scored: Vec<(usize, f64)> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| {
                let score: f64 = terms
                    .iter()
                    .filter_map(|term| {
                        let tf = *entry.term_freqs.get(term)? as f64;
                        let df = *self.doc_freqs.get(term)? as f64;
                        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                        let norm = 1.0 - B + B * entry.length as f64 / self.avg_len.max(1.0);
                        Some(idf * tf * (K1 + 1.0) / (tf + K1 * norm))
                    })
                    .sum();
                (score > 0.0).then_some((i, score))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.entries[i].chunk.clone(),
                score,
                resolver: ResolverKind::Keyword,
            })
            .collect()
    }
}
