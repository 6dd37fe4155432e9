//! Parley Ingest: document loading and text splitting.

pub mod chunking;
pub mod file;
pub mod types;

pub use chunking::{RecursiveChunker, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
pub use file::{load_documents, load_text};
pub use types::{Chunk, Document, DocumentMetadata};
