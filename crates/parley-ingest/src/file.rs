//! Loading plain-text documents from disk.

use std::path::Path;

use parley_core::{Error, Result};
use tracing::{debug, warn};

use crate::types::{Document, DocumentMetadata};

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "rst", "csv"];

/// Load one UTF-8 text file as a document.
pub fn load_text(path: &Path) -> Result<Document> {
    let text = std::fs::read_to_string(path)?;
    if looks_binary(&text) {
        return Err(Error::InvalidRequest(format!(
            "{} does not look like a text file",
            path.display()
        )));
    }

    debug!("Loaded {} ({} chars)", path.display(), text.chars().count());
    Ok(Document {
        text,
        metadata: DocumentMetadata {
            source: path.display().to_string(),
            filename: path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.to_string()),
        },
    })
}

/// Load a single file, or every text file directly inside a directory
/// (sorted by name so chunk order is stable).
pub fn load_documents(path: &Path) -> Result<Vec<Document>> {
    if path.is_file() {
        return Ok(vec![load_text(path)?]);
    }

    let mut entries: Vec<_> = std::fs::read_dir(path)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_text_extension(p))
        .collect();
    entries.sort();

    let mut documents = Vec::with_capacity(entries.len());
    for entry in entries {
        match load_text(&entry) {
            Ok(doc) => documents.push(doc),
            Err(e) => warn!("Skipping {}: {}", entry.display(), e),
        }
    }
    Ok(documents)
}

fn is_text_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TEXT_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn looks_binary(content: &str) -> bool {
    content
        .chars()
        .filter(|c| c.is_control() && *c != '\n' && *c != '\r' && *c != '\t')
        .count()
        > content.len() / 10
}
