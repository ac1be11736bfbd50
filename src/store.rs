//! Document store seam.
//!
//! The similarity-search backend is an external collaborator: the server
//! only needs the three operations in [`DocStore`]. `MemoryStore` is the
//! built-in implementation backed by naive token-overlap scoring; a real
//! deployment swaps in a vector store behind the same trait.

use crate::error::Result;
use crate::index::{Chunk, Document};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Metadata filters applied to a similarity search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Restrict to a single document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    /// Restrict to a single source reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl SearchFilters {
    fn matches(&self, chunk: &Chunk) -> bool {
        if let Some(doc_id) = &self.doc_id {
            if &chunk.doc_id != doc_id {
                return false;
            }
        }
        if let Some(source) = &self.source {
            if &chunk.source != source {
                return false;
            }
        }
        true
    }
}

/// Storage and retrieval operations the server depends on.
#[async_trait]
pub trait DocStore: Send + Sync {
    /// Add (or replace) an indexed document.
    async fn add_document(&self, doc: Document) -> Result<()>;

    /// Fetch chunks by id, preserving the requested order. Unknown ids are
    /// silently skipped.
    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Chunk>>;

    /// Return the top-`k` chunks for `query` after applying `filters`.
    async fn search(
        &self,
        query: &str,
        k: usize,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<Chunk>>;
}

/// In-memory document store with token-overlap relevance scoring.
///
/// Scoring counts distinct lowercase query tokens present in the chunk
/// text. It is a stand-in for a real similarity backend, good enough for
/// tests and local development.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    documents: HashMap<String, Document>,
    chunks: HashMap<String, Chunk>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed documents.
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.inner.read().documents.len()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[async_trait]
impl DocStore for MemoryStore {
    async fn add_document(&self, doc: Document) -> Result<()> {
        let mut inner = self.inner.write();

        // Re-indexing replaces the previous version's chunks entirely.
        if let Some(old) = inner.documents.remove(&doc.doc_id) {
            for chunk in &old.chunks {
                inner.chunks.remove(&chunk.chunk_id);
            }
            debug!("Replacing previously indexed document {}", doc.doc_id);
        }

        for chunk in &doc.chunks {
            inner.chunks.insert(chunk.chunk_id.clone(), chunk.clone());
        }
        inner.documents.insert(doc.doc_id.clone(), doc);
        Ok(())
    }

    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Chunk>> {
        let inner = self.inner.read();
        Ok(ids
            .iter()
            .filter_map(|id| inner.chunks.get(id).cloned())
            .collect())
    }

    async fn search(
        &self,
        query: &str,
        k: usize,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<Chunk>> {
        let query_tokens = tokenize(query);
        let inner = self.inner.read();

        let mut scored: Vec<(usize, &Chunk)> = inner
            .chunks
            .values()
            .filter(|chunk| filters.map_or(true, |f| f.matches(chunk)))
            .map(|chunk| {
                let text = chunk.text.to_lowercase();
                let score = query_tokens.iter().filter(|t| text.contains(*t)).count();
                (score, chunk)
            })
            .filter(|(score, _)| *score > 0)
            .collect();

        // Stable order: score desc, then document and position.
        scored.sort_by(|(sa, ca), (sb, cb)| {
            sb.cmp(sa)
                .then_with(|| ca.doc_id.cmp(&cb.doc_id))
                .then_with(|| ca.index.cmp(&cb.index))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, chunk)| chunk.clone())
            .collect())
    }
}
