//! Document and chunk data model, plus the indexing pipeline.
//!
//! A document is immutable once indexed: its ordered chunks carry stable
//! ids derived from `(doc_id, index)`, a character count, and a price in
//! asset base units allocated by [`crate::pricing`]. Re-indexing the same
//! source replaces the document wholesale.

use crate::error::{Error, Result};
use crate::pricing::{allocate_chunk_prices, usd_to_base_units};
use crate::splitter::TextSplitter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

/// A contiguous, indexed span of a document's text: the unit of both
/// retrieval and pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable chunk identifier, derived from `(doc_id, index)`.
    pub chunk_id: String,
    /// Owning document identifier.
    pub doc_id: String,
    /// Position within the document (0-based, contiguous).
    pub index: u32,
    /// Chunk text.
    pub text: String,
    /// Character count of `text`.
    pub chars: usize,
    /// Price in asset base units.
    pub price: u64,
    /// Source reference of the owning document.
    pub source: String,
}

/// An indexed document with its priced chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Document identifier, derived from the source reference.
    pub doc_id: String,
    /// Source reference (path, URL, or other owner-provided handle).
    pub source: String,
    /// Ordered chunks. `chunks[i].index == i`.
    pub chunks: Vec<Chunk>,
    /// Total price in asset base units. Equals the sum of chunk prices.
    pub total_price: u64,
    /// Total character count. Equals the sum of chunk character counts.
    pub total_chars: usize,
}

/// Derive a document id from its canonical source string.
#[must_use]
pub fn doc_id_from_source(source: &str) -> String {
    hex::encode(Sha256::digest(source.as_bytes()))
}

/// Derive the stable chunk id for `(doc_id, index)`.
///
/// Retrieval-time range requests recompute these ids without a lookup,
/// so they must stay in lockstep with indexing.
#[must_use]
pub fn stable_chunk_id(doc_id: &str, index: u32) -> String {
    let digest = Sha256::digest(format!("{doc_id}:{index}").as_bytes());
    hex::encode(&digest[..16])
}

/// Indexing pipeline: split, price, stamp.
pub struct Indexer {
    splitter: Box<dyn TextSplitter>,
    asset_decimals: u8,
}

impl Indexer {
    /// Create an indexer using the given splitter and asset precision.
    #[must_use]
    pub fn new(splitter: Box<dyn TextSplitter>, asset_decimals: u8) -> Self {
        Self {
            splitter,
            asset_decimals,
        }
    }

    /// Index one document from already-extracted text.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPricingInput` if the document is priced but splits
    /// to no text. Nothing is persisted on error; the caller only stores
    /// the returned document.
    pub fn index_document(
        &self,
        source: &str,
        content: &str,
        price_usd: f64,
    ) -> Result<Document> {
        let doc_id = doc_id_from_source(source);
        let total_price = usd_to_base_units(price_usd, self.asset_decimals)?;

        let texts = self.splitter.split(content);
        if texts.is_empty() && total_price > 0 {
            return Err(Error::InvalidPricingInput(format!(
                "document {source} has no content to allocate its price over"
            )));
        }

        let chars: Vec<usize> = texts.iter().map(|t| t.chars().count()).collect();
        let prices = allocate_chunk_prices(total_price, &chars)?;
        let total_chars: usize = chars.iter().sum();

        let chunks: Vec<Chunk> = texts
            .into_iter()
            .zip(chars.iter().zip(prices.iter()))
            .enumerate()
            .map(|(i, (text, (chars, price)))| {
                #[allow(clippy::cast_possible_truncation)]
                let index = i as u32;
                Chunk {
                    chunk_id: stable_chunk_id(&doc_id, index),
                    doc_id: doc_id.clone(),
                    index,
                    text,
                    chars: *chars,
                    price: *price,
                    source: source.to_string(),
                }
            })
            .collect();

        debug!(
            "Indexed {} into {} chunks ({} chars, {} base units)",
            source,
            chunks.len(),
            total_chars,
            total_price
        );

        Ok(Document {
            doc_id,
            source: source.to_string(),
            chunks,
            total_price,
            total_chars,
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::splitter::CharacterSplitter;

    fn test_indexer() -> Indexer {
        Indexer::new(Box::new(CharacterSplitter::new(300, 0)), 6)
    }

    #[test]
    fn test_index_document_invariants() {
        let indexer = test_indexer();
        let content = format!("{}\n\n{}", "a".repeat(100), "b".repeat(300));

        let doc = indexer
            .index_document("docs/a.md", &content, 0.01)
            .expect("index");

        assert_eq!(doc.total_price, 10_000);
        assert_eq!(doc.total_chars, 400);
        assert_eq!(doc.chunks.len(), 2);
        assert_eq!(doc.chunks[0].price, 2500);
        assert_eq!(doc.chunks[1].price, 7500);
        assert_eq!(
            doc.chunks.iter().map(|c| c.price).sum::<u64>(),
            doc.total_price
        );
        assert_eq!(
            doc.chunks.iter().map(|c| c.chars).sum::<usize>(),
            doc.total_chars
        );
        for (i, chunk) in doc.chunks.iter().enumerate() {
            assert_eq!(chunk.index as usize, i);
            assert_eq!(chunk.chunk_id, stable_chunk_id(&doc.doc_id, chunk.index));
        }
    }

    #[test]
    fn test_priced_empty_document_fails() {
        let indexer = test_indexer();
        let result = indexer.index_document("docs/empty.md", "", 0.01);
        assert!(matches!(result, Err(Error::InvalidPricingInput(_))));
    }

    #[test]
    fn test_free_empty_document_is_fine() {
        let indexer = test_indexer();
        let doc = indexer
            .index_document("docs/empty.md", "", 0.0)
            .expect("index");
        assert!(doc.chunks.is_empty());
        assert_eq!(doc.total_price, 0);
    }

    #[test]
    fn test_stable_ids_are_deterministic() {
        let a = stable_chunk_id("doc", 0);
        let b = stable_chunk_id("doc", 0);
        let c = stable_chunk_id("doc", 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(doc_id_from_source("x"), doc_id_from_source("x"));
    }
}
