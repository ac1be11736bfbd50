//! Wire types shared by the server and the client SDK.
//!
//! Payment-protocol envelopes (402 bodies, proofs, receipts) live in
//! [`crate::payment`]; this module carries the application-level request
//! and response shapes plus the header names and version constant both
//! sides must agree on.

use crate::index::Chunk;
use crate::store::SearchFilters;
use serde::{Deserialize, Serialize};

/// Protocol version carried in 402 bodies and payment proofs.
pub const X402_VERSION: u32 = 1;

/// Request header carrying a base64-encoded payment proof.
pub const PAYMENT_HEADER: &str = "X-PAYMENT";

/// Response header carrying a base64-encoded settlement receipt.
pub const PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";

/// One document submitted for indexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentToIndex {
    /// Owner-provided source reference (path, URL, title).
    pub source: String,
    /// Full document text.
    pub content: String,
    /// Price for the whole document in USD.
    #[serde(default)]
    pub price_usd: f64,
}

/// Body of `POST /docs/index`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRequest {
    /// Documents to index. All-or-nothing: one invalid document fails
    /// the whole request before anything is stored.
    pub documents: Vec<DocumentToIndex>,
}

/// One indexed document in an [`IndexResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedDocument {
    /// Assigned document id.
    pub doc_id: String,
    /// Source reference as submitted.
    pub source: String,
    /// Number of chunks produced.
    pub chunks_count: usize,
}

/// Response of `POST /docs/index`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexResult {
    /// Indexed documents, in submission order.
    pub indexed: Vec<IndexedDocument>,
}

/// Body of `POST /docs/search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free-text query.
    pub query: String,
    /// Number of chunks to retrieve. Clamped server-side.
    #[serde(default = "default_k")]
    pub k: usize,
    /// Optional metadata filters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<SearchFilters>,
}

const fn default_k() -> usize {
    4
}

/// Body of `POST /docs/chunks`: a contiguous chunk range of one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRangeRequest {
    /// Document to read from.
    pub doc_id: String,
    /// First chunk index (inclusive).
    pub start_chunk: u32,
    /// Last chunk index (inclusive). Defaults to the document's last chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_chunk: Option<u32>,
}

/// Retrieval response shared by search and chunk-range requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Number of chunks returned.
    pub total: usize,
    /// The released chunks.
    pub chunks: Vec<ChunkRecord>,
}

/// A released chunk as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Chunk text.
    pub text: String,
    /// Chunk metadata.
    pub metadata: ChunkMetadata,
}

/// Metadata attached to a released chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Source reference of the owning document.
    pub source: String,
    /// Owning document id.
    pub doc_id: String,
    /// Stable chunk id.
    pub chunk_id: String,
    /// Position within the document.
    pub index: u32,
    /// Chunk price in asset base units.
    pub price: u64,
}

impl From<Chunk> for ChunkRecord {
    fn from(chunk: Chunk) -> Self {
        Self {
            metadata: ChunkMetadata {
                source: chunk.source,
                doc_id: chunk.doc_id,
                chunk_id: chunk.chunk_id,
                index: chunk.index,
                price: chunk.price,
            },
            text: chunk.text,
        }
    }
}

/// Error body returned for non-402 failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable error detail.
    pub detail: String,
}
