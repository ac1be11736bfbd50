//! # x402-rag
//!
//! Payment-gated content retrieval over HTTP 402 micropayments.
//!
//! Content owners index priced documents; the server splits them into
//! chunks, allocates the document price across chunks pro rata by
//! character count, and gates retrieval behind the x402 handshake:
//! request, 402 challenge, signed payment proof, resend, release.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  POST /docs/search   ┌────────────────────────────┐
//! │ RagClient  │ ───────────────────► │ server                     │
//! │            │ ◄─── 402 challenge ─ │  ├─ store (DocStore)       │
//! │  X402Payer │                      │  ├─ pricing / index        │
//! │            │ ── X-PAYMENT ──────► │  ├─ PaymentVerifier        │
//! │            │ ◄─ chunks + receipt─ │  └─ ledger (Ledger)        │
//! └────────────┘                      └────────────────────────────┘
//! ```
//!
//! Pricing is exact integer arithmetic in asset base units: chunk prices
//! always sum to the document price, and a payment is accepted only if
//! it matches its challenge field for field.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod index;
pub mod payment;
pub mod pricing;
pub mod protocol;
pub mod server;
pub mod splitter;
pub mod store;

pub use auth::Identity;
pub use client::{RagClient, RetrievalOutcome, X402Payer};
pub use config::{ClientConfig, NetworkId, ServerConfig, SettlementMode, X402Config};
pub use error::{Error, RejectReason, Result};
pub use index::{Chunk, Document, Indexer};
pub use payment::{PaymentVerifier, SettlementReceipt};
pub use splitter::{CharacterSplitter, TextSplitter};
pub use store::{DocStore, MemoryStore, SearchFilters};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
