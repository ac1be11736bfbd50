//! HTTP server for payment-gated retrieval.
//!
//! Three endpoints, all JSON over POST:
//!
//! * `/docs/index` indexes priced documents
//! * `/docs/search` runs a similarity search over indexed chunks
//! * `/docs/chunks` reads a contiguous chunk range of one document
//!
//! Retrieval endpoints are gated: the first request is answered with a
//! 402 challenge quoting the exact result set, and the resend carrying a
//! valid `X-PAYMENT` proof releases that set.

mod handlers;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::index::Indexer;
use crate::payment::{ChallengeStore, Ledger, MemoryChallengeStore, PaymentVerifier};
use crate::splitter::CharacterSplitter;
use crate::store::DocStore;
use axum::routing::post;
use axum::Router;
use parking_lot::RwLock;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// Per-payer record of settled chunk purchases.
///
/// A payer is never challenged twice for the same chunk; repeat
/// retrievals of owned chunks quote zero and release immediately.
#[derive(Default)]
pub struct PurchaseLog {
    inner: RwLock<HashMap<String, HashSet<String>>>,
}

impl PurchaseLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record settled chunk ids for a payer.
    pub fn record(&self, payer: &str, chunk_ids: &[String]) {
        let mut inner = self.inner.write();
        let owned = inner.entry(payer.to_string()).or_default();
        for id in chunk_ids {
            owned.insert(id.clone());
        }
    }

    /// Whether the payer has already settled this chunk.
    #[must_use]
    pub fn owns(&self, payer: &str, chunk_id: &str) -> bool {
        self.inner
            .read()
            .get(payer)
            .is_some_and(|owned| owned.contains(chunk_id))
    }
}

/// Shared state behind the HTTP handlers.
pub struct AppState {
    pub(crate) config: ServerConfig,
    pub(crate) store: Arc<dyn DocStore>,
    pub(crate) indexer: Indexer,
    pub(crate) challenges: Arc<dyn ChallengeStore>,
    pub(crate) verifier: PaymentVerifier,
    pub(crate) purchases: PurchaseLog,
}

impl AppState {
    /// Assemble server state from configuration and its two external
    /// collaborators, the document store and the settlement ledger.
    #[must_use]
    pub fn new(config: ServerConfig, store: Arc<dyn DocStore>, ledger: Arc<dyn Ledger>) -> Self {
        let challenges: Arc<dyn ChallengeStore> = Arc::new(MemoryChallengeStore::new());
        let verifier =
            PaymentVerifier::new(Arc::clone(&challenges), ledger, config.x402.clone());
        let indexer = Indexer::new(
            Box::new(CharacterSplitter::new(
                config.chunk_size,
                config.chunk_overlap,
            )),
            config.x402.asset_decimals,
        );

        Self {
            config,
            store,
            indexer,
            challenges,
            verifier,
            purchases: PurchaseLog::new(),
        }
    }
}

/// Build the application router.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/docs/index", post(handlers::index_docs))
        .route("/docs/search", post(handlers::search))
        .route("/docs/chunks", post(handlers::chunk_range))
        .with_state(state)
}

/// Bind and serve until the task is cancelled.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the listener
/// cannot be bound.
pub async fn run(config: ServerConfig, store: Arc<dyn DocStore>, ledger: Arc<dyn Ledger>) -> Result<()> {
    config.validate()?;
    let addr = format!("{}:{}", config.host, config.port);
    let payments = config.x402.enabled;

    let state = Arc::new(AppState::new(config, store, ledger));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        "Listening on {} (payments {})",
        listener.local_addr()?,
        if payments { "enabled" } else { "disabled" }
    );

    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Fingerprint a request as `sha256(path || canonical body json)`.
///
/// Both the challenged request and its paid resend parse to the same
/// body value, so they fingerprint identically; any change to the body
/// produces a different fingerprint and fails verification.
pub(crate) fn request_fingerprint<T: Serialize>(path: &str, body: &T) -> Result<String> {
    let json =
        serde_json::to_vec(body).map_err(|e| crate::Error::Serialization(e.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update(&json);
    Ok(hex::encode(hasher.finalize()))
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
