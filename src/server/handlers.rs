//! Request handlers and the payment gate.

use crate::auth::verify_auth_header;
use crate::error::{Error, RejectReason};
use crate::index::{stable_chunk_id, Chunk};
use crate::payment::{
    generate_nonce, Challenge, ChallengeState, PaymentPayload, PaymentRequiredBody,
    PaymentRequirements, SettlementReceipt,
};
use crate::pricing::quote_amount;
use crate::protocol::{
    ChunkRangeRequest, ErrorBody, IndexRequest, IndexResult, IndexedDocument, RetrievalResult,
    SearchRequest, PAYMENT_HEADER, PAYMENT_RESPONSE_HEADER, X402_VERSION,
};
use crate::server::{request_fingerprint, unix_now, AppState};
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::sync::Arc;
use tracing::{info, warn};

/// `POST /docs/index`: split, price, and store documents.
///
/// All-or-nothing: every document must index cleanly before anything is
/// stored.
pub(super) async fn index_docs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<IndexRequest>,
) -> Response {
    let payer = match authenticate(&state, &headers, "/docs/index") {
        Ok(payer) => payer,
        Err(resp) => return resp,
    };

    let mut docs = Vec::with_capacity(req.documents.len());
    for submitted in &req.documents {
        match state
            .indexer
            .index_document(&submitted.source, &submitted.content, submitted.price_usd)
        {
            Ok(doc) => docs.push(doc),
            Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
        }
    }

    let mut indexed = Vec::with_capacity(docs.len());
    for doc in docs {
        indexed.push(IndexedDocument {
            doc_id: doc.doc_id.clone(),
            source: doc.source.clone(),
            chunks_count: doc.chunks.len(),
        });
        if let Err(e) = state.store.add_document(doc).await {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }
    }

    info!("Indexed {} documents for {payer}", indexed.len());
    Json(IndexResult { indexed }).into_response()
}

/// `POST /docs/search`: payment-gated similarity search.
pub(super) async fn search(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SearchRequest>,
) -> Response {
    let payer = match authenticate(&state, &headers, "/docs/search") {
        Ok(payer) => payer,
        Err(resp) => return resp,
    };
    let fingerprint = match request_fingerprint("/docs/search", &req) {
        Ok(fp) => fp,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    };

    let k = req.k.min(state.config.max_retrieved_chunks);
    let chunks = match state.store.search(&req.query, k, req.filters.as_ref()).await {
        Ok(chunks) => chunks,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    };

    let description = format!("search: {}", req.query);
    gate_and_release(
        &state,
        &payer,
        "/docs/search",
        &fingerprint,
        payment_header(&headers),
        chunks,
        description,
    )
    .await
}

/// `POST /docs/chunks`: payment-gated contiguous chunk range.
pub(super) async fn chunk_range(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ChunkRangeRequest>,
) -> Response {
    let payer = match authenticate(&state, &headers, "/docs/chunks") {
        Ok(payer) => payer,
        Err(resp) => return resp,
    };
    let fingerprint = match request_fingerprint("/docs/chunks", &req) {
        Ok(fp) => fp,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    };

    if let Some(end) = req.end_chunk {
        if end < req.start_chunk {
            return error_response(StatusCode::BAD_REQUEST, "end_chunk precedes start_chunk");
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    let max = state.config.max_retrieved_chunks as u32;
    // Span arithmetic in u64: end_chunk can be u32::MAX on the wire.
    let span = req.end_chunk.map_or(u64::from(max), |end| {
        u64::from(end) - u64::from(req.start_chunk) + 1
    });
    #[allow(clippy::cast_possible_truncation)]
    let count = span.min(u64::from(max)) as u32;

    // Stable ids are recomputed rather than looked up; unknown ids past
    // the document's end simply fetch nothing.
    let ids: Vec<String> = (req.start_chunk..req.start_chunk.saturating_add(count))
        .map(|i| stable_chunk_id(&req.doc_id, i))
        .collect();
    let chunks = match state.store.get_by_ids(&ids).await {
        Ok(chunks) => chunks,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    };
    if chunks.is_empty() {
        return error_response(StatusCode::NOT_FOUND, "no chunks in the requested range");
    }

    let description = format!(
        "chunks {}..{} of {}",
        req.start_chunk,
        req.start_chunk.saturating_add(count),
        req.doc_id
    );
    gate_and_release(
        &state,
        &payer,
        "/docs/chunks",
        &fingerprint,
        payment_header(&headers),
        chunks,
        description,
    )
    .await
}

/// The payment gate shared by the retrieval endpoints.
///
/// Quotes the result set, and either releases it (free, already owned,
/// payments disabled, or freshly settled) or answers 402 with a
/// challenge bound to this exact request.
async fn gate_and_release(
    state: &AppState,
    payer: &str,
    path: &str,
    fingerprint: &str,
    payment: Option<String>,
    chunks: Vec<Chunk>,
    description: String,
) -> Response {
    let quoted_ids: Vec<String> = chunks.iter().map(|c| c.chunk_id.clone()).collect();
    let amount = quote_amount(
        chunks
            .iter()
            .filter(|c| !state.purchases.owns(payer, &c.chunk_id))
            .map(|c| &c.price),
    );

    if !state.config.x402.enabled || amount == 0 {
        return retrieval_response(chunks, None);
    }

    let Some(header_value) = payment else {
        return issue_challenge(state, path, fingerprint, quoted_ids, amount, description);
    };

    let proof = match PaymentPayload::from_header(&header_value) {
        Ok(proof) => proof,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    // The proof must come from the authenticated identity; otherwise a
    // third party could spend someone else's challenge.
    if proof.payer != payer {
        return payment_rejected(state, &proof.nonce, &RejectReason::InvalidSignature);
    }

    match state
        .verifier
        .verify_and_settle(&proof, fingerprint, unix_now())
        .await
    {
        Ok((challenge, receipt)) => {
            state.purchases.record(payer, &challenge.chunk_ids);
            match state.store.get_by_ids(&challenge.chunk_ids).await {
                Ok(released) => retrieval_response(released, Some(&receipt)),
                Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
            }
        }
        Err(Error::PaymentRejected(reason)) => payment_rejected(state, &proof.nonce, &reason),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

fn issue_challenge(
    state: &AppState,
    path: &str,
    fingerprint: &str,
    quoted_ids: Vec<String>,
    amount: u64,
    description: String,
) -> Response {
    let x402 = &state.config.x402;
    let Some(pay_to) = x402.pay_to.clone() else {
        // validate() rules this out at startup.
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "payment recipient not configured",
        );
    };

    let now = unix_now();
    // Opportunistic cleanup; correctness relies on the expiry check at
    // verification time, not on this.
    state.challenges.prune_expired(now);

    let requirements = PaymentRequirements {
        scheme: "exact".to_string(),
        network: x402.network,
        asset: x402.asset.clone(),
        amount,
        pay_to,
        nonce: generate_nonce(),
        expires_at: now + x402.challenge_ttl_secs,
        resource: path.to_string(),
        description,
    };
    let body = PaymentRequiredBody {
        x402_version: X402_VERSION,
        error: "Payment required".to_string(),
        accepts: vec![requirements.clone()],
    };

    state.challenges.issue(Challenge {
        requirements,
        chunk_ids: quoted_ids,
        fingerprint: fingerprint.to_string(),
        state: ChallengeState::Issued,
    });

    (StatusCode::PAYMENT_REQUIRED, Json(body)).into_response()
}

/// 402 answer to a rejected proof. Echoes the original requirements when
/// the challenge is still open so the client can see what was expected.
fn payment_rejected(state: &AppState, nonce: &str, reason: &RejectReason) -> Response {
    warn!("Payment rejected for nonce {nonce}: {reason}");
    let accepts = state
        .challenges
        .get(nonce)
        .filter(|c| c.state == ChallengeState::Issued)
        .map(|c| vec![c.requirements])
        .unwrap_or_default();

    let body = PaymentRequiredBody {
        x402_version: X402_VERSION,
        error: reason.to_string(),
        accepts,
    };
    (StatusCode::PAYMENT_REQUIRED, Json(body)).into_response()
}

fn retrieval_response(chunks: Vec<Chunk>, receipt: Option<&SettlementReceipt>) -> Response {
    let body = RetrievalResult {
        total: chunks.len(),
        chunks: chunks.into_iter().map(Into::into).collect(),
    };
    let mut response = Json(body).into_response();

    if let Some(receipt) = receipt {
        if let Ok(json) = serde_json::to_vec(receipt) {
            if let Ok(value) = HeaderValue::from_str(&STANDARD.encode(json)) {
                response
                    .headers_mut()
                    .insert(PAYMENT_RESPONSE_HEADER, value);
            }
        }
    }
    response
}

fn authenticate(state: &AppState, headers: &HeaderMap, path: &str) -> Result<String, Response> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "missing authorization header"))?;

    verify_auth_header(
        value,
        path,
        state.config.x402.auth_max_ttl_secs,
        state.config.x402.auth_clock_skew_secs,
    )
    .map_err(|e| error_response(StatusCode::UNAUTHORIZED, &e.to_string()))
}

fn payment_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(PAYMENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

fn error_response(status: StatusCode, detail: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            detail: detail.to_string(),
        }),
    )
        .into_response()
}
