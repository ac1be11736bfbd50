//! End-to-end tests: real server, real client, full 402 handshake.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use x402_rag::auth::build_auth_header;
use x402_rag::payment::{sign_payment, InstantLedger, PaymentRequiredBody, UnsignedPayment};
use x402_rag::protocol::{ChunkRangeRequest, DocumentToIndex, SearchRequest};
use x402_rag::server::{router, AppState};
use x402_rag::store::MemoryStore;
use x402_rag::{ClientConfig, Error, Identity, RagClient, RejectReason, ServerConfig};

const MERCHANT: &str = "merchant-wallet";

fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.chunk_size = 300;
    config.chunk_overlap = 0;
    config.x402.pay_to = Some(MERCHANT.to_string());
    config
}

async fn spawn_server(config: ServerConfig) -> (String, Arc<InstantLedger>) {
    config.validate().expect("valid config");
    let ledger = Arc::new(InstantLedger::new());
    let store = Arc::new(MemoryStore::new());
    let state = Arc::new(AppState::new(config, store, ledger.clone()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.expect("serve");
    });

    (format!("http://{addr}"), ledger)
}

fn paying_client(base_url: &str) -> RagClient {
    let identity = Identity::generate();
    let mut config = ClientConfig::new(base_url);
    config.identity_hex = Some(identity.secret_hex());
    RagClient::new(config).expect("client")
}

/// Two paragraphs that split into chunks of 100 and 300 characters, so a
/// 0.01 USD document prices them at 2500 and 7500 base units.
fn two_chunk_doc() -> DocumentToIndex {
    DocumentToIndex {
        source: "docs/guide.md".to_string(),
        content: format!("{}\n\n{}", "a".repeat(100), "b".repeat(300)),
        price_usd: 0.01,
    }
}

#[tokio::test]
async fn test_search_pays_for_exactly_what_it_returns() {
    let (base_url, ledger) = spawn_server(test_config()).await;
    let client = paying_client(&base_url);

    let indexed = client
        .index_docs(vec![two_chunk_doc()])
        .await
        .expect("index");
    assert_eq!(indexed.indexed.len(), 1);
    assert_eq!(indexed.indexed[0].chunks_count, 2);

    let outcome = client
        .search(&SearchRequest {
            query: "bbb".to_string(),
            k: 1,
            filters: None,
        })
        .await
        .expect("paid search");

    assert_eq!(outcome.result.total, 1);
    assert_eq!(outcome.result.chunks[0].text, "b".repeat(300));
    assert_eq!(outcome.result.chunks[0].metadata.price, 7500);

    let receipt = outcome.payment.expect("receipt");
    assert!(receipt.success);
    assert_eq!(receipt.amount, 7500);
    assert_eq!(receipt.payer, client.address().expect("address"));
    assert_eq!(ledger.total_to(MERCHANT), 7500);
}

#[tokio::test]
async fn test_owned_chunks_are_not_charged_twice() {
    let (base_url, ledger) = spawn_server(test_config()).await;
    let client = paying_client(&base_url);
    client
        .index_docs(vec![two_chunk_doc()])
        .await
        .expect("index");

    let request = SearchRequest {
        query: "bbb".to_string(),
        k: 1,
        filters: None,
    };
    let first = client.search(&request).await.expect("first search");
    assert!(first.payment.is_some());

    let second = client.search(&request).await.expect("second search");
    assert!(second.payment.is_none());
    assert_eq!(second.result.total, 1);
    assert_eq!(ledger.total_to(MERCHANT), 7500);
}

#[tokio::test]
async fn test_chunk_range_pays_remaining_chunk() {
    let (base_url, ledger) = spawn_server(test_config()).await;
    let client = paying_client(&base_url);
    let indexed = client
        .index_docs(vec![two_chunk_doc()])
        .await
        .expect("index");
    let doc_id = indexed.indexed[0].doc_id.clone();

    let outcome = client
        .get_chunk_range(&ChunkRangeRequest {
            doc_id: doc_id.clone(),
            start_chunk: 0,
            end_chunk: Some(0),
        })
        .await
        .expect("first chunk");
    assert_eq!(outcome.result.total, 1);
    assert_eq!(outcome.result.chunks[0].text, "a".repeat(100));
    assert_eq!(outcome.payment.expect("receipt").amount, 2500);

    // Whole document: the first chunk is owned, only the second is charged.
    let outcome = client
        .get_chunk_range(&ChunkRangeRequest {
            doc_id,
            start_chunk: 0,
            end_chunk: None,
        })
        .await
        .expect("whole doc");
    assert_eq!(outcome.result.total, 2);
    assert_eq!(outcome.payment.expect("receipt").amount, 7500);
    assert_eq!(ledger.total_to(MERCHANT), 10_000);
}

/// `end_chunk` is attacker-controlled; the largest wire value must clamp
/// to the document instead of tripping span arithmetic.
#[tokio::test]
async fn test_range_end_at_u32_max_is_clamped() {
    let (base_url, ledger) = spawn_server(test_config()).await;
    let client = paying_client(&base_url);
    let indexed = client
        .index_docs(vec![two_chunk_doc()])
        .await
        .expect("index");
    let doc_id = indexed.indexed[0].doc_id.clone();

    let outcome = client
        .get_chunk_range(&ChunkRangeRequest {
            doc_id,
            start_chunk: 0,
            end_chunk: Some(u32::MAX),
        })
        .await
        .expect("clamped range");
    assert_eq!(outcome.result.total, 2);
    assert_eq!(outcome.payment.expect("receipt").amount, 10_000);
    assert_eq!(ledger.total_to(MERCHANT), 10_000);
}

#[tokio::test]
async fn test_free_documents_need_no_payment() {
    let (base_url, ledger) = spawn_server(test_config()).await;
    let client = paying_client(&base_url);
    client
        .index_docs(vec![DocumentToIndex {
            source: "docs/free.md".to_string(),
            content: "free knowledge for everyone".to_string(),
            price_usd: 0.0,
        }])
        .await
        .expect("index");

    let outcome = client
        .search(&SearchRequest {
            query: "knowledge".to_string(),
            k: 4,
            filters: None,
        })
        .await
        .expect("free search");

    assert_eq!(outcome.result.total, 1);
    assert!(outcome.payment.is_none());
    assert_eq!(ledger.transfer_count(), 0);
}

#[tokio::test]
async fn test_payments_disabled_releases_priced_content() {
    let mut config = test_config();
    config.x402.enabled = false;
    config.x402.pay_to = None;
    let (base_url, ledger) = spawn_server(config).await;
    let client = paying_client(&base_url);
    client
        .index_docs(vec![two_chunk_doc()])
        .await
        .expect("index");

    let outcome = client
        .search(&SearchRequest {
            query: "bbb".to_string(),
            k: 1,
            filters: None,
        })
        .await
        .expect("search");

    assert_eq!(outcome.result.total, 1);
    assert!(outcome.payment.is_none());
    assert_eq!(ledger.transfer_count(), 0);
}

#[tokio::test]
async fn test_unauthenticated_requests_rejected() {
    let (base_url, _) = spawn_server(test_config()).await;
    let client = RagClient::new(ClientConfig::new(&base_url)).expect("client");

    let result = client
        .search(&SearchRequest {
            query: "anything".to_string(),
            k: 1,
            filters: None,
        })
        .await;
    assert!(matches!(result, Err(Error::Http { status: 401, .. })));
}

#[tokio::test]
async fn test_unknown_document_range_is_404() {
    let (base_url, _) = spawn_server(test_config()).await;
    let client = paying_client(&base_url);

    let result = client
        .get_chunk_range(&ChunkRangeRequest {
            doc_id: "no-such-doc".to_string(),
            start_chunk: 0,
            end_chunk: Some(3),
        })
        .await;
    assert!(matches!(result, Err(Error::Http { status: 404, .. })));
}

/// Drive the handshake by hand with a short-paid proof: the second 402
/// must carry the rejection reason and settle nothing.
#[tokio::test]
async fn test_tampered_amount_is_rejected_terminally() {
    let (base_url, ledger) = spawn_server(test_config()).await;
    let client = paying_client(&base_url);
    client
        .index_docs(vec![two_chunk_doc()])
        .await
        .expect("index");

    let identity = Identity::generate();
    let http = reqwest::Client::new();
    let body = serde_json::json!({"query": "bbb", "k": 1});

    let challenge: PaymentRequiredBody = http
        .post(format!("{base_url}/docs/search"))
        .header(
            reqwest::header::AUTHORIZATION,
            build_auth_header(&identity, "/docs/search").expect("auth"),
        )
        .json(&body)
        .send()
        .await
        .expect("send")
        .json()
        .await
        .expect("402 body");
    let required = &challenge.accepts[0];
    assert_eq!(required.amount, 7500);

    let proof = sign_payment(
        &UnsignedPayment {
            network: required.network,
            asset: required.asset.clone(),
            amount: required.amount - 1,
            pay_to: required.pay_to.clone(),
            nonce: required.nonce.clone(),
        },
        &identity,
    );

    let response = http
        .post(format!("{base_url}/docs/search"))
        .header(
            reqwest::header::AUTHORIZATION,
            build_auth_header(&identity, "/docs/search").expect("auth"),
        )
        .header("X-PAYMENT", proof.to_header().expect("encode"))
        .json(&body)
        .send()
        .await
        .expect("resend");

    assert_eq!(response.status(), reqwest::StatusCode::PAYMENT_REQUIRED);
    let rejection: PaymentRequiredBody = response.json().await.expect("rejection body");
    assert_eq!(
        RejectReason::from_wire(&rejection.error),
        RejectReason::AmountMismatch
    );
    assert_eq!(ledger.transfer_count(), 0);
}

/// A proof signed by someone other than the authenticated requester must
/// not spend the requester's challenge.
#[tokio::test]
async fn test_proof_from_wrong_identity_rejected() {
    let (base_url, _) = spawn_server(test_config()).await;
    let client = paying_client(&base_url);
    client
        .index_docs(vec![two_chunk_doc()])
        .await
        .expect("index");

    let identity = Identity::generate();
    let stranger = Identity::generate();
    let http = reqwest::Client::new();
    let body = serde_json::json!({"query": "bbb", "k": 1});

    let challenge: PaymentRequiredBody = http
        .post(format!("{base_url}/docs/search"))
        .header(
            reqwest::header::AUTHORIZATION,
            build_auth_header(&identity, "/docs/search").expect("auth"),
        )
        .json(&body)
        .send()
        .await
        .expect("send")
        .json()
        .await
        .expect("402 body");
    let required = &challenge.accepts[0];

    let proof = sign_payment(
        &UnsignedPayment {
            network: required.network,
            asset: required.asset.clone(),
            amount: required.amount,
            pay_to: required.pay_to.clone(),
            nonce: required.nonce.clone(),
        },
        &stranger,
    );

    let response = http
        .post(format!("{base_url}/docs/search"))
        .header(
            reqwest::header::AUTHORIZATION,
            build_auth_header(&identity, "/docs/search").expect("auth"),
        )
        .header("X-PAYMENT", proof.to_header().expect("encode"))
        .json(&body)
        .send()
        .await
        .expect("resend");

    assert_eq!(response.status(), reqwest::StatusCode::PAYMENT_REQUIRED);
    let rejection: PaymentRequiredBody = response.json().await.expect("rejection body");
    assert_eq!(
        RejectReason::from_wire(&rejection.error),
        RejectReason::InvalidSignature
    );
}

#[tokio::test]
async fn test_k_is_clamped_server_side() {
    let mut config = test_config();
    config.max_retrieved_chunks = 1;
    // Small chunks so each paragraph stays its own chunk.
    config.chunk_size = 12;
    let (base_url, _) = spawn_server(config).await;
    let client = paying_client(&base_url);
    client
        .index_docs(vec![DocumentToIndex {
            source: "docs/free.md".to_string(),
            content: "alpha words\n\nalpha again\n\nalpha thrice".to_string(),
            price_usd: 0.0,
        }])
        .await
        .expect("index");

    let outcome = client
        .search(&SearchRequest {
            query: "alpha".to_string(),
            k: 50,
            filters: None,
        })
        .await
        .expect("search");
    assert_eq!(outcome.result.total, 1);
}
