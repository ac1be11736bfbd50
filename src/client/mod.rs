//! Client SDK: an HTTP client that pays 402 challenges transparently.
//!
//! Every request is authenticated with the configured identity. When a
//! retrieval request is answered with 402, the client builds and signs a
//! payment proof from the challenge and resends the identical request
//! once with the proof attached. A second 402 is terminal; the client
//! never loops.

mod payer;

pub use payer::X402Payer;

use crate::auth::{build_auth_header, Identity};
use crate::config::ClientConfig;
use crate::error::{Error, RejectReason, Result};
use crate::payment::{PaymentRequiredBody, SettlementReceipt};
use crate::pricing::format_base_units;
use crate::protocol::{
    ChunkRangeRequest, DocumentToIndex, ErrorBody, IndexRequest, IndexResult, RetrievalResult,
    SearchRequest, PAYMENT_HEADER, PAYMENT_RESPONSE_HEADER,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// A retrieval response together with its settlement receipt, when the
/// request was paid for.
#[derive(Debug)]
pub struct RetrievalOutcome {
    /// The released chunks.
    pub result: RetrievalResult,
    /// Settlement receipt from the `X-PAYMENT-RESPONSE` header.
    pub payment: Option<SettlementReceipt>,
}

/// HTTP client for an x402-rag server.
pub struct RagClient {
    http: reqwest::Client,
    base_url: String,
    payer: Option<X402Payer>,
    asset_decimals: u8,
}

impl RagClient {
    /// Build a client from configuration.
    ///
    /// Without an identity the client can index and fetch free content
    /// from servers that do not require authentication, but cannot pay.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity hex is invalid or the HTTP
    /// client cannot be constructed.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let payer = config
            .identity_hex
            .as_deref()
            .map(Identity::from_hex)
            .transpose()?
            .map(|identity| X402Payer::new(identity, &config));

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Connection(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            payer,
            asset_decimals: config.asset_decimals,
        })
    }

    /// The client's wallet address, if an identity is configured.
    #[must_use]
    pub fn address(&self) -> Option<String> {
        self.payer.as_ref().map(X402Payer::address)
    }

    /// Index documents on the server.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    pub async fn index_docs(&self, documents: Vec<DocumentToIndex>) -> Result<IndexResult> {
        let (result, _) = self
            .post_paying("/docs/index", &IndexRequest { documents })
            .await?;
        Ok(result)
    }

    /// Search for chunks, paying a 402 challenge if one is issued.
    ///
    /// # Errors
    ///
    /// `PaymentRejected` if the server rejects the submitted proof,
    /// plus transport and HTTP errors.
    pub async fn search(&self, request: &SearchRequest) -> Result<RetrievalOutcome> {
        let (result, payment) = self.post_paying("/docs/search", request).await?;
        Ok(RetrievalOutcome { result, payment })
    }

    /// Fetch a contiguous chunk range, paying a 402 challenge if one is
    /// issued.
    ///
    /// # Errors
    ///
    /// `PaymentRejected` if the server rejects the submitted proof,
    /// plus transport and HTTP errors.
    pub async fn get_chunk_range(&self, request: &ChunkRangeRequest) -> Result<RetrievalOutcome> {
        let (result, payment) = self.post_paying("/docs/chunks", request).await?;
        Ok(RetrievalOutcome { result, payment })
    }

    /// POST with the one-shot pay-and-resend flow.
    async fn post_paying<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(T, Option<SettlementReceipt>)> {
        let response = self.send(path, body, None).await?;
        if response.status() != StatusCode::PAYMENT_REQUIRED {
            return Self::finish(response).await;
        }

        let challenge = Self::parse_challenge(response).await?;
        debug!(
            "Received 402 for {path}: {} ({} offers)",
            challenge.error,
            challenge.accepts.len()
        );

        let payer = self.payer.as_ref().ok_or_else(|| {
            Error::Config("payment required but no identity is configured".to_string())
        })?;
        let proof = payer.pay(&challenge)?;
        let header = proof.to_header()?;

        let response = self.send(path, body, Some(&header)).await?;
        if response.status() == StatusCode::PAYMENT_REQUIRED {
            // One payment attempt per request. A rejected proof will not
            // get better by resigning the same challenge.
            let rejection = Self::parse_challenge(response).await?;
            return Err(Error::PaymentRejected(RejectReason::from_wire(
                &rejection.error,
            )));
        }

        let (result, receipt) = Self::finish(response).await?;
        if let Some(receipt) = &receipt {
            info!(
                "Paid {} ({} base units) for {path} (tx {})",
                format_base_units(receipt.amount, self.asset_decimals),
                receipt.amount,
                receipt.tx_id
            );
        }
        Ok((result, receipt))
    }

    async fn send<B: Serialize>(
        &self,
        path: &str,
        body: &B,
        payment: Option<&str>,
    ) -> Result<reqwest::Response> {
        let mut request = self.http.post(format!("{}{path}", self.base_url)).json(body);

        if let Some(payer) = &self.payer {
            request = request.header(
                reqwest::header::AUTHORIZATION,
                build_auth_header(payer.identity(), path)?,
            );
        }
        if let Some(proof) = payment {
            request = request.header(PAYMENT_HEADER, proof);
        }

        request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(format!("request to {path} timed out"))
            } else {
                Error::Connection(e.to_string())
            }
        })
    }

    /// Parse a 402 body into a challenge.
    async fn parse_challenge(response: reqwest::Response) -> Result<PaymentRequiredBody> {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::MalformedChallenge(format!("unparseable 402 body: {e}")))
    }

    /// Turn a non-402 response into a typed result or an HTTP error.
    async fn finish<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<(T, Option<SettlementReceipt>)> {
        let status = response.status();
        let receipt = response
            .headers()
            .get(PAYMENT_RESPONSE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| STANDARD.decode(v).ok())
            .and_then(|json| serde_json::from_slice(&json).ok());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        if !status.is_success() {
            let detail = serde_json::from_slice::<ErrorBody>(&bytes)
                .map_or_else(|_| String::from_utf8_lossy(&bytes).into_owned(), |b| b.detail);
            return Err(Error::Http {
                status: status.as_u16(),
                detail,
            });
        }

        let result = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Serialization(format!("unparseable response body: {e}")))?;
        Ok((result, receipt))
    }
}
