//! Error types for x402-rag.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in x402-rag.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Pricing input cannot be allocated (e.g. priced document with no text).
    #[error("invalid pricing input: {0}")]
    InvalidPricingInput(String),

    /// A 402 response body could not be parsed as a payment challenge.
    #[error("malformed payment challenge: {0}")]
    MalformedChallenge(String),

    /// The challenge names a network the client has no ledger support for.
    #[error("unsupported network: {0}")]
    UnsupportedNetwork(String),

    /// The challenge names an asset the client cannot pay in.
    #[error("unsupported asset: {0}")]
    UnsupportedAsset(String),

    /// Producing a payment signature failed.
    #[error("signing failure: {0}")]
    Signing(String),

    /// The server rejected a submitted payment proof.
    #[error("payment rejected: {0}")]
    PaymentRejected(RejectReason),

    /// Settlement against the ledger failed after verification.
    #[error("settlement failure: {0}")]
    Settlement(String),

    /// Request authentication failed.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Document store error.
    #[error("store error: {0}")]
    Store(String),

    /// Connection-level failure reaching the server.
    #[error("connection error: {0}")]
    Connection(String),

    /// A network step exceeded its configured timeout.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Non-402 HTTP error status from the server.
    #[error("HTTP {status}: {detail}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Error detail from the response body, if any.
        detail: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Specific reason a payment proof was rejected by the verifier.
///
/// These are the only proof-related details the server reveals to clients;
/// everything else about the failed proof stays server-side.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    /// No challenge exists for the nonce the proof references.
    #[error("unknown challenge nonce")]
    UnknownNonce,

    /// The challenge's validity window has elapsed.
    #[error("challenge expired")]
    Expired,

    /// The proof was built for a different request than the challenge.
    #[error("request fingerprint mismatch")]
    FingerprintMismatch,

    /// The proof amount does not equal the challenged amount.
    #[error("amount mismatch")]
    AmountMismatch,

    /// The proof names a different asset than the challenge.
    #[error("asset mismatch")]
    AssetMismatch,

    /// The proof pays a different recipient than the challenge.
    #[error("recipient mismatch")]
    RecipientMismatch,

    /// The proof names a different network than the challenge.
    #[error("network mismatch")]
    NetworkMismatch,

    /// The payment signature does not verify for the claimed payer.
    #[error("invalid signature")]
    InvalidSignature,

    /// The challenge was already fulfilled by another proof.
    #[error("already settled")]
    AlreadySettled,

    /// The ledger refused or failed to settle the payment.
    #[error("settlement failed: {0}")]
    Settlement(String),
}

impl RejectReason {
    /// Reconstruct a reason from the `error` field of a 402 body.
    ///
    /// The inverse of `Display`; unrecognized strings map to
    /// `Settlement` carrying the raw text.
    #[must_use]
    pub fn from_wire(s: &str) -> Self {
        match s {
            "unknown challenge nonce" => Self::UnknownNonce,
            "challenge expired" => Self::Expired,
            "request fingerprint mismatch" => Self::FingerprintMismatch,
            "amount mismatch" => Self::AmountMismatch,
            "asset mismatch" => Self::AssetMismatch,
            "recipient mismatch" => Self::RecipientMismatch,
            "network mismatch" => Self::NetworkMismatch,
            "invalid signature" => Self::InvalidSignature,
            "already settled" => Self::AlreadySettled,
            other => Self::Settlement(
                other
                    .strip_prefix("settlement failed: ")
                    .unwrap_or(other)
                    .to_string(),
            ),
        }
    }
}
