//! Payment proofs: the signed artifact a client submits to satisfy a
//! challenge.
//!
//! The signature covers the exact `(nonce, amount, asset, recipient,
//! network)` tuple through a canonical, length-prefixed encoding, so any
//! mutation of those fields invalidates the proof. The proof itself is
//! self-describing: it carries the payer's public key and everything a
//! verifier needs without contacting the client again.

use crate::auth::Identity;
use crate::config::NetworkId;
use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Domain-separation context for payment signatures (prevents
/// cross-protocol reuse of auth signatures as payments and vice versa).
const PAYMENT_SIGNING_CONTEXT: &[u8] = b"x402-rag-payment-v1";

/// An unsigned payment instruction extracted verbatim from a challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedPayment {
    /// Network to pay on.
    pub network: NetworkId,
    /// Asset to pay in.
    pub asset: String,
    /// Amount in base units.
    pub amount: u64,
    /// Recipient address.
    pub pay_to: String,
    /// Challenge nonce the payment is bound to.
    pub nonce: String,
}

/// A signed, self-contained payment proof.
///
/// Transported base64-encoded in the `X-PAYMENT` request header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    /// Protocol version.
    pub x402_version: u32,
    /// Payment scheme; always `exact`.
    pub scheme: String,
    /// Network the payment is made on.
    pub network: NetworkId,
    /// Payer public key, hex.
    pub payer: String,
    /// Hex-encoded ed25519 signature over the canonical payment bytes.
    pub signature: String,
    /// Challenge nonce.
    pub nonce: String,
    /// Amount in base units.
    pub amount: u64,
    /// Asset identifier.
    pub asset: String,
    /// Recipient address.
    pub pay_to: String,
}

impl PaymentPayload {
    /// Encode for the `X-PAYMENT` header.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_header(&self) -> Result<String> {
        let json = serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(STANDARD.encode(json))
    }

    /// Decode from an `X-PAYMENT` header value.
    ///
    /// # Errors
    ///
    /// Returns `MalformedChallenge` if the value is not valid
    /// base64-wrapped JSON.
    pub fn from_header(value: &str) -> Result<Self> {
        let json = STANDARD
            .decode(value.trim())
            .map_err(|e| Error::MalformedChallenge(format!("bad payment encoding: {e}")))?;
        serde_json::from_slice(&json)
            .map_err(|e| Error::MalformedChallenge(format!("bad payment payload: {e}")))
    }

    /// The unsigned tuple this proof claims to have signed.
    #[must_use]
    pub fn unsigned(&self) -> UnsignedPayment {
        UnsignedPayment {
            network: self.network,
            asset: self.asset.clone(),
            amount: self.amount,
            pay_to: self.pay_to.clone(),
            nonce: self.nonce.clone(),
        }
    }
}

/// Canonical bytes a payment signature covers.
///
/// Length-prefixed fields under a fixed context string; both signer and
/// verifier derive these independently from their own copy of the tuple.
#[must_use]
pub fn payment_signing_bytes(payment: &UnsignedPayment) -> Vec<u8> {
    fn push_field(buf: &mut Vec<u8>, field: &[u8]) {
        #[allow(clippy::cast_possible_truncation)]
        let len = field.len() as u32;
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(field);
    }

    let mut buf = Vec::with_capacity(128);
    buf.extend_from_slice(PAYMENT_SIGNING_CONTEXT);
    push_field(&mut buf, payment.nonce.as_bytes());
    buf.extend_from_slice(&payment.amount.to_be_bytes());
    push_field(&mut buf, payment.asset.as_bytes());
    push_field(&mut buf, payment.pay_to.as_bytes());
    push_field(&mut buf, payment.network.to_string().as_bytes());
    buf
}

/// Sign an unsigned payment with the given identity, producing a proof.
///
/// Building and signing never mutate shared state; each call yields an
/// independent one-shot proof.
#[must_use]
pub fn sign_payment(payment: &UnsignedPayment, identity: &Identity) -> PaymentPayload {
    let signature = identity.sign(&payment_signing_bytes(payment));

    PaymentPayload {
        x402_version: crate::protocol::X402_VERSION,
        scheme: "exact".to_string(),
        network: payment.network,
        payer: identity.address(),
        signature: hex::encode(signature),
        nonce: payment.nonce.clone(),
        amount: payment.amount,
        asset: payment.asset.clone(),
        pay_to: payment.pay_to.clone(),
    }
}
