//! Identity keys and request authentication.
//!
//! Every request (paid or free) may carry an `Authorization` header that
//! lets the server attribute usage to a wallet address without requiring
//! payment. The header wraps an ed25519 signature over a canonical message
//! binding the request path and an issue timestamp:
//!
//! ```text
//! x402-auth-v1
//! version: 1
//! uri: /docs/search
//! issued-at: 1735689600
//! ```
//!
//! The same identity signs payment proofs; the secret half never leaves
//! the client process.

use crate::error::{Error, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Domain-separation prefix for authentication messages.
const AUTH_CANON_PREFIX: &str = "x402-auth-v1";

/// Current authentication message version.
const AUTH_VERSION: u32 = 1;

/// Scheme name in the `Authorization` header.
const AUTH_SCHEME: &str = "X402 ";

/// An ed25519 keypair used for request authentication and payment signing.
pub struct Identity {
    signing_key: SigningKey,
}

impl Identity {
    /// Generate a fresh identity from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        Self {
            signing_key: SigningKey::generate(&mut rng),
        }
    }

    /// Load an identity from a hex-encoded 32-byte secret seed.
    ///
    /// # Errors
    ///
    /// Returns an error if the hex is invalid or not 32 bytes.
    pub fn from_hex(secret_hex: &str) -> Result<Self> {
        let bytes = hex::decode(secret_hex.trim())
            .map_err(|e| Error::Config(format!("invalid identity hex: {e}")))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::Config("identity secret must be 32 bytes".to_string()))?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    /// Hex-encoded secret seed. Handle with care.
    #[must_use]
    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Hex-encoded public key; doubles as the wallet address.
    #[must_use]
    pub fn address(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign arbitrary bytes, returning the raw 64-byte signature.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Verify a raw ed25519 signature for a hex-encoded public key.
///
/// # Errors
///
/// Returns `Auth` if the key, signature, or verification is invalid.
pub fn verify_signature(address_hex: &str, message: &[u8], signature: &[u8]) -> Result<()> {
    let key_bytes: [u8; 32] = hex::decode(address_hex)
        .map_err(|e| Error::Auth(format!("invalid address hex: {e}")))?
        .try_into()
        .map_err(|_| Error::Auth("address must be 32 bytes".to_string()))?;
    let key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| Error::Auth(format!("invalid public key: {e}")))?;
    let signature = Signature::from_slice(signature)
        .map_err(|e| Error::Auth(format!("invalid signature bytes: {e}")))?;
    key.verify(message, &signature)
        .map_err(|_| Error::Auth("signature verification failed".to_string()))
}

/// The signed portion of an authentication header.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AuthMessage {
    v: u32,
    uri: String,
    #[serde(rename = "issuedAt")]
    issued_at: u64,
}

impl AuthMessage {
    fn canonical_bytes(&self) -> Vec<u8> {
        format!(
            "{AUTH_CANON_PREFIX}\nversion: {}\nuri: {}\nissued-at: {}",
            self.v, self.uri, self.issued_at
        )
        .into_bytes()
    }
}

/// Wire payload carried inside the `Authorization` header.
#[derive(Debug, Serialize, Deserialize)]
struct WirePayload {
    address: String,
    msg: AuthMessage,
    sig: String,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Build an `Authorization` header value for a request to `uri` (the
/// request path, e.g. `/docs/search`).
///
/// # Errors
///
/// Returns an error if the payload cannot be serialized.
pub fn build_auth_header(identity: &Identity, uri: &str) -> Result<String> {
    build_auth_header_at(identity, uri, unix_now())
}

/// Like [`build_auth_header`] with an explicit issue timestamp.
///
/// # Errors
///
/// Returns an error if the payload cannot be serialized.
pub fn build_auth_header_at(identity: &Identity, uri: &str, issued_at: u64) -> Result<String> {
    let msg = AuthMessage {
        v: AUTH_VERSION,
        uri: uri.to_string(),
        issued_at,
    };
    let sig = identity.sign(&msg.canonical_bytes());

    let payload = WirePayload {
        address: identity.address(),
        msg,
        sig: URL_SAFE_NO_PAD.encode(sig),
    };
    let json = serde_json::to_vec(&payload).map_err(|e| Error::Serialization(e.to_string()))?;
    Ok(format!("{AUTH_SCHEME}{}", URL_SAFE_NO_PAD.encode(json)))
}

/// Verify an `Authorization` header for a request to `request_uri`.
///
/// Returns the authenticated wallet address (hex public key).
///
/// # Errors
///
/// Returns `Auth` on scheme/format problems, URI mismatch, expired or
/// future-dated messages, and signature failures.
pub fn verify_auth_header(
    header_value: &str,
    request_uri: &str,
    max_ttl_secs: u64,
    clock_skew_secs: u64,
) -> Result<String> {
    verify_auth_header_at(
        header_value,
        request_uri,
        max_ttl_secs,
        clock_skew_secs,
        unix_now(),
    )
}

fn verify_auth_header_at(
    header_value: &str,
    request_uri: &str,
    max_ttl_secs: u64,
    clock_skew_secs: u64,
    now: u64,
) -> Result<String> {
    let encoded = header_value
        .strip_prefix(AUTH_SCHEME)
        .ok_or_else(|| Error::Auth("unsupported authorization scheme".to_string()))?;

    let json = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| Error::Auth(format!("bad auth payload encoding: {e}")))?;
    let wire: WirePayload =
        serde_json::from_slice(&json).map_err(|e| Error::Auth(format!("bad auth payload: {e}")))?;

    if wire.msg.uri != request_uri {
        return Err(Error::Auth("auth URI mismatch".to_string()));
    }

    if wire.msg.issued_at > now + clock_skew_secs {
        return Err(Error::Auth("auth message issued in the future".to_string()));
    }
    if now.saturating_sub(wire.msg.issued_at) > max_ttl_secs + clock_skew_secs {
        return Err(Error::Auth("auth message expired".to_string()));
    }

    let sig = URL_SAFE_NO_PAD
        .decode(&wire.sig)
        .map_err(|e| Error::Auth(format!("bad signature encoding: {e}")))?;
    verify_signature(&wire.address, &wire.msg.canonical_bytes(), &sig)?;

    Ok(wire.address)
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_hex_roundtrip() {
        let identity = Identity::generate();
        let restored = Identity::from_hex(&identity.secret_hex()).expect("restore");
        assert_eq!(identity.address(), restored.address());
    }

    #[test]
    fn test_auth_header_roundtrip() {
        let identity = Identity::generate();
        let header = build_auth_header_at(&identity, "/docs/search", 1000).expect("build");

        let address =
            verify_auth_header_at(&header, "/docs/search", 300, 120, 1010).expect("verify");
        assert_eq!(address, identity.address());
    }

    #[test]
    fn test_auth_uri_mismatch() {
        let identity = Identity::generate();
        let header = build_auth_header_at(&identity, "/docs/search", 1000).expect("build");

        let result = verify_auth_header_at(&header, "/docs/chunks", 300, 120, 1010);
        assert!(matches!(result, Err(Error::Auth(_))));
    }

    #[test]
    fn test_auth_expiry_and_future_dating() {
        let identity = Identity::generate();
        let header = build_auth_header_at(&identity, "/docs/search", 1000).expect("build");

        // Expired: now is far past issued_at + ttl + skew.
        assert!(verify_auth_header_at(&header, "/docs/search", 300, 120, 2000).is_err());
        // Future-dated beyond skew.
        assert!(verify_auth_header_at(&header, "/docs/search", 300, 120, 500).is_err());
        // Within skew.
        assert!(verify_auth_header_at(&header, "/docs/search", 300, 120, 950).is_ok());
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let identity = Identity::generate();
        let header = build_auth_header_at(&identity, "/docs/search", 1000).expect("build");

        // Re-point the signed message at a different URI.
        let encoded = header.strip_prefix("X402 ").expect("scheme");
        let json = URL_SAFE_NO_PAD.decode(encoded).expect("decode");
        let mut wire: WirePayload = serde_json::from_slice(&json).expect("parse");
        wire.msg.uri = "/docs/chunks".to_string();
        let tampered = format!(
            "X402 {}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&wire).expect("encode"))
        );

        let result = verify_auth_header_at(&tampered, "/docs/chunks", 300, 120, 1010);
        assert!(matches!(result, Err(Error::Auth(_))));
    }

    #[test]
    fn test_unsupported_scheme() {
        let result = verify_auth_header_at("Bearer abc", "/docs/search", 300, 120, 0);
        assert!(matches!(result, Err(Error::Auth(_))));
    }
}
