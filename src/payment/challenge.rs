//! Payment challenges and the challenge store.
//!
//! A challenge is the server's single-use description of the exact payment
//! that will satisfy one request: the quoted amount, asset, recipient,
//! network, a random nonce, and a validity window. It lives only between
//! the 402 response and settlement (or expiry).
//!
//! The store is an explicit injected component rather than ambient state
//! so tests can use a fresh in-memory instance and multi-instance
//! deployments can swap in a shared backend.

use crate::config::NetworkId;
use crate::error::RejectReason;
use parking_lot::Mutex;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Payment requirements as carried in a 402 response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// Payment scheme. Always `exact`: partial payments are not accepted.
    pub scheme: String,
    /// Network the payment must be made on.
    pub network: NetworkId,
    /// Asset identifier (token mint address).
    pub asset: String,
    /// Amount in asset base units.
    pub amount: u64,
    /// Recipient address.
    pub pay_to: String,
    /// Single-use challenge nonce.
    pub nonce: String,
    /// Unix time (seconds) after which the challenge is no longer valid.
    pub expires_at: u64,
    /// Request path this challenge was issued for.
    pub resource: String,
    /// Human-readable description of what is being purchased.
    pub description: String,
}

impl PaymentRequirements {
    /// Whether the validity window has elapsed at `now` (unix seconds).
    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at
    }
}

/// Structured body of a 402 Payment Required response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredBody {
    /// Protocol version.
    pub x402_version: u32,
    /// Why payment is required (or why the previous proof was rejected).
    pub error: String,
    /// Acceptable payment requirements. Currently always one entry.
    pub accepts: Vec<PaymentRequirements>,
}

/// Lifecycle state of a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeState {
    /// Issued and awaiting a proof.
    Issued,
    /// Fulfilled by a verified proof. Terminal.
    Fulfilled,
}

/// A server-side challenge bound to one logical request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// The requirements returned to the client.
    pub requirements: PaymentRequirements,
    /// The exact chunk set quoted. Settlement releases this set and
    /// never a superset.
    pub chunk_ids: Vec<String>,
    /// Fingerprint of the request the challenge was issued for.
    pub fingerprint: String,
    /// Current state.
    pub state: ChallengeState,
}

/// Generate a random challenge nonce (16 bytes, hex).
#[must_use]
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Storage for outstanding challenges with an atomic fulfil transition.
pub trait ChallengeStore: Send + Sync {
    /// Store a freshly issued challenge, keyed by its nonce.
    fn issue(&self, challenge: Challenge);

    /// Look up a challenge by nonce.
    fn get(&self, nonce: &str) -> Option<Challenge>;

    /// Atomically transition a challenge from `Issued` to `Fulfilled`.
    ///
    /// Exactly one caller per nonce ever receives `Ok`; concurrent
    /// attempts observe `AlreadySettled`.
    ///
    /// # Errors
    ///
    /// `UnknownNonce` if no challenge exists, `AlreadySettled` if it was
    /// already fulfilled.
    fn fulfil(&self, nonce: &str) -> Result<Challenge, RejectReason>;

    /// Drop expired challenges. Optional cleanup; correctness never
    /// depends on it because expiry is checked at verification time.
    fn prune_expired(&self, now: u64);
}

/// In-memory challenge store.
#[derive(Default)]
pub struct MemoryChallengeStore {
    challenges: Mutex<HashMap<String, Challenge>>,
}

impl MemoryChallengeStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored challenges (any state).
    #[must_use]
    pub fn len(&self) -> usize {
        self.challenges.lock().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChallengeStore for MemoryChallengeStore {
    fn issue(&self, challenge: Challenge) {
        debug!(
            "Issued challenge {} for {} base units ({} chunks)",
            challenge.requirements.nonce,
            challenge.requirements.amount,
            challenge.chunk_ids.len()
        );
        self.challenges
            .lock()
            .insert(challenge.requirements.nonce.clone(), challenge);
    }

    fn get(&self, nonce: &str) -> Option<Challenge> {
        self.challenges.lock().get(nonce).cloned()
    }

    fn fulfil(&self, nonce: &str) -> Result<Challenge, RejectReason> {
        let mut challenges = self.challenges.lock();
        let challenge = challenges.get_mut(nonce).ok_or(RejectReason::UnknownNonce)?;
        match challenge.state {
            ChallengeState::Issued => {
                challenge.state = ChallengeState::Fulfilled;
                Ok(challenge.clone())
            }
            ChallengeState::Fulfilled => Err(RejectReason::AlreadySettled),
        }
    }

    fn prune_expired(&self, now: u64) {
        self.challenges
            .lock()
            .retain(|_, c| !c.requirements.is_expired(now));
    }
}
