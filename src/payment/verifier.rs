//! Payment verification and settlement.
//!
//! The verifier runs the fixed check pipeline against a submitted proof:
//! challenge lookup → expiry → request binding → exact field match →
//! signature → atomic single-use fulfil → ledger settlement. Content is
//! only released when every step passes, and a failed step reveals
//! nothing beyond its reason code.

use crate::auth::verify_signature;
use crate::config::{SettlementMode, X402Config};
use crate::error::{Error, RejectReason, Result};
use crate::payment::challenge::{Challenge, ChallengeStore};
use crate::payment::ledger::{Ledger, TransferInstruction};
use crate::payment::proof::{payment_signing_bytes, PaymentPayload};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Settlement receipt returned to the payer in `X-PAYMENT-RESPONSE`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReceipt {
    /// Always true in a receipt; failures never produce one.
    pub success: bool,
    /// Network the payment settled on.
    pub network: String,
    /// Ledger transaction id.
    pub tx_id: String,
    /// Payer address.
    pub payer: String,
    /// Settled amount in base units.
    pub amount: u64,
}

/// Server-side payment verifier and settler.
pub struct PaymentVerifier {
    challenges: Arc<dyn ChallengeStore>,
    ledger: Arc<dyn Ledger>,
    config: X402Config,
}

impl PaymentVerifier {
    /// Create a verifier over the given challenge store and ledger.
    #[must_use]
    pub fn new(
        challenges: Arc<dyn ChallengeStore>,
        ledger: Arc<dyn Ledger>,
        config: X402Config,
    ) -> Self {
        Self {
            challenges,
            ledger,
            config,
        }
    }

    /// Verify a proof against its challenge and settle it.
    ///
    /// On success the challenge is consumed (single use) and the returned
    /// challenge snapshot names exactly the chunk set to release.
    ///
    /// # Errors
    ///
    /// `PaymentRejected` with a specific [`RejectReason`] on any check
    /// failure. The requested resource must not be released in that case.
    pub async fn verify_and_settle(
        &self,
        proof: &PaymentPayload,
        request_fingerprint: &str,
        now: u64,
    ) -> Result<(Challenge, SettlementReceipt)> {
        let challenge = self
            .challenges
            .get(&proof.nonce)
            .ok_or(Error::PaymentRejected(RejectReason::UnknownNonce))?;

        self.check_proof(proof, &challenge, request_fingerprint, now)
            .map_err(|reason| {
                warn!(
                    "Rejected payment for nonce {}: {}",
                    proof.nonce, reason
                );
                Error::PaymentRejected(reason)
            })?;

        // Atomic check-and-transition: exactly one proof per nonce wins.
        let challenge = self
            .challenges
            .fulfil(&proof.nonce)
            .map_err(Error::PaymentRejected)?;

        let receipt = self.settle(proof).await?;
        info!(
            "Settled {} base units for nonce {} (tx {})",
            proof.amount, proof.nonce, receipt.tx_id
        );

        Ok((challenge, receipt))
    }

    /// Run the ordered, side-effect-free checks.
    fn check_proof(
        &self,
        proof: &PaymentPayload,
        challenge: &Challenge,
        request_fingerprint: &str,
        now: u64,
    ) -> std::result::Result<(), RejectReason> {
        let required = &challenge.requirements;

        if required.is_expired(now) {
            return Err(RejectReason::Expired);
        }
        if challenge.fingerprint != request_fingerprint {
            return Err(RejectReason::FingerprintMismatch);
        }
        // Exact match only: no partial payments, no substitutions.
        if proof.amount != required.amount {
            return Err(RejectReason::AmountMismatch);
        }
        if proof.asset != required.asset {
            return Err(RejectReason::AssetMismatch);
        }
        if proof.pay_to != required.pay_to {
            return Err(RejectReason::RecipientMismatch);
        }
        if proof.network != required.network {
            return Err(RejectReason::NetworkMismatch);
        }

        let signature = hex::decode(&proof.signature)
            .map_err(|_| RejectReason::InvalidSignature)?;
        verify_signature(
            &proof.payer,
            &payment_signing_bytes(&proof.unsigned()),
            &signature,
        )
        .map_err(|_| RejectReason::InvalidSignature)?;

        Ok(())
    }

    /// Broadcast (and, in confirmed mode, await) the settlement.
    async fn settle(&self, proof: &PaymentPayload) -> Result<SettlementReceipt> {
        let transfer = TransferInstruction {
            network: proof.network,
            asset: proof.asset.clone(),
            amount: proof.amount,
            from: proof.payer.clone(),
            to: proof.pay_to.clone(),
            nonce: proof.nonce.clone(),
        };

        let timeout = Duration::from_secs(self.config.settlement_timeout_secs);

        let tx_id = tokio::time::timeout(timeout, self.ledger.broadcast(&transfer))
            .await
            .map_err(|_| Error::Timeout("ledger broadcast timed out".to_string()))?
            .map_err(|e| Error::PaymentRejected(RejectReason::Settlement(e.to_string())))?;

        match self.config.settlement {
            SettlementMode::Optimistic => {
                debug!("Optimistic release for tx {tx_id} (broadcast only)");
            }
            SettlementMode::Confirmed => {
                tokio::time::timeout(timeout, self.ledger.confirm(&tx_id))
                    .await
                    .map_err(|_| Error::Timeout("ledger confirmation timed out".to_string()))?
                    .map_err(|e| {
                        Error::PaymentRejected(RejectReason::Settlement(e.to_string()))
                    })?;
                debug!("Confirmed settlement for tx {tx_id}");
            }
        }

        Ok(SettlementReceipt {
            success: true,
            network: proof.network.to_string(),
            tx_id,
            payer: proof.payer.clone(),
            amount: proof.amount,
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::Identity;
    use crate::config::NetworkId;
    use crate::payment::challenge::{
        ChallengeState, MemoryChallengeStore, PaymentRequirements,
    };
    use crate::payment::ledger::InstantLedger;
    use crate::payment::proof::{sign_payment, UnsignedPayment};

    const NOW: u64 = 1_000;

    fn test_requirements(nonce: &str, amount: u64) -> PaymentRequirements {
        PaymentRequirements {
            scheme: "exact".to_string(),
            network: NetworkId::SolanaDevnet,
            asset: "mint".to_string(),
            amount,
            pay_to: "recipient".to_string(),
            nonce: nonce.to_string(),
            expires_at: NOW + 60,
            resource: "/docs/search".to_string(),
            description: String::new(),
        }
    }

    fn setup(nonce: &str, amount: u64) -> (Arc<MemoryChallengeStore>, PaymentVerifier) {
        let store = Arc::new(MemoryChallengeStore::new());
        store.issue(Challenge {
            requirements: test_requirements(nonce, amount),
            chunk_ids: vec!["c1".to_string(), "c2".to_string()],
            fingerprint: "fp".to_string(),
            state: ChallengeState::Issued,
        });

        let challenges: Arc<dyn ChallengeStore> = store.clone();
        let verifier = PaymentVerifier::new(
            challenges,
            Arc::new(InstantLedger::new()),
            X402Config::default(),
        );
        (store, verifier)
    }

    fn proof_for(nonce: &str, amount: u64, identity: &Identity) -> PaymentPayload {
        sign_payment(
            &UnsignedPayment {
                network: NetworkId::SolanaDevnet,
                asset: "mint".to_string(),
                amount,
                pay_to: "recipient".to_string(),
                nonce: nonce.to_string(),
            },
            identity,
        )
    }

    #[tokio::test]
    async fn test_valid_proof_releases_quoted_set() {
        let (_, verifier) = setup("n1", 8);
        let identity = Identity::generate();
        let proof = proof_for("n1", 8, &identity);

        let (challenge, receipt) = verifier
            .verify_and_settle(&proof, "fp", NOW)
            .await
            .expect("release");
        assert_eq!(challenge.chunk_ids, vec!["c1", "c2"]);
        assert!(receipt.success);
        assert_eq!(receipt.amount, 8);
        assert_eq!(receipt.payer, identity.address());
    }

    #[tokio::test]
    async fn test_amount_tamper_rejected() {
        let (_, verifier) = setup("n1", 8);
        let identity = Identity::generate();
        let proof = proof_for("n1", 9, &identity);

        let result = verifier.verify_and_settle(&proof, "fp", NOW).await;
        assert!(matches!(
            result,
            Err(Error::PaymentRejected(RejectReason::AmountMismatch))
        ));
    }

    #[tokio::test]
    async fn test_wrong_nonce_rejected() {
        let (_, verifier) = setup("n1", 8);
        let identity = Identity::generate();
        // Proof built for a different challenge's nonce.
        let proof = proof_for("n2", 8, &identity);

        let result = verifier.verify_and_settle(&proof, "fp", NOW).await;
        assert!(matches!(
            result,
            Err(Error::PaymentRejected(RejectReason::UnknownNonce))
        ));
    }

    #[tokio::test]
    async fn test_expired_challenge_rejected() {
        let (_, verifier) = setup("n1", 8);
        let identity = Identity::generate();
        let proof = proof_for("n1", 8, &identity);

        let result = verifier.verify_and_settle(&proof, "fp", NOW + 120).await;
        assert!(matches!(
            result,
            Err(Error::PaymentRejected(RejectReason::Expired))
        ));
    }

    #[tokio::test]
    async fn test_fingerprint_mismatch_rejected() {
        let (_, verifier) = setup("n1", 8);
        let identity = Identity::generate();
        let proof = proof_for("n1", 8, &identity);

        let result = verifier.verify_and_settle(&proof, "other-request", NOW).await;
        assert!(matches!(
            result,
            Err(Error::PaymentRejected(RejectReason::FingerprintMismatch))
        ));
    }

    #[tokio::test]
    async fn test_forged_signature_rejected() {
        let (_, verifier) = setup("n1", 8);
        let identity = Identity::generate();
        let mut proof = proof_for("n1", 8, &identity);
        // Claim a different payer than the one who signed.
        proof.payer = Identity::generate().address();

        let result = verifier.verify_and_settle(&proof, "fp", NOW).await;
        assert!(matches!(
            result,
            Err(Error::PaymentRejected(RejectReason::InvalidSignature))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_settlement_single_release() {
        let (_, verifier) = setup("n1", 8);
        let verifier = Arc::new(verifier);
        let identity = Identity::generate();
        let proof = proof_for("n1", 8, &identity);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let verifier = Arc::clone(&verifier);
            let proof = proof.clone();
            handles.push(tokio::spawn(async move {
                verifier.verify_and_settle(&proof, "fp", NOW).await
            }));
        }

        let mut released = 0;
        let mut already_settled = 0;
        for handle in handles {
            match handle.await.expect("join") {
                Ok(_) => released += 1,
                Err(Error::PaymentRejected(RejectReason::AlreadySettled)) => {
                    already_settled += 1;
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(released, 1);
        assert_eq!(already_settled, 3);
    }

    #[tokio::test]
    async fn test_replay_after_settlement_rejected() {
        let (_, verifier) = setup("n1", 8);
        let identity = Identity::generate();
        let proof = proof_for("n1", 8, &identity);

        verifier
            .verify_and_settle(&proof, "fp", NOW)
            .await
            .expect("first settlement");
        let result = verifier.verify_and_settle(&proof, "fp", NOW).await;
        assert!(matches!(
            result,
            Err(Error::PaymentRejected(RejectReason::AlreadySettled))
        ));
    }

    #[tokio::test]
    async fn test_confirmed_mode_settles() {
        let store = Arc::new(MemoryChallengeStore::new());
        store.issue(Challenge {
            requirements: test_requirements("n1", 8),
            chunk_ids: vec!["c1".to_string()],
            fingerprint: "fp".to_string(),
            state: ChallengeState::Issued,
        });
        let config = X402Config {
            settlement: SettlementMode::Confirmed,
            ..X402Config::default()
        };
        let verifier =
            PaymentVerifier::new(store, Arc::new(InstantLedger::new()), config);

        let identity = Identity::generate();
        let proof = proof_for("n1", 8, &identity);
        let (_, receipt) = verifier
            .verify_and_settle(&proof, "fp", NOW)
            .await
            .expect("confirmed settlement");
        assert!(receipt.success);
    }
}
