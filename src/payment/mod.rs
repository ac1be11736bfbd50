//! Payment-gated retrieval for x402-rag.
//!
//! This module implements both halves of the 402 handshake:
//!
//! ```text
//! retrieval request received
//!          │
//!          ▼
//! ┌──────────────────────┐
//! │ quote unpaid chunks  │
//! └──────────┬───────────┘
//!            │
//!     ┌──────┴───────┐
//!     │              │
//!  amount 0      amount > 0
//!     │              │
//!     ▼              ▼
//!  release      X-PAYMENT header?
//!                ┌───┴────┐
//!               no        yes
//!                │          │
//!                ▼          ▼
//!          issue challenge  verify + settle
//!          (402 response)   release quoted set
//! ```
//!
//! # Payment flow
//!
//! 1. Server quotes the exact chunk set a request would return
//! 2. Server issues a nonce-bound challenge as a structured 402 body
//! 3. Client builds and signs a payment proof from the challenge
//! 4. Client resends with the proof in the `X-PAYMENT` header
//! 5. Server verifies the proof, settles on the ledger, and releases
//!    exactly the quoted chunks
//!
//! Each challenge is single-use: concurrent proofs for one nonce produce
//! exactly one release.

mod challenge;
pub mod ledger;
mod proof;
mod verifier;

pub use challenge::{
    generate_nonce, Challenge, ChallengeState, ChallengeStore, MemoryChallengeStore,
    PaymentRequiredBody, PaymentRequirements,
};
pub use ledger::{InstantLedger, Ledger, TransferInstruction};
pub use proof::{payment_signing_bytes, sign_payment, PaymentPayload, UnsignedPayment};
pub use verifier::{PaymentVerifier, SettlementReceipt};
