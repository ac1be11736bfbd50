//! Turning a 402 challenge into a signed payment proof.

use crate::auth::Identity;
use crate::config::{ClientConfig, NetworkId};
use crate::error::{Error, Result};
use crate::payment::{
    sign_payment, PaymentPayload, PaymentRequiredBody, PaymentRequirements, UnsignedPayment,
};
use std::collections::HashMap;
use tracing::debug;

/// Builds and signs payments against challenges the client is willing
/// and able to satisfy.
pub struct X402Payer {
    identity: Identity,
    rpc_by_network: HashMap<NetworkId, String>,
    allowed_assets: Vec<String>,
}

impl X402Payer {
    /// Create a payer for the given identity and client policy.
    #[must_use]
    pub fn new(identity: Identity, config: &ClientConfig) -> Self {
        Self {
            identity,
            rpc_by_network: config.rpc_by_network.clone(),
            allowed_assets: config.allowed_assets.clone(),
        }
    }

    /// The payer's wallet address.
    #[must_use]
    pub fn address(&self) -> String {
        self.identity.address()
    }

    /// The signing identity, shared with request authentication.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Build an unsigned payment from challenge requirements, copying
    /// amount, asset, recipient, network, and nonce verbatim.
    ///
    /// # Errors
    ///
    /// `MalformedChallenge` for an unknown scheme, `UnsupportedNetwork`
    /// when no RPC endpoint is configured for the challenge's network,
    /// `UnsupportedAsset` when the asset is outside the allow list.
    pub fn build(&self, requirements: &PaymentRequirements) -> Result<UnsignedPayment> {
        if requirements.scheme != "exact" {
            return Err(Error::MalformedChallenge(format!(
                "unknown payment scheme {}",
                requirements.scheme
            )));
        }
        if !self.rpc_by_network.contains_key(&requirements.network) {
            return Err(Error::UnsupportedNetwork(requirements.network.to_string()));
        }
        if !self.allowed_assets.is_empty()
            && !self.allowed_assets.contains(&requirements.asset)
        {
            return Err(Error::UnsupportedAsset(requirements.asset.clone()));
        }

        Ok(UnsignedPayment {
            network: requirements.network,
            asset: requirements.asset.clone(),
            amount: requirements.amount,
            pay_to: requirements.pay_to.clone(),
            nonce: requirements.nonce.clone(),
        })
    }

    /// Satisfy a 402 body: pick the first acceptable requirements entry,
    /// build, and sign.
    ///
    /// # Errors
    ///
    /// `MalformedChallenge` when the body offers no requirements, plus
    /// everything [`Self::build`] can return.
    pub fn pay(&self, body: &PaymentRequiredBody) -> Result<PaymentPayload> {
        let requirements = body.accepts.first().ok_or_else(|| {
            Error::MalformedChallenge("402 body offers no payment requirements".to_string())
        })?;

        let unsigned = self.build(requirements)?;
        debug!(
            "Paying {} base units of {} to {} (nonce {})",
            unsigned.amount, unsigned.asset, unsigned.pay_to, unsigned.nonce
        );
        Ok(sign_payment(&unsigned, &self.identity))
    }
}
