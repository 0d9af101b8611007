//! Confirmation signature verification.
//!
//! Each confirmation carries a packed 65-byte `r ‖ s ‖ v` blob. The final
//! `v` byte selects the Safe signature encoding; classification happens
//! from the bytes alone and never trusts the scheme the service claimed.

use {
    alloy_primitives::{Address, B256, Signature, U256, utils::eip191_hash_message},
    evidence::{Confirmation, SignatureScheme},
    serde::Serialize,
};

/// secp256k1 group order halved; signatures with `s` above this are
/// malleable and rejected.
const SECP256K1N_HALF: U256 = U256::from_limbs([
    0xdfe9_2f46_681b_20a0,
    0x5d57_6e73_57a4_501d,
    0xffff_ffff_ffff_ffff,
    0x7fff_ffff_ffff_ffff,
]);

/// Verification result for one confirmation, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureOutcome {
    pub owner: Address,
    pub status: SignatureStatus,
    /// Scheme classified from the `v` byte; absent when `v` was invalid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<SignatureScheme>,
    /// Recovered signer for the ECDSA schemes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovered: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "reason")]
pub enum SignatureStatus {
    /// Recovered signer equals the claimed owner.
    Valid,
    /// Cryptographically wrong or malformed.
    Invalid(InvalidSignature),
    /// Scheme cannot be checked without live chain state (EIP-1271,
    /// approved hashes); trust composition treats these as api-sourced.
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidSignature {
    #[error("signature blob is not 65 bytes")]
    Length,
    #[error("v byte selects no known scheme")]
    InvalidV,
    #[error("high-s signature rejected")]
    HighS,
    #[error("public key recovery failed")]
    RecoveryFailed,
    #[error("recovered signer differs from the claimed owner")]
    SignerMismatch,
}

/// Aggregate view over all confirmations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureSummary {
    /// Per-confirmation outcomes, preserving input order.
    pub outcomes: Vec<SignatureOutcome>,
    pub valid: usize,
    pub invalid: usize,
    pub unsupported: usize,
    pub confirmations_required: u32,
    /// Whether the valid count alone meets the required threshold.
    pub threshold_met: bool,
    /// First valid signer, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposer: Option<Address>,
}

impl SignatureSummary {
    pub fn any_invalid(&self) -> bool {
        self.invalid > 0
    }
}

/// Verify all confirmations against the recomputed transaction hash.
pub fn verify_confirmations(
    safe_tx_hash: B256,
    confirmations: &[Confirmation],
    confirmations_required: u32,
) -> SignatureSummary {
    let outcomes: Vec<_> = confirmations
        .iter()
        .map(|confirmation| verify_confirmation(safe_tx_hash, confirmation))
        .collect();

    let valid = outcomes
        .iter()
        .filter(|o| o.status == SignatureStatus::Valid)
        .count();
    let invalid = outcomes
        .iter()
        .filter(|o| matches!(o.status, SignatureStatus::Invalid(_)))
        .count();
    let unsupported = outcomes
        .iter()
        .filter(|o| o.status == SignatureStatus::Unsupported)
        .count();
    let proposer = outcomes
        .iter()
        .find(|o| o.status == SignatureStatus::Valid)
        .map(|o| o.owner);

    SignatureSummary {
        valid,
        invalid,
        unsupported,
        confirmations_required,
        threshold_met: valid as u32 >= confirmations_required,
        proposer,
        outcomes,
    }
}

/// Verify a single confirmation.
pub fn verify_confirmation(safe_tx_hash: B256, confirmation: &Confirmation) -> SignatureOutcome {
    let outcome = |status, scheme, recovered| SignatureOutcome {
        owner: confirmation.owner,
        status,
        scheme,
        recovered,
    };

    let blob = confirmation.signature.as_ref();
    if blob.len() != 65 {
        return outcome(
            SignatureStatus::Invalid(InvalidSignature::Length),
            None,
            None,
        );
    }
    let v = blob[64];

    let (scheme, digest) = match v {
        0x1b | 0x1c => (SignatureScheme::Ecdsa, safe_tx_hash),
        0x1f | 0x20 => (
            SignatureScheme::EthSign,
            eip191_hash_message(safe_tx_hash),
        ),
        0x01 => {
            // Pre-approved hash: the approval lives on-chain and cannot be
            // checked from the package alone.
            return outcome(
                SignatureStatus::Unsupported,
                Some(SignatureScheme::ApprovedHash),
                None,
            );
        }
        0x00 => {
            // EIP-1271 contract signature: needs a live isValidSignature
            // call.
            return outcome(
                SignatureStatus::Unsupported,
                Some(SignatureScheme::Contract),
                None,
            );
        }
        _ => {
            return outcome(
                SignatureStatus::Invalid(InvalidSignature::InvalidV),
                None,
                None,
            );
        }
    };

    let r = U256::from_be_slice(&blob[..32]);
    let s = U256::from_be_slice(&blob[32..64]);
    if s > SECP256K1N_HALF {
        return outcome(
            SignatureStatus::Invalid(InvalidSignature::HighS),
            Some(scheme),
            None,
        );
    }

    // 27/28 for ECDSA, 31/32 for eth-sign; both map onto recovery parity.
    let parity = matches!(v, 0x1c | 0x20);
    let signature = Signature::new(r, s, parity);
    match signature.recover_address_from_prehash(&digest) {
        Ok(recovered) if recovered == confirmation.owner => {
            outcome(SignatureStatus::Valid, Some(scheme), Some(recovered))
        }
        Ok(recovered) => outcome(
            SignatureStatus::Invalid(InvalidSignature::SignerMismatch),
            Some(scheme),
            Some(recovered),
        ),
        Err(_) => outcome(
            SignatureStatus::Invalid(InvalidSignature::RecoveryFailed),
            Some(scheme),
            None,
        ),
    }
}
