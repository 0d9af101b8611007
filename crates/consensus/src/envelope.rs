//! Execution-header envelope verification for OP-Stack and Linea.
//!
//! These chains ship no embedded light client yet, so the envelope only
//! proves internal consistency and agreement with the policy proof. The
//! mode-specific `*-consensus-verifier-pending` warning makes explicit
//! that this is not equivalent to Beacon finality.

use {
    alloy_primitives::B256,
    chrono::{DateTime, Utc},
    evidence::{ConsensusMode, ExecutionEnvelope},
    verifier::{ConsensusErrorCode, ConsensusVerificationResult},
};

/// How far behind `packagedAt` an OP-Stack envelope may lag.
const OPSTACK_STALENESS_BOUND_SECS: u64 = 3_600;
/// Linea blocks are slower; allow a wider window.
const LINEA_STALENESS_BOUND_SECS: u64 = 7_200;

/// Verify an execution-header envelope against the package context.
pub fn verify(
    mode: ConsensusMode,
    envelope: &ExecutionEnvelope,
    expected_state_root: Option<B256>,
    expected_block_number: Option<u64>,
    package_chain_id: u64,
    packaged_at: DateTime<Utc>,
) -> ConsensusVerificationResult {
    let failure = |code: ConsensusErrorCode, detail: String| {
        ConsensusVerificationResult::failure(mode, code, detail)
    };

    let payload = &envelope.proof_payload;

    // Shape and chain binding.
    if envelope.chain_id != package_chain_id {
        return failure(
            ConsensusErrorCode::InvalidProofPayload,
            format!(
                "envelope is for chain {} but the package is for chain {package_chain_id}",
                envelope.chain_id,
            ),
        );
    }
    if payload.hash.is_zero() || payload.state_root.is_zero() || payload.hash == payload.parent_hash
    {
        return failure(
            ConsensusErrorCode::InvalidProofPayload,
            "envelope header is not internally consistent".into(),
        );
    }

    // Agreement with the policy proof.
    if let Some(expected) = expected_state_root {
        if payload.state_root != expected {
            return failure(
                ConsensusErrorCode::EnvelopeStateRootMismatch,
                format!(
                    "envelope state root {} does not match the policy proof root {expected}",
                    payload.state_root,
                ),
            );
        }
    }
    if let Some(expected) = expected_block_number {
        if payload.number != expected {
            return failure(
                ConsensusErrorCode::EnvelopeBlockNumberMismatch,
                format!(
                    "envelope block {} does not match the policy proof block {expected}",
                    payload.number,
                ),
            );
        }
    }

    // Freshness, measured only against the package's own clock.
    let packaged_at_secs = u64::try_from(packaged_at.timestamp()).unwrap_or_default();
    let bound = match mode {
        ConsensusMode::Linea => LINEA_STALENESS_BOUND_SECS,
        _ => OPSTACK_STALENESS_BOUND_SECS,
    };
    if payload.timestamp > packaged_at_secs
        || packaged_at_secs - payload.timestamp > bound
    {
        return failure(
            ConsensusErrorCode::StaleConsensusEnvelope,
            format!(
                "envelope timestamp {} is outside the {bound}s window before packagedAt",
                payload.timestamp,
            ),
        );
    }

    // Envelope integrity established; the full cryptographic verifier for
    // these chains does not exist yet.
    let pending = match mode {
        ConsensusMode::Linea => ConsensusErrorCode::LineaConsensusVerifierPending,
        _ => ConsensusErrorCode::OpstackConsensusVerifierPending,
    };
    ConsensusVerificationResult {
        valid: true,
        mode,
        verified_state_root: Some(payload.state_root),
        verified_block_number: Some(payload.number),
        state_root_mismatch: false,
        error: None,
        warning: Some(pending),
        detail: Some(
            "Envelope integrity verified; assurance is not equivalent to Beacon finality."
                .into(),
        ),
    }
}
