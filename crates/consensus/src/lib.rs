//! Consensus-envelope verification for SafeLens.
//!
//! Implements the verifier core's [`ConsensusVerify`] collaborator:
//! dispatches on the packaged `consensusMode` to either the Beacon
//! light-client pipeline or the execution-header envelope checks, and
//! returns a [`ConsensusVerificationResult`] the trust composer consumes
//! verbatim.

pub mod beacon;
pub mod envelope;

use {
    alloy_primitives::B256,
    chrono::{DateTime, Utc},
    evidence::ConsensusProof,
    verifier::{CancellationToken, ConsensusVerificationResult, ConsensusVerify},
};

pub use beacon::config::Network;

/// The built-in consensus verifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsensusVerifier;

impl ConsensusVerifier {
    pub fn new() -> Self {
        Self
    }
}

impl ConsensusVerify for ConsensusVerifier {
    fn verify(
        &self,
        proof: &ConsensusProof,
        expected_state_root: Option<B256>,
        expected_block_number: Option<u64>,
        package_chain_id: u64,
        packaged_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> ConsensusVerificationResult {
        match proof {
            // The beacon pipeline proves its own root; agreement with the
            // policy proof is the composer's trust decision.
            ConsensusProof::Beacon(beacon_proof) => beacon::verify(beacon_proof, cancel),
            ConsensusProof::Opstack(execution_envelope) => envelope::verify(
                proof.mode(),
                execution_envelope,
                expected_state_root,
                expected_block_number,
                package_chain_id,
                packaged_at,
            ),
            ConsensusProof::Linea(execution_envelope) => envelope::verify(
                proof.mode(),
                execution_envelope,
                expected_state_root,
                expected_block_number,
                package_chain_id,
                packaged_at,
            ),
        }
    }
}
