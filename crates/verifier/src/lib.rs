//! SafeLens verification core.
//!
//! One entry point, [`verify_package`], takes a parsed evidence package and
//! re-derives every safety-critical claim locally: the EIP-712 transaction
//! hash, signature recovery, calldata cross-checks, MPT policy proofs,
//! consensus binding (via a host-provided verifier), and a local EVM replay
//! of the packaged simulation. The trust composer folds the per-component
//! outcomes into a fixed, ordered report.
//!
//! Verification is pure: no network, no disk, no ambient clock. The only
//! time reference is the package's own `packagedAt`.

pub mod calldata;
pub mod cancel;
pub mod hash;
pub mod policy;
pub mod replay;
pub mod report;
pub mod signatures;
pub mod trie;

use {
    chrono::{DateTime, Utc},
    evidence::{ConsensusProof, EvidencePackage},
    report::{ComposeContext, SimulationVerification},
};

pub use {
    alloy_primitives::B256,
    cancel::CancellationToken,
    report::{
        ConsensusErrorCode, ConsensusTrustDecisionReason, ConsensusVerificationResult, SourceId,
        SourceStatus, VerificationReport, VerificationSource, Verdict,
    },
};

/// Host-provided consensus verification, typically backed by a compiled
/// light-client component. The core consumes its output verbatim.
pub trait ConsensusVerify {
    fn verify(
        &self,
        proof: &ConsensusProof,
        expected_state_root: Option<B256>,
        expected_block_number: Option<u64>,
        chain_id: u64,
        packaged_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> ConsensusVerificationResult;
}

/// Verify one evidence package.
///
/// `schema_warnings` carries lenient-mode parse warnings through to the
/// report; pass an empty slice for strict parses.
pub fn verify_package(
    package: &EvidencePackage,
    consensus: Option<&dyn ConsensusVerify>,
    schema_warnings: &[String],
    cancel: &CancellationToken,
) -> VerificationReport {
    // C2: the hash gates everything else.
    let hash = hash::compute_safe_tx_hash(&package.transaction, package.chain_id, package.safe_address);
    let hash_match = hash.safe_tx_hash == package.safe_tx_hash;
    if !hash_match {
        tracing::warn!(
            recomputed = %hash.safe_tx_hash,
            packaged = %package.safe_tx_hash,
            "safeTxHash mismatch",
        );
    }

    // C3: pointless against a hash the package itself disagrees about.
    let signatures = hash_match.then(|| {
        signatures::verify_confirmations(
            hash.safe_tx_hash,
            &package.confirmations,
            package.confirmations_required,
        )
    });

    // C4: labelling only.
    let calldata = calldata::cross_check(&package.transaction, package.data_decoded.as_ref());

    // C5.
    let policy = package
        .onchain_policy_proof
        .as_ref()
        .map(policy::verify_policy_proof);
    if let Some(Err(err)) = &policy {
        tracing::warn!(?err, "policy proof rejected");
    }

    // C6: host collaborator, fed the root the policy proof claims.
    let consensus_result = match (&package.consensus_proof, consensus) {
        (Some(proof), Some(verifier)) if !cancel.is_cancelled() => Some(verifier.verify(
            proof,
            package.onchain_policy_proof.as_ref().map(|p| p.state_root),
            package.onchain_policy_proof.as_ref().map(|p| p.block_number),
            package.chain_id,
            package.packaged_at,
            cancel,
        )),
        _ => None,
    };

    let policy_valid = matches!(policy, Some(Ok(_)));
    let (consensus_upgraded, consensus_reason) = report::decide_consensus_trust(
        package.consensus_proof.is_some(),
        package.onchain_policy_proof.is_some(),
        policy_valid,
        package.onchain_policy_proof.as_ref().map(|p| p.state_root),
        package.onchain_policy_proof.as_ref().map(|p| p.block_number),
        consensus_result.as_ref(),
    );

    // C7: replay against the best verified root available.
    let anchored_root = consensus_result
        .as_ref()
        .filter(|result| result.valid)
        .and_then(|result| result.verified_state_root)
        .or_else(|| match &policy {
            Some(Ok(verified)) => Some(verified.state_root),
            _ => None,
        });
    let replay = match (&package.simulation, &package.simulation_witness, anchored_root) {
        (Some(simulation), Some(witness), Some(root)) => Some(replay::replay_simulation(
            package, simulation, witness, root, cancel,
        )),
        _ => None,
    };

    // C8.
    let ctx = ComposeContext {
        package,
        schema_warnings,
        hash: &hash,
        hash_match,
        signatures: signatures.as_ref(),
        calldata: &calldata,
        policy: policy.as_ref(),
        consensus: consensus_result.as_ref(),
        consensus_upgraded,
        consensus_reason,
        replay: replay.as_ref(),
        cancelled: cancel.is_cancelled(),
    };
    let sources = report::build_verification_sources(&ctx);

    let verdict = if cancel.is_cancelled() {
        Verdict::Cancelled
    } else if !hash_match
        || signatures.as_ref().is_some_and(|s| s.any_invalid())
        || matches!(policy, Some(Err(_)))
        || consensus_result.as_ref().is_some_and(|r| !r.valid)
    {
        Verdict::Failed
    } else {
        Verdict::Passed
    };

    let proposer = signatures.as_ref().and_then(|summary| summary.proposer);
    let target_warnings = report::target_warnings(package);
    let policy_proof = match &policy {
        Some(Ok(verified)) => Some(report::PolicyVerification {
            valid: true,
            block_number: verified.block_number,
            state_root: verified.state_root,
            error: None,
            mismatched_field: None,
        }),
        Some(Err(error)) => package
            .onchain_policy_proof
            .as_ref()
            .map(|proof| report::PolicyVerification {
                valid: false,
                block_number: proof.block_number,
                state_root: proof.state_root,
                error: Some(error.to_string()),
                mismatched_field: error.mismatched_field().map(str::to_owned),
            }),
        None => None,
    };

    let (simulation_verification, simulation_witness_verification, simulation_replay_verification) =
        summarize_replay(replay.as_ref());

    VerificationReport {
        verdict,
        sources,
        hash_details: hash,
        hash_match,
        signatures,
        proposer,
        target_warnings,
        calldata,
        policy_proof,
        simulation_verification,
        simulation_witness_verification,
        simulation_replay_verification,
        consensus_verification: consensus_result,
        consensus_trust_decision_reason: consensus_reason,
        schema_warnings: schema_warnings.to_vec(),
    }
}

fn summarize_replay(
    replay: Option<&replay::ReplayOutcome>,
) -> (
    Option<SimulationVerification>,
    Option<report::SimulationWitnessVerification>,
    Option<report::SimulationReplayVerification>,
) {
    use replay::{ReplayOutcome, WitnessError};

    match replay {
        None => (None, None, None),
        Some(ReplayOutcome::Verified(details)) => (
            Some(SimulationVerification { digest_match: true }),
            Some(report::SimulationWitnessVerification {
                anchored: true,
                error: None,
            }),
            Some(report::SimulationReplayVerification {
                verified: true,
                reason_code: None,
                replay: Some(details.clone()),
            }),
        ),
        Some(ReplayOutcome::Mismatch { reason, details }) => (
            Some(SimulationVerification { digest_match: true }),
            Some(report::SimulationWitnessVerification {
                anchored: true,
                error: None,
            }),
            Some(report::SimulationReplayVerification {
                verified: false,
                reason_code: Some(reason.reason_code().to_owned()),
                replay: Some(details.clone()),
            }),
        ),
        Some(ReplayOutcome::WitnessInvalid(error)) => {
            let digest_match = !matches!(error, WitnessError::DigestMismatch { .. });
            (
                Some(SimulationVerification { digest_match }),
                Some(report::SimulationWitnessVerification {
                    anchored: !matches!(error, WitnessError::StateRootMismatch { .. }),
                    error: Some(error.to_string()),
                }),
                Some(report::SimulationReplayVerification {
                    verified: false,
                    reason_code: Some("simulation-witness-invalid".into()),
                    replay: None,
                }),
            )
        }
        Some(ReplayOutcome::Cancelled) => (
            None,
            None,
            Some(report::SimulationReplayVerification {
                verified: false,
                reason_code: Some("verification-cancelled".into()),
                replay: None,
            }),
        ),
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        alloy_primitives::{Address, Bytes, U256},
        alloy_signer::SignerSync,
        alloy_signer_local::PrivateKeySigner,
        evidence::{
            Confirmation, ConsensusMode, EnvelopePayload, ExecutionEnvelope, ExportContract,
            ExportContractReason, Operation, SafeTransaction, SignatureScheme, TrustLevel,
        },
    };

    fn base_package() -> EvidencePackage {
        let transaction = SafeTransaction {
            to: Address::repeat_byte(0x11),
            value: U256::ZERO,
            data: Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]),
            operation: Operation::Call,
            safe_tx_gas: U256::ZERO,
            base_gas: U256::ZERO,
            gas_price: U256::ZERO,
            gas_token: Address::ZERO,
            refund_receiver: Address::ZERO,
            nonce: U256::from(28),
        };
        let safe = Address::repeat_byte(0x9f);
        let hash = hash::compute_safe_tx_hash(&transaction, 1, safe).safe_tx_hash;
        EvidencePackage {
            version: "1".into(),
            chain_id: 1,
            safe_address: safe,
            safe_tx_hash: hash,
            transaction,
            confirmations: vec![],
            confirmations_required: 1,
            data_decoded: None,
            onchain_policy_proof: None,
            consensus_proof: None,
            simulation: None,
            simulation_witness: None,
            export_contract: ExportContract::partial(vec![
                ExportContractReason::MissingOnchainPolicyProof,
                ExportContractReason::MissingSimulation,
                ExportContractReason::MissingConsensusProof,
            ]),
            packaged_at: "2026-01-15T12:00:00Z".parse().unwrap(),
            sources: None,
        }
    }

    fn sign(package: &mut EvidencePackage, count: usize) {
        for _ in 0..count {
            let signer = PrivateKeySigner::random();
            let signature = signer.sign_hash_sync(&package.safe_tx_hash).unwrap();
            let mut blob = Vec::with_capacity(65);
            blob.extend_from_slice(&signature.r().to_be_bytes::<32>());
            blob.extend_from_slice(&signature.s().to_be_bytes::<32>());
            blob.push(27 + u8::from(signature.v()));
            package.confirmations.push(Confirmation {
                owner: signer.address(),
                signature: Bytes::from(blob),
                scheme: SignatureScheme::Ecdsa,
            });
        }
    }

    fn slot<'a>(report: &'a VerificationReport, id: SourceId) -> &'a VerificationSource {
        report.sources.iter().find(|s| s.id == id).unwrap()
    }

    /// A stub consensus verifier for composition tests.
    struct StubConsensus(ConsensusVerificationResult);

    impl ConsensusVerify for StubConsensus {
        fn verify(
            &self,
            _proof: &ConsensusProof,
            _expected_state_root: Option<B256>,
            _expected_block_number: Option<u64>,
            _chain_id: u64,
            _packaged_at: DateTime<Utc>,
            _cancel: &CancellationToken,
        ) -> ConsensusVerificationResult {
            self.0.clone()
        }
    }

    #[test]
    fn report_always_has_the_fixed_slot_sequence() {
        let mut signed = base_package();
        sign(&mut signed, 2);
        let mut mismatched = base_package();
        mismatched.safe_tx_hash = B256::repeat_byte(0x01);

        for package in [base_package(), signed, mismatched] {
            let report =
                verify_package(&package, None, &[], &CancellationToken::new());
            let ids: Vec<SourceId> = report.sources.iter().map(|s| s.id).collect();
            assert_eq!(ids, SourceId::ALL);
        }
    }

    #[test]
    fn well_signed_package_passes() {
        let mut package = base_package();
        sign(&mut package, 2);
        let report = verify_package(&package, None, &[], &CancellationToken::new());

        assert!(report.hash_match);
        assert_eq!(report.verdict, Verdict::Passed);
        let signatures = report.signatures.as_ref().unwrap();
        assert_eq!(signatures.valid, 2);
        assert!(signatures.threshold_met);
        assert_eq!(report.proposer, Some(package.confirmations[0].owner));
        assert_eq!(
            slot(&report, SourceId::HashRecompute).status,
            SourceStatus::Enabled
        );
    }

    #[test]
    fn matching_decoded_calldata_is_self_verified_end_to_end() {
        use alloy_dyn_abi::DynSolValue;

        let recipient = Address::repeat_byte(0xaa);
        let tail = DynSolValue::Tuple(vec![
            DynSolValue::Address(recipient),
            DynSolValue::Uint(U256::from(1_000u64), 256),
        ])
        .abi_encode_params();
        let selector = &alloy_primitives::keccak256(b"transfer(address,uint256)")[..4];

        let mut package = base_package();
        package.transaction.data = Bytes::from([selector, tail.as_slice()].concat());
        package.data_decoded = Some(evidence::DataDecoded {
            method: "transfer".into(),
            parameters: vec![
                evidence::DecodedParameter {
                    name: "to".into(),
                    param_type: "address".into(),
                    value: recipient.to_string().into(),
                    value_decoded: None,
                },
                evidence::DecodedParameter {
                    name: "value".into(),
                    param_type: "uint256".into(),
                    value: "1000".into(),
                    value_decoded: None,
                },
            ],
        });
        package.safe_tx_hash = hash::compute_safe_tx_hash(
            &package.transaction,
            package.chain_id,
            package.safe_address,
        )
        .safe_tx_hash;
        sign(&mut package, 1);

        let report = verify_package(&package, None, &[], &CancellationToken::new());
        assert_eq!(report.verdict, Verdict::Passed);
        assert!(report.signatures.as_ref().unwrap().valid >= 1);
        let calldata_slot = slot(&report, SourceId::DecodedCalldata);
        assert_eq!(calldata_slot.status, SourceStatus::Enabled);
        assert_eq!(calldata_slot.trust, TrustLevel::SelfVerified);
    }

    #[test]
    fn hash_mismatch_fails_and_skips_signatures() {
        let mut package = base_package();
        sign(&mut package, 1);
        // Bump the nonce after signing: the recomputed hash moves away from
        // the packaged one.
        package.transaction.nonce = U256::from(29);

        let report = verify_package(&package, None, &[], &CancellationToken::new());
        assert!(!report.hash_match);
        assert_eq!(report.verdict, Verdict::Failed);
        assert!(report.signatures.is_none());
        let slot = slot(&report, SourceId::Signatures);
        assert_eq!(slot.status, SourceStatus::Disabled);
        assert_eq!(slot.reason_code.as_deref(), Some("hash-mismatch"));
    }

    #[test]
    fn valid_policy_with_matching_consensus_upgrades_trust() {
        let mut package = base_package();
        sign(&mut package, 1);
        let proof = crate::policy::tests::fixture_proof();
        let root = proof.state_root;
        let block = proof.block_number;
        package.onchain_policy_proof = Some(proof);
        package.consensus_proof = Some(ConsensusProof::Opstack(ExecutionEnvelope {
            chain_id: 1,
            proof_payload: EnvelopePayload {
                number: block,
                hash: B256::repeat_byte(0x01),
                parent_hash: B256::repeat_byte(0x02),
                state_root: root,
                timestamp: 1_700_000_000,
            },
        }));

        let stub = StubConsensus(ConsensusVerificationResult {
            valid: true,
            mode: ConsensusMode::Beacon,
            verified_state_root: Some(root),
            verified_block_number: Some(block),
            state_root_mismatch: false,
            error: None,
            warning: None,
            detail: None,
        });
        let report = verify_package(&package, Some(&stub), &[], &CancellationToken::new());

        assert_eq!(report.verdict, Verdict::Passed);
        assert_eq!(report.consensus_trust_decision_reason, None);
        let policy_slot = slot(&report, SourceId::OnchainPolicyProof);
        assert_eq!(policy_slot.status, SourceStatus::Enabled);
        assert_eq!(policy_slot.trust, TrustLevel::ProofVerified);
        let owners_slot = slot(&report, SourceId::SafeOwnersThreshold);
        assert_eq!(owners_slot.trust, TrustLevel::ProofVerified);
    }

    #[test]
    fn valid_policy_without_consensus_stays_rpc_sourced() {
        let mut package = base_package();
        sign(&mut package, 1);
        package.onchain_policy_proof = Some(crate::policy::tests::fixture_proof());

        let report = verify_package(&package, None, &[], &CancellationToken::new());
        assert_eq!(report.verdict, Verdict::Passed);
        assert_eq!(
            report.consensus_trust_decision_reason,
            Some(ConsensusTrustDecisionReason::MissingConsensusOrPolicyProof)
        );
        assert_eq!(
            slot(&report, SourceId::OnchainPolicyProof).trust,
            TrustLevel::RpcSourced
        );
    }

    #[test]
    fn tampered_policy_proof_downgrades_owners_to_api_sourced() {
        let mut package = base_package();
        sign(&mut package, 1);
        let mut proof = crate::policy::tests::fixture_proof();
        proof.decoded_policy.threshold = 9;
        package.onchain_policy_proof = Some(proof);

        let report = verify_package(&package, None, &[], &CancellationToken::new());
        assert_eq!(report.verdict, Verdict::Failed);
        let policy_slot = slot(&report, SourceId::OnchainPolicyProof);
        assert_eq!(policy_slot.status, SourceStatus::Error);
        assert_eq!(
            policy_slot.reason_code.as_deref(),
            Some("policy-proof-invalid")
        );
        assert_eq!(
            slot(&report, SourceId::SafeOwnersThreshold).trust,
            TrustLevel::ApiSourced
        );
        assert_eq!(
            report.policy_proof.as_ref().unwrap().mismatched_field.as_deref(),
            Some("threshold")
        );
    }

    #[test]
    fn pending_envelope_verifier_is_a_warning_not_an_error() {
        let mut package = base_package();
        sign(&mut package, 1);
        let proof = crate::policy::tests::fixture_proof();
        let root = proof.state_root;
        let block = proof.block_number;
        package.onchain_policy_proof = Some(proof);
        package.consensus_proof = Some(ConsensusProof::Opstack(ExecutionEnvelope {
            chain_id: 1,
            proof_payload: EnvelopePayload {
                number: block,
                hash: B256::repeat_byte(0x01),
                parent_hash: B256::repeat_byte(0x02),
                state_root: root,
                timestamp: 1_700_000_000,
            },
        }));
        let stub = StubConsensus(ConsensusVerificationResult {
            valid: true,
            mode: ConsensusMode::Opstack,
            verified_state_root: Some(root),
            verified_block_number: Some(block),
            state_root_mismatch: false,
            error: None,
            warning: Some(ConsensusErrorCode::OpstackConsensusVerifierPending),
            detail: None,
        });

        let report = verify_package(&package, Some(&stub), &[], &CancellationToken::new());
        assert_eq!(report.verdict, Verdict::Passed);
        let consensus_slot = slot(&report, SourceId::ConsensusProof);
        assert_eq!(consensus_slot.status, SourceStatus::Warning);
        assert_eq!(
            consensus_slot.reason_code.as_deref(),
            Some("opstack-consensus-verifier-pending")
        );
        assert!(
            consensus_slot
                .detail
                .contains("not equivalent to Beacon finality")
        );
    }

    #[test]
    fn replay_status_mismatch_is_non_fatal() {
        let fixture = crate::replay::tests::fixture(crate::replay::tests::CODE_REVERT, &[]);
        let mut package = fixture.package.clone();
        package.safe_tx_hash = hash::compute_safe_tx_hash(
            &package.transaction,
            package.chain_id,
            package.safe_address,
        )
        .safe_tx_hash;
        sign(&mut package, 1);

        // Anchor the witness via a policy-proof-free route: stub consensus
        // yielding the witness root.
        package.consensus_proof = Some(ConsensusProof::Opstack(ExecutionEnvelope {
            chain_id: 1,
            proof_payload: EnvelopePayload {
                number: fixture.witness.block_number,
                hash: B256::repeat_byte(0x01),
                parent_hash: B256::repeat_byte(0x02),
                state_root: fixture.state_root,
                timestamp: 1_700_000_000,
            },
        }));
        let stub = StubConsensus(ConsensusVerificationResult {
            valid: true,
            mode: ConsensusMode::Opstack,
            verified_state_root: Some(fixture.state_root),
            verified_block_number: Some(fixture.witness.block_number),
            state_root_mismatch: false,
            error: None,
            warning: Some(ConsensusErrorCode::OpstackConsensusVerifierPending),
            detail: None,
        });

        let report = verify_package(&package, Some(&stub), &[], &CancellationToken::new());
        assert_eq!(report.verdict, Verdict::Passed);
        let simulation_slot = slot(&report, SourceId::Simulation);
        assert_eq!(simulation_slot.status, SourceStatus::Warning);
        assert_eq!(simulation_slot.trust, TrustLevel::RpcSourced);
        assert_eq!(
            simulation_slot.reason_code.as_deref(),
            Some("simulation-replay-mismatch-success")
        );
        assert!(
            !report
                .simulation_replay_verification
                .as_ref()
                .unwrap()
                .verified
        );
    }

    #[test]
    fn cancellation_yields_a_cancelled_verdict() {
        let mut package = base_package();
        sign(&mut package, 1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = verify_package(&package, None, &[], &cancel);
        assert_eq!(report.verdict, Verdict::Cancelled);
    }
}
