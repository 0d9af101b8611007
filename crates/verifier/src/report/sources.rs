//! The trust composer: per-component outcomes in, ten ordered
//! `VerificationSource` records out.
//!
//! A pure function; it never panics and never consults anything outside
//! the context it is handed.

use {
    super::{
        ConsensusTrustDecisionReason, ConsensusVerificationResult, SourceId, SourceStatus,
        VerificationSource,
    },
    crate::{
        calldata::CalldataOutcome,
        hash::HashDetails,
        policy::{PolicyError, VerifiedPolicy},
        replay::ReplayOutcome,
        signatures::SignatureSummary,
    },
    evidence::{ConsensusMode, EvidencePackage, ExportContractReason, TrustLevel},
};

/// Everything the composer needs. Borrowed from the verification run.
pub struct ComposeContext<'a> {
    pub package: &'a EvidencePackage,
    pub schema_warnings: &'a [String],
    pub hash: &'a HashDetails,
    pub hash_match: bool,
    /// `None` when signature checking was skipped (hash mismatch).
    pub signatures: Option<&'a SignatureSummary>,
    pub calldata: &'a CalldataOutcome,
    pub policy: Option<&'a Result<VerifiedPolicy, PolicyError>>,
    pub consensus: Option<&'a ConsensusVerificationResult>,
    pub consensus_upgraded: bool,
    pub consensus_reason: Option<ConsensusTrustDecisionReason>,
    pub replay: Option<&'a ReplayOutcome>,
    pub cancelled: bool,
}

/// Build the fixed ten-slot source list.
pub fn build_verification_sources(ctx: &ComposeContext<'_>) -> Vec<VerificationSource> {
    SourceId::ALL
        .iter()
        .map(|id| match id {
            SourceId::EvidencePackage => evidence_package(ctx),
            SourceId::HashRecompute => hash_recompute(ctx),
            SourceId::Signatures => signatures(ctx),
            SourceId::SignatureSchemeCoverage => scheme_coverage(ctx),
            SourceId::SafeOwnersThreshold => owners_threshold(ctx),
            SourceId::OnchainPolicyProof => policy_proof(ctx),
            SourceId::DecodedCalldata => decoded_calldata(ctx),
            SourceId::Simulation => simulation(ctx),
            SourceId::ConsensusProof => consensus_proof(ctx),
            SourceId::Settings => settings(),
        })
        .collect()
}

fn source(
    id: SourceId,
    status: SourceStatus,
    trust: TrustLevel,
    summary: impl Into<String>,
    detail: impl Into<String>,
    reason_code: Option<String>,
) -> VerificationSource {
    VerificationSource {
        id,
        status,
        trust,
        summary: summary.into(),
        detail: detail.into(),
        reason_code,
    }
}

fn evidence_package(ctx: &ComposeContext<'_>) -> VerificationSource {
    let warnings = ctx.schema_warnings.len();
    let detail = if warnings == 0 {
        format!(
            "Package version {} parsed and schema-validated locally.",
            ctx.package.version,
        )
    } else {
        format!(
            "Package version {} parsed with {warnings} lenient-mode warning(s).",
            ctx.package.version,
        )
    };
    source(
        SourceId::EvidencePackage,
        SourceStatus::Enabled,
        TrustLevel::SelfVerified,
        "Evidence package parsed and validated",
        detail,
        None,
    )
}

fn hash_recompute(ctx: &ComposeContext<'_>) -> VerificationSource {
    if ctx.hash_match {
        source(
            SourceId::HashRecompute,
            SourceStatus::Enabled,
            TrustLevel::SelfVerified,
            "Recomputed safeTxHash matches the package",
            format!(
                "EIP-712 digest {} recomputed from the transaction fields.",
                ctx.hash.safe_tx_hash,
            ),
            None,
        )
    } else {
        source(
            SourceId::HashRecompute,
            SourceStatus::Error,
            TrustLevel::SelfVerified,
            "Recomputed safeTxHash does NOT match the package",
            format!(
                "Recomputed {} but the package claims {}. Nothing downstream can \
                 compensate for this.",
                ctx.hash.safe_tx_hash, ctx.package.safe_tx_hash,
            ),
            Some("hash-mismatch".into()),
        )
    }
}

fn signatures(ctx: &ComposeContext<'_>) -> VerificationSource {
    let Some(summary) = ctx.signatures else {
        return source(
            SourceId::Signatures,
            SourceStatus::Disabled,
            TrustLevel::SelfVerified,
            "Signature verification skipped",
            "The recomputed transaction hash does not match the package, so \
             signatures were not checked against it.",
            Some("hash-mismatch".into()),
        );
    };
    if summary.any_invalid() {
        return source(
            SourceId::Signatures,
            SourceStatus::Error,
            TrustLevel::SelfVerified,
            format!("{} invalid signature(s)", summary.invalid),
            "At least one packaged confirmation does not verify against the \
             recomputed transaction hash.",
            Some("invalid-signature".into()),
        );
    }
    source(
        SourceId::Signatures,
        SourceStatus::Enabled,
        TrustLevel::SelfVerified,
        format!(
            "{} of {} required signatures verified",
            summary.valid, summary.confirmations_required,
        ),
        "Signers recovered locally from the packed signature blobs over the \
         recomputed transaction hash.",
        None,
    )
}

fn scheme_coverage(ctx: &ComposeContext<'_>) -> VerificationSource {
    match ctx.signatures {
        Some(summary) if summary.unsupported > 0 => source(
            SourceId::SignatureSchemeCoverage,
            SourceStatus::Warning,
            TrustLevel::ApiSourced,
            format!(
                "{} confirmation(s) use schemes that need live chain state",
                summary.unsupported,
            ),
            "Pre-approved hashes and EIP-1271 contract signatures cannot be \
             verified from the package alone; their validity is taken from \
             the API.",
            Some("unsupported-signature-scheme".into()),
        ),
        Some(_) => source(
            SourceId::SignatureSchemeCoverage,
            SourceStatus::Enabled,
            TrustLevel::SelfVerified,
            "All confirmations use locally verifiable schemes",
            "Every packaged confirmation is a plain ECDSA or eth-sign \
             signature and was recovered locally.",
            None,
        ),
        None => source(
            SourceId::SignatureSchemeCoverage,
            SourceStatus::Disabled,
            TrustLevel::SelfVerified,
            "Not evaluated",
            "Signature verification was skipped.",
            Some("hash-mismatch".into()),
        ),
    }
}

fn owners_threshold(ctx: &ComposeContext<'_>) -> VerificationSource {
    match ctx.policy {
        Some(Ok(policy)) if ctx.consensus_upgraded => source(
            SourceId::SafeOwnersThreshold,
            SourceStatus::Enabled,
            TrustLevel::ProofVerified,
            format!(
                "{} owners, threshold {} proven against finalized state",
                policy.owners.len(),
                policy.threshold,
            ),
            "The owner set and threshold were reconstructed from storage \
             proofs anchored to a consensus-verified state root.",
            None,
        ),
        Some(Ok(policy)) => source(
            SourceId::SafeOwnersThreshold,
            SourceStatus::Enabled,
            TrustLevel::RpcSourced,
            format!(
                "{} owners, threshold {} proven against an RPC-sourced root",
                policy.owners.len(),
                policy.threshold,
            ),
            "Storage proofs verified, but the state root they anchor to was \
             taken from an RPC node without a consensus proof.",
            None,
        ),
        Some(Err(_)) => source(
            SourceId::SafeOwnersThreshold,
            SourceStatus::Warning,
            TrustLevel::ApiSourced,
            "Owner set and threshold are API-sourced",
            "The packaged policy proof failed verification, so the owner set \
             and threshold fall back to what the Safe API reported.",
            Some("policy-proof-invalid".into()),
        ),
        None => source(
            SourceId::SafeOwnersThreshold,
            SourceStatus::Warning,
            TrustLevel::ApiSourced,
            "Owner set and threshold are API-sourced",
            absent_policy_detail(ctx.package),
            Some("missing-onchain-policy-proof".into()),
        ),
    }
}

fn policy_proof(ctx: &ComposeContext<'_>) -> VerificationSource {
    match ctx.policy {
        Some(Ok(policy)) => {
            let trust = if ctx.consensus_upgraded {
                TrustLevel::ProofVerified
            } else {
                TrustLevel::RpcSourced
            };
            source(
                SourceId::OnchainPolicyProof,
                SourceStatus::Enabled,
                trust,
                format!(
                    "Account and storage proofs verified at block {}",
                    policy.block_number,
                ),
                format!(
                    "All policy slots verified under state root {} and the \
                     declared policy matches the reconstructed values.",
                    policy.state_root,
                ),
                None,
            )
        }
        Some(Err(error)) => source(
            SourceId::OnchainPolicyProof,
            SourceStatus::Error,
            TrustLevel::ApiSourced,
            "Policy proof failed verification",
            format!("First failure: {error}."),
            Some("policy-proof-invalid".into()),
        ),
        None => source(
            SourceId::OnchainPolicyProof,
            SourceStatus::Disabled,
            TrustLevel::ApiSourced,
            "No on-chain policy proof packaged",
            absent_policy_detail(ctx.package),
            Some("missing-onchain-policy-proof".into()),
        ),
    }
}

/// Pick the "absent data" explanation the generator actually gave.
fn absent_policy_detail(package: &EvidencePackage) -> String {
    if package.export_contract.has(ExportContractReason::MissingRpcUrl) {
        "The generator had no RPC endpoint configured and could not fetch \
         storage proofs."
            .into()
    } else {
        "The generator did not attach storage proofs for the Safe's \
         configuration."
            .into()
    }
}

fn decoded_calldata(ctx: &ComposeContext<'_>) -> VerificationSource {
    match ctx.calldata {
        CalldataOutcome::SelfVerified => source(
            SourceId::DecodedCalldata,
            SourceStatus::Enabled,
            TrustLevel::SelfVerified,
            "API decoding matches the raw calldata",
            "Selectors recomputed from the reported method signatures and \
             every argument re-decoded and compared locally.",
            None,
        ),
        CalldataOutcome::Partial => source(
            SourceId::DecodedCalldata,
            SourceStatus::Warning,
            TrustLevel::ApiSourced,
            "Some call steps lack decoded inputs",
            "Steps with decoded inputs match the raw bytes; the remaining \
             steps could not be cross-checked.",
            Some("decoded-calldata-partial".into()),
        ),
        CalldataOutcome::Mismatch { step, detail } => source(
            SourceId::DecodedCalldata,
            SourceStatus::Error,
            TrustLevel::ApiSourced,
            "API decoding conflicts with the raw calldata",
            format!("Step {step}: {detail}"),
            Some("decoded-calldata-mismatch".into()),
        ),
        CalldataOutcome::ApiOnly => source(
            SourceId::DecodedCalldata,
            SourceStatus::Disabled,
            TrustLevel::ApiSourced,
            "No decoded calldata to cross-check",
            "The package carries no API decoding; only the raw bytes are \
             shown.",
            Some("missing-decoded-calldata".into()),
        ),
    }
}

fn simulation(ctx: &ComposeContext<'_>) -> VerificationSource {
    let has_simulation = ctx.package.simulation.is_some();
    if !has_simulation {
        let reason = if ctx
            .package
            .export_contract
            .has(ExportContractReason::SimulationFetchFailed)
        {
            ExportContractReason::SimulationFetchFailed
        } else {
            ExportContractReason::MissingSimulation
        };
        return source(
            SourceId::Simulation,
            SourceStatus::Disabled,
            TrustLevel::ApiSourced,
            "No simulation packaged",
            match reason {
                ExportContractReason::SimulationFetchFailed => {
                    "The generator tried to fetch a simulation but the \
                     provider request failed."
                }
                _ => "The generator did not attach a simulation.",
            },
            Some(reason.to_string()),
        );
    }

    match ctx.replay {
        Some(ReplayOutcome::Verified(details)) => source(
            SourceId::Simulation,
            SourceStatus::Enabled,
            TrustLevel::ProofVerified,
            "Simulation replayed locally against witnessed state",
            format!(
                "Status, return data, logs, and gas ({} used) reproduced on \
                 a local EVM seeded only with proven state.",
                details.gas_used,
            ),
            None,
        ),
        Some(ReplayOutcome::Mismatch { reason, .. }) => source(
            SourceId::Simulation,
            SourceStatus::Warning,
            TrustLevel::RpcSourced,
            "Local replay diverged from the packaged simulation",
            "The witnessed state verified but re-execution did not reproduce \
             the packaged outcome; the simulation remains RPC-sourced.",
            Some(reason.reason_code().to_owned()),
        ),
        Some(ReplayOutcome::WitnessInvalid(error)) => source(
            SourceId::Simulation,
            SourceStatus::Warning,
            TrustLevel::RpcSourced,
            "Simulation witness could not be validated",
            format!("{error}."),
            Some("simulation-witness-invalid".into()),
        ),
        Some(ReplayOutcome::Cancelled) => source(
            SourceId::Simulation,
            SourceStatus::Warning,
            TrustLevel::RpcSourced,
            "Simulation replay cancelled",
            "Verification was cancelled before the replay completed.",
            Some("verification-cancelled".into()),
        ),
        None => source(
            SourceId::Simulation,
            SourceStatus::Enabled,
            TrustLevel::RpcSourced,
            "Simulation packaged but not independently replayed",
            "No witness (or no verified state root) was available, so the \
             simulation outcome is trusted from the provider.",
            Some("missing-simulation-witness".into()),
        ),
    }
}

fn consensus_proof(ctx: &ComposeContext<'_>) -> VerificationSource {
    let Some(proof) = &ctx.package.consensus_proof else {
        let reason = [
            ExportContractReason::ConsensusProofFetchFailed,
            ExportContractReason::UnsupportedConsensusMode,
            ExportContractReason::ConsensusModeDisabledByFeatureFlag,
            ExportContractReason::MissingConsensusProof,
        ]
        .into_iter()
        .find(|reason| ctx.package.export_contract.has(*reason))
        .unwrap_or(ExportContractReason::MissingConsensusProof);
        return source(
            SourceId::ConsensusProof,
            SourceStatus::Disabled,
            TrustLevel::RpcSourced,
            "No consensus proof packaged",
            match reason {
                ExportContractReason::UnsupportedConsensusMode => {
                    "This chain has no supported consensus-proof mode; state \
                     roots remain RPC-sourced."
                }
                ExportContractReason::ConsensusModeDisabledByFeatureFlag => {
                    "Consensus proofing is disabled by a feature flag on the \
                     generator."
                }
                ExportContractReason::ConsensusProofFetchFailed => {
                    "The generator failed to assemble a consensus proof."
                }
                _ => "The generator did not attach a consensus proof.",
            },
            Some(reason.to_string()),
        );
    };

    let Some(result) = ctx.consensus else {
        return source(
            SourceId::ConsensusProof,
            SourceStatus::Warning,
            TrustLevel::RpcSourced,
            "Consensus proof packaged but no verifier ran",
            "No consensus verifier was available for this run.",
            Some("missing-or-invalid-consensus-result".into()),
        );
    };

    if result.valid {
        let (trust, mode_name) = match result.mode {
            ConsensusMode::Beacon => (TrustLevel::ConsensusVerifiedBeacon, "beacon"),
            _ => (TrustLevel::ConsensusVerifiedEnvelope, "envelope"),
        };
        if let Some(warning) = &result.warning {
            return source(
                SourceId::ConsensusProof,
                SourceStatus::Warning,
                trust,
                "Envelope integrity verified; full verifier pending",
                "The execution-header envelope is internally consistent and \
                 matches the policy proof, but no full cryptographic verifier \
                 exists yet for this chain. This assurance is not equivalent \
                 to Beacon finality.",
                Some(warning.to_string()),
            );
        }
        return source(
            SourceId::ConsensusProof,
            SourceStatus::Enabled,
            trust,
            format!("Finalized state verified via {mode_name} proof"),
            format!(
                "Verified state root {} at block {}.",
                result
                    .verified_state_root
                    .map(|root| root.to_string())
                    .unwrap_or_else(|| "<none>".into()),
                result
                    .verified_block_number
                    .map(|block| block.to_string())
                    .unwrap_or_else(|| "<none>".into()),
            ),
            None,
        );
    }

    // Invalid. Unknown codes keep their name but take the generic
    // presentation.
    let code = result.error.clone();
    let known = code.as_ref().is_some_and(|code| code.is_known());
    source(
        SourceId::ConsensusProof,
        SourceStatus::Error,
        TrustLevel::RpcSourced,
        if known {
            "Consensus proof failed verification"
        } else {
            "Consensus verifier returned an unrecognized failure"
        },
        result
            .detail
            .clone()
            .unwrap_or_else(|| "The packaged consensus proof did not verify.".into()),
        Some(
            code.map(|code| code.to_string())
                .unwrap_or_else(|| "invalid-proof-payload".into()),
        ),
    )
}

fn settings() -> VerificationSource {
    source(
        SourceId::Settings,
        SourceStatus::Enabled,
        TrustLevel::UserProvided,
        "Operator-provided settings",
        "Endpoints and preferences come from the operator's settings file; \
         they never participate in trust decisions.",
        None,
    )
}
