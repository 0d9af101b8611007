//! Report types, trust composition, and the shared reason-code registry.
//!
//! Everything here is public API consumed by the CLI and UI layers; slot
//! ids, trust levels, and reason codes are stable contract and renaming
//! any value is a breaking change.

pub mod sources;

use {
    crate::{
        calldata::CalldataOutcome,
        hash::HashDetails,
        replay::ReplayDetails,
        signatures::SignatureSummary,
    },
    alloy_primitives::{Address, B256},
    evidence::{ConsensusMode, EvidencePackage, Operation},
    serde::{Deserialize, Serialize},
    std::{fmt, str::FromStr},
};

pub use sources::{ComposeContext, build_verification_sources};

/// The fixed, ordered set of report slots. Consumers may filter or
/// re-style, but ids and order are stable.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SourceId {
    EvidencePackage,
    HashRecompute,
    Signatures,
    SignatureSchemeCoverage,
    SafeOwnersThreshold,
    OnchainPolicyProof,
    DecodedCalldata,
    Simulation,
    ConsensusProof,
    Settings,
}

impl SourceId {
    /// All slots in report order.
    pub const ALL: [SourceId; 10] = [
        SourceId::EvidencePackage,
        SourceId::HashRecompute,
        SourceId::Signatures,
        SourceId::SignatureSchemeCoverage,
        SourceId::SafeOwnersThreshold,
        SourceId::OnchainPolicyProof,
        SourceId::DecodedCalldata,
        SourceId::Simulation,
        SourceId::ConsensusProof,
        SourceId::Settings,
    ];

    /// Human-readable slot title for rendering.
    pub fn title(self) -> &'static str {
        match self {
            Self::EvidencePackage => "Evidence package",
            Self::HashRecompute => "Transaction hash",
            Self::Signatures => "Signatures",
            Self::SignatureSchemeCoverage => "Signature scheme coverage",
            Self::SafeOwnersThreshold => "Safe owners and threshold",
            Self::OnchainPolicyProof => "On-chain policy proof",
            Self::DecodedCalldata => "Decoded calldata",
            Self::Simulation => "Simulation",
            Self::ConsensusProof => "Consensus proof",
            Self::Settings => "Settings",
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SourceStatus {
    Enabled,
    Disabled,
    Warning,
    Error,
}

/// One rendered slot of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationSource {
    pub id: SourceId,
    pub status: SourceStatus,
    pub trust: evidence::TrustLevel,
    /// One sentence for list views.
    pub summary: String,
    /// A paragraph for detail views.
    pub detail: String,
    /// Machine-readable reason; stable contract.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
}

/// Why policy trust was (not) upgraded by the consensus outcome. The six
/// values are exhaustive; the upgrade path itself carries no reason.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ConsensusTrustDecisionReason {
    MissingOrInvalidConsensusResult,
    MissingConsensusOrPolicyProof,
    MissingVerifiedRootOrBlock,
    StateRootMismatchFlag,
    StateRootMismatchPolicyProof,
    BlockNumberMismatchPolicyProof,
}

/// Final verdict over the whole run.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Verdict {
    /// All fatal checks passed (degraded trust labels are still possible).
    Passed,
    /// The evidence does not support the claim (hash, signature, policy,
    /// or consensus verification failed).
    Failed,
    /// Cancelled cooperatively before completion.
    Cancelled,
}

/// Error and warning codes emitted by consensus verifiers.
///
/// Unknown codes from an external verifier are carried verbatim in
/// [`ConsensusErrorCode::Other`], never dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusErrorCode {
    InvalidCheckpointHash,
    InvalidBootstrapJson,
    BootstrapVerificationFailed,
    UpdateVerificationFailed,
    FinalityVerificationFailed,
    MissingExecutionPayload,
    EnvelopeStateRootMismatch,
    EnvelopeBlockNumberMismatch,
    StaleConsensusEnvelope,
    OpstackConsensusVerifierPending,
    LineaConsensusVerifierPending,
    InvalidProofPayload,
    VerificationCancelled,
    Other(String),
}

impl ConsensusErrorCode {
    /// Whether this build knows the code; unknown codes degrade to the
    /// generic invalid-proof-payload presentation but keep their name.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    /// Pending-verifier codes are warnings, not failures.
    pub fn is_pending_warning(&self) -> bool {
        matches!(
            self,
            Self::OpstackConsensusVerifierPending | Self::LineaConsensusVerifierPending
        )
    }
}

impl fmt::Display for ConsensusErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Self::InvalidCheckpointHash => "invalid-checkpoint-hash",
            Self::InvalidBootstrapJson => "invalid-bootstrap-json",
            Self::BootstrapVerificationFailed => "bootstrap-verification-failed",
            Self::UpdateVerificationFailed => "update-verification-failed",
            Self::FinalityVerificationFailed => "finality-verification-failed",
            Self::MissingExecutionPayload => "missing-execution-payload",
            Self::EnvelopeStateRootMismatch => "envelope-state-root-mismatch",
            Self::EnvelopeBlockNumberMismatch => "envelope-block-number-mismatch",
            Self::StaleConsensusEnvelope => "stale-consensus-envelope",
            Self::OpstackConsensusVerifierPending => "opstack-consensus-verifier-pending",
            Self::LineaConsensusVerifierPending => "linea-consensus-verifier-pending",
            Self::InvalidProofPayload => "invalid-proof-payload",
            Self::VerificationCancelled => "verification-cancelled",
            Self::Other(code) => code,
        };
        f.write_str(code)
    }
}

impl FromStr for ConsensusErrorCode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "invalid-checkpoint-hash" => Self::InvalidCheckpointHash,
            "invalid-bootstrap-json" => Self::InvalidBootstrapJson,
            "bootstrap-verification-failed" => Self::BootstrapVerificationFailed,
            "update-verification-failed" => Self::UpdateVerificationFailed,
            "finality-verification-failed" => Self::FinalityVerificationFailed,
            "missing-execution-payload" => Self::MissingExecutionPayload,
            "envelope-state-root-mismatch" => Self::EnvelopeStateRootMismatch,
            "envelope-block-number-mismatch" => Self::EnvelopeBlockNumberMismatch,
            "stale-consensus-envelope" => Self::StaleConsensusEnvelope,
            "opstack-consensus-verifier-pending" => Self::OpstackConsensusVerifierPending,
            "linea-consensus-verifier-pending" => Self::LineaConsensusVerifierPending,
            "invalid-proof-payload" => Self::InvalidProofPayload,
            "verification-cancelled" => Self::VerificationCancelled,
            other => Self::Other(other.to_owned()),
        })
    }
}

impl Serialize for ConsensusErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ConsensusErrorCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(text.parse().unwrap_or(Self::Other(text)))
    }
}

/// Output of a consensus verifier, consumed verbatim by the composer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusVerificationResult {
    pub valid: bool,
    pub mode: ConsensusMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_state_root: Option<B256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_block_number: Option<u64>,
    /// Set when the verifier itself observed a mismatch between the
    /// package's claimed root and what it derived.
    pub state_root_mismatch: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ConsensusErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<ConsensusErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ConsensusVerificationResult {
    pub fn failure(mode: ConsensusMode, error: ConsensusErrorCode, detail: String) -> Self {
        Self {
            valid: false,
            mode,
            verified_state_root: None,
            verified_block_number: None,
            state_root_mismatch: false,
            error: Some(error),
            warning: None,
            detail: Some(detail),
        }
    }
}

/// Decide whether the consensus outcome upgrades policy trust.
///
/// Verified consensus + valid policy proof + matching root and block is
/// the only upgrading path; every other combination names its reason.
pub fn decide_consensus_trust(
    consensus_present: bool,
    policy_present: bool,
    policy_valid: bool,
    policy_root: Option<B256>,
    policy_block: Option<u64>,
    result: Option<&ConsensusVerificationResult>,
) -> (bool, Option<ConsensusTrustDecisionReason>) {
    use ConsensusTrustDecisionReason::*;

    if !consensus_present || !policy_present || !policy_valid {
        // An invalid policy proof leaves nothing to upgrade, the same as a
        // missing one.
        return (false, Some(MissingConsensusOrPolicyProof));
    }
    let Some(result) = result else {
        return (false, Some(MissingOrInvalidConsensusResult));
    };
    if !result.valid {
        return (false, Some(MissingOrInvalidConsensusResult));
    }
    let (Some(root), Some(block)) = (result.verified_state_root, result.verified_block_number)
    else {
        return (false, Some(MissingVerifiedRootOrBlock));
    };
    if result.state_root_mismatch {
        return (false, Some(StateRootMismatchFlag));
    }
    if policy_root != Some(root) {
        return (false, Some(StateRootMismatchPolicyProof));
    }
    if policy_block != Some(block) {
        return (false, Some(BlockNumberMismatchPolicyProof));
    }
    (true, None)
}

/// Static analysis of the call target; informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum TargetWarning {
    /// Delegatecall hands full control of the Safe to the target.
    DelegateCall { to: Address },
    /// A gas token refund can siphon value to the refund receiver.
    NonZeroGasToken { token: Address },
    NonZeroRefundReceiver { receiver: Address },
    /// The transaction calls the Safe itself (owner management etc.).
    TargetIsSelf,
}

/// Derive target warnings from the transaction alone.
pub fn target_warnings(package: &EvidencePackage) -> Vec<TargetWarning> {
    let tx = &package.transaction;
    let mut warnings = Vec::new();
    if tx.operation == Operation::DelegateCall {
        warnings.push(TargetWarning::DelegateCall { to: tx.to });
    }
    if !tx.gas_token.is_zero() {
        warnings.push(TargetWarning::NonZeroGasToken {
            token: tx.gas_token,
        });
    }
    if !tx.refund_receiver.is_zero() {
        warnings.push(TargetWarning::NonZeroRefundReceiver {
            receiver: tx.refund_receiver,
        });
    }
    if tx.to == package.safe_address {
        warnings.push(TargetWarning::TargetIsSelf);
    }
    warnings
}

/// Summarized policy-proof outcome for the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyVerification {
    pub valid: bool,
    pub block_number: u64,
    pub state_root: B256,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// First declared-policy field that conflicted with proven storage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mismatched_field: Option<String>,
}

/// Digest check over the packaged simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationVerification {
    pub digest_match: bool,
}

/// Witness anchoring and proof validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationWitnessVerification {
    pub anchored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Replay cross-check result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReplayVerification {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay: Option<ReplayDetails>,
}

/// The complete verifier output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub verdict: Verdict,
    /// One record per slot, in the fixed order of [`SourceId::ALL`].
    pub sources: Vec<VerificationSource>,
    pub hash_details: HashDetails,
    pub hash_match: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signatures: Option<SignatureSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposer: Option<Address>,
    pub target_warnings: Vec<TargetWarning>,
    pub calldata: CalldataOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_proof: Option<PolicyVerification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation_verification: Option<SimulationVerification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation_witness_verification: Option<SimulationWitnessVerification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation_replay_verification: Option<SimulationReplayVerification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consensus_verification: Option<ConsensusVerificationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consensus_trust_decision_reason: Option<ConsensusTrustDecisionReason>,
    /// Lenient-mode schema warnings, verbatim.
    pub schema_warnings: Vec<String>,
}
