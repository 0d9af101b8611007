//! The export contract: what the generator did and why.
//!
//! Every package carries one. The verifier uses the reasons to choose the
//! correct "absent data" explanation for a slot instead of inventing one.

use serde::{Deserialize, Serialize};

/// Self-description of a package's completeness, written by the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportContract {
    /// True when every enriching artifact the generator knows about was
    /// attached; false for a partial export.
    pub fully_verifiable: bool,
    /// One reason per artifact the generator could not (or chose not to)
    /// attach. Empty iff `fully_verifiable`.
    #[serde(default)]
    pub reasons: Vec<ExportContractReason>,
}

impl ExportContract {
    /// A contract for a package with every artifact attached.
    pub fn complete() -> Self {
        Self {
            fully_verifiable: true,
            reasons: Vec::new(),
        }
    }

    /// A contract for a partial package with the given reasons.
    pub fn partial(reasons: Vec<ExportContractReason>) -> Self {
        Self {
            fully_verifiable: false,
            reasons,
        }
    }

    pub fn has(&self, reason: ExportContractReason) -> bool {
        self.reasons.contains(&reason)
    }
}

/// Closed set of reasons a generator may give for a partial export.
///
/// These values are public API; renaming one is a breaking change.
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
pub enum ExportContractReason {
    MissingRpcUrl,
    SimulationFetchFailed,
    MissingSimulation,
    MissingConsensusProof,
    ConsensusProofFetchFailed,
    UnsupportedConsensusMode,
    ConsensusModeDisabledByFeatureFlag,
    MissingOnchainPolicyProof,
    OpstackConsensusVerifierPending,
    LineaConsensusVerifierPending,
}
