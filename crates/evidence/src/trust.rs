//! Trust-level vocabulary shared between the generator and the verifier.

use serde::{Deserialize, Serialize};

/// How a given datum was validated.
///
/// The levels form a rough lattice: `self-verified` and `proof-verified`
/// mean the verifier re-derived the datum from cryptographic inputs,
/// `consensus-verified-*` additionally binds it to a finalized chain state,
/// while `rpc-sourced` and `api-sourced` mean the datum was accepted from a
/// remote service without an independent check.
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
pub enum TrustLevel {
    /// Recomputed locally from package bytes alone.
    SelfVerified,
    /// Proven against chain state via a Merkle/MPT proof.
    ProofVerified,
    /// Bound to a BLS-finalized beacon state.
    ConsensusVerifiedBeacon,
    /// Bound to an execution-header envelope (weaker than beacon finality).
    ConsensusVerifiedEnvelope,
    /// Read from an RPC node at generation time, not independently proven.
    RpcSourced,
    /// Reported by the Safe REST API, not independently proven.
    ApiSourced,
    /// Supplied by the operator (settings, endpoints).
    UserProvided,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_are_kebab_case() {
        assert_eq!(
            serde_json::to_string(&TrustLevel::ConsensusVerifiedBeacon).unwrap(),
            "\"consensus-verified-beacon\""
        );
        assert_eq!(TrustLevel::ApiSourced.to_string(), "api-sourced");
        assert_eq!(
            "proof-verified".parse::<TrustLevel>().unwrap(),
            TrustLevel::ProofVerified
        );
    }
}
