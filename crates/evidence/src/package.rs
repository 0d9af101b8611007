//! The evidence package root document and the Safe transaction it wraps.

use {
    crate::{
        export::ExportContract,
        proof::{ConsensusProof, OnchainPolicyProof, Simulation, SimulationWitness},
        ser::DecimalU256,
    },
    alloy_primitives::{Address, B256, Bytes, U256},
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    serde_with::serde_as,
    std::collections::BTreeMap,
};

/// Root document bundling one pending Safe transaction with everything the
/// verifier needs to re-derive claims about it.
///
/// Immutable once constructed; the verifier only ever borrows it.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidencePackage {
    /// Schema version. See [`crate::KNOWN_VERSIONS`].
    pub version: String,
    pub chain_id: u64,
    pub safe_address: Address,
    /// The hash the generator claims for this transaction. The verifier
    /// recomputes it and never trusts this field.
    pub safe_tx_hash: B256,
    pub transaction: SafeTransaction,
    /// Confirmations in the order the Safe service returned them. Order is
    /// significant and preserved end to end.
    pub confirmations: Vec<Confirmation>,
    pub confirmations_required: u32,
    /// API-reported calldata decoding, if the service provided one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_decoded: Option<DataDecoded>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onchain_policy_proof: Option<OnchainPolicyProof>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus_proof: Option<ConsensusProof>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation: Option<Simulation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation_witness: Option<SimulationWitness>,
    pub export_contract: ExportContract,
    /// The only time reference the verifier is allowed to use.
    pub packaged_at: DateTime<Utc>,
    /// Where the generator fetched each artifact. Display only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<BTreeMap<String, String>>,
}

/// The ten EIP-712 `SafeTx` struct fields, exactly as hashed on-chain.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeTransaction {
    pub to: Address,
    #[serde_as(as = "DecimalU256")]
    pub value: U256,
    pub data: Bytes,
    pub operation: Operation,
    #[serde_as(as = "DecimalU256")]
    pub safe_tx_gas: U256,
    #[serde_as(as = "DecimalU256")]
    pub base_gas: U256,
    #[serde_as(as = "DecimalU256")]
    pub gas_price: U256,
    pub gas_token: Address,
    pub refund_receiver: Address,
    #[serde_as(as = "DecimalU256")]
    pub nonce: U256,
}

/// Safe operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Operation {
    Call,
    DelegateCall,
}

impl TryFrom<u8> for Operation {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Call),
            1 => Ok(Self::DelegateCall),
            other => Err(format!("operation must be 0 or 1, got {other}")),
        }
    }
}

impl From<Operation> for u8 {
    fn from(value: Operation) -> Self {
        match value {
            Operation::Call => 0,
            Operation::DelegateCall => 1,
        }
    }
}

/// One owner's confirmation of the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub owner: Address,
    /// Packed 65-byte `r ‖ s ‖ v` blob as the Safe contract consumes it.
    pub signature: Bytes,
    /// Scheme the service claims. Verification classifies from the `v`
    /// byte itself and does not trust this.
    pub scheme: SignatureScheme,
}

/// Safe signature encodings.
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
pub enum SignatureScheme {
    /// Plain ECDSA over the EIP-712 digest (`v` ∈ {27, 28}).
    Ecdsa,
    /// ECDSA over the EIP-191 wrap of the digest (`v` ∈ {31, 32}).
    EthSign,
    /// On-chain pre-approval (`v` = 1).
    ApprovedHash,
    /// EIP-1271 contract signature (`v` = 0).
    Contract,
}

/// API-reported decoding of a calldata blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataDecoded {
    pub method: String,
    #[serde(default)]
    pub parameters: Vec<DecodedParameter>,
}

/// One decoded parameter as the API reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    /// The claimed value; shape depends on `param_type`.
    pub value: serde_json::Value,
    /// For `multiSend`, the decoded child transactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_decoded: Option<Vec<InnerCall>>,
}

/// A child call inside a decoded `multiSend` batch.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InnerCall {
    pub operation: Operation,
    pub to: Address,
    #[serde_as(as = "DecimalU256")]
    pub value: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_decoded: Option<DataDecoded>,
}
