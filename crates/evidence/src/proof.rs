//! Proof artifacts: policy proofs, consensus envelopes, and simulation
//! witnesses.

use {
    crate::{ser::DecimalU256, trust::TrustLevel},
    alloy_primitives::{Address, B256, Bytes, U256},
    serde::{Deserialize, Serialize},
    serde_with::serde_as,
};

/// Merkle-Patricia storage proof witnessing the Safe's configuration at a
/// pinned execution block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnchainPolicyProof {
    pub block_number: u64,
    /// Execution state root the proof is anchored to.
    pub state_root: B256,
    pub account_proof: AccountProof,
    /// Per-slot proofs under the account's storage root. Order is not
    /// significant but keys must be unique and all required by the policy.
    pub storage_proof: Vec<StorageProofEntry>,
    /// Values the generator claims the proof encodes.
    pub decoded_policy: DecodedPolicy,
    /// Trust label chosen by the generator for how it obtained the root.
    pub trust: TrustLevel,
}

/// An `eth_getProof`-shaped account proof.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProof {
    pub address: Address,
    pub nonce: u64,
    #[serde_as(as = "DecimalU256")]
    pub balance: U256,
    pub storage_hash: B256,
    pub code_hash: B256,
    /// MPT nodes from the state root down to the account leaf.
    pub proof: Vec<Bytes>,
}

/// One storage-slot proof under an account's storage root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageProofEntry {
    /// The raw (unhashed) storage slot key.
    pub key: B256,
    /// The claimed value; zero for slots proven absent.
    pub value: U256,
    pub proof: Vec<Bytes>,
}

/// The Safe configuration the generator claims the storage proves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedPolicy {
    /// Owner set, sorted ascending by address.
    pub owners: Vec<Address>,
    pub threshold: u64,
    pub nonce: u64,
    /// Enabled modules, sorted ascending by address.
    #[serde(default)]
    pub modules: Vec<Address>,
    /// Zero when no guard is set.
    pub guard: Address,
    /// Zero when no fallback handler is set.
    pub fallback_handler: Address,
    /// The master copy this proxy delegates to.
    pub singleton: Address,
}

/// Wire name of a consensus mode; used for dispatch and reporting.
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
pub enum ConsensusMode {
    Beacon,
    Opstack,
    Linea,
}

/// Cryptographic binding from the policy proof's execution block to a
/// finalized chain state.
///
/// A tagged union on `consensusMode`: a wrong-mode field cannot exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "consensusMode")]
pub enum ConsensusProof {
    #[serde(rename = "beacon")]
    Beacon(BeaconProof),
    #[serde(rename = "opstack")]
    Opstack(ExecutionEnvelope),
    #[serde(rename = "linea")]
    Linea(ExecutionEnvelope),
}

impl ConsensusProof {
    pub fn mode(&self) -> ConsensusMode {
        match self {
            Self::Beacon(_) => ConsensusMode::Beacon,
            Self::Opstack(_) => ConsensusMode::Opstack,
            Self::Linea(_) => ConsensusMode::Linea,
        }
    }
}

/// Beacon light-client evidence: bootstrap, committee-period updates, and a
/// finality update, all in beacon-API JSON.
///
/// The light-client structures are kept as raw JSON here; the consensus
/// verifier owns their parsing so a malformed bootstrap surfaces as a
/// verification error code, not a schema error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeaconProof {
    /// Trusted checkpoint: the root of a known-finalized beacon block.
    pub checkpoint: B256,
    pub bootstrap: serde_json::Value,
    /// Sync-committee-period updates, oldest first.
    #[serde(default)]
    pub updates: Vec<serde_json::Value>,
    pub finality_update: serde_json::Value,
    /// Network identifier (`mainnet`, `sepolia`).
    pub network: String,
    /// Finalized slot the generator claims.
    pub slot: u64,
    /// Execution state root the generator claims for the finalized header.
    pub state_root: B256,
    /// Execution block number the generator claims.
    pub block_number: u64,
}

/// Execution-header envelope for chains without an embedded light client
/// (OP-Stack, Linea). Strictly weaker assurance than beacon finality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionEnvelope {
    pub chain_id: u64,
    pub proof_payload: EnvelopePayload,
}

/// The pinned execution block header inside an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopePayload {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub state_root: B256,
    /// Unix seconds.
    pub timestamp: u64,
}

/// Result of the simulation the generator fetched (typically from a trace
/// provider). All fields are API-sourced until replayed.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Simulation {
    pub success: bool,
    pub return_data: Bytes,
    #[serde_as(as = "DecimalU256")]
    pub gas_used: U256,
    /// Ordered event log. Order is significant.
    #[serde(default)]
    pub logs: Vec<SimulationLog>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_transfers: Option<Vec<NativeTransfer>>,
    pub block_number: u64,
    /// Whether the provider returned a full trace; gates log comparison.
    pub trace_available: bool,
    /// Sender of the `execTransaction` call. Required when a witness is
    /// attached, since the replay needs the original call context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    /// Gas limit of the simulated call. Required when a witness is attached.
    #[serde_as(as = "Option<DecimalU256>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<U256>,
}

/// One emitted log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

/// A native (ETH) transfer observed in the simulation trace.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeTransfer {
    pub from: Address,
    pub to: Address,
    #[serde_as(as = "DecimalU256")]
    pub value: U256,
}

/// Proof of the world state the packaged simulation ran against, sufficient
/// to replay it locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationWitness {
    pub chain_id: u64,
    pub safe_address: Address,
    pub block_number: u64,
    /// Unix seconds of the witnessed block, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_timestamp: Option<u64>,
    /// State root the witness accounts are proven under. Must equal the
    /// consensus-verified or policy-proof root.
    pub state_root: B256,
    pub safe_account_proof: AccountProof,
    /// Additional accounts the simulation touched (singleton, tokens, …).
    #[serde(default)]
    pub accounts: Vec<WitnessAccount>,
    /// Storage slots the generator overrode before simulating (e.g. a
    /// threshold lowered to 1). Applied verbatim by the replay.
    #[serde(default)]
    pub overridden_slots: Vec<OverriddenSlot>,
    /// keccak256 of the canonical serialization of the packaged simulation.
    pub simulation_digest: B256,
}

/// One witnessed account: proof, optional bytecode, and touched storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WitnessAccount {
    pub proof: AccountProof,
    /// Runtime bytecode; must hash to the proven `codeHash`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Bytes>,
    /// Storage slots the simulation read, proven under the account's
    /// storage root.
    #[serde(default)]
    pub storage: Vec<StorageProofEntry>,
}

/// An explicit storage override applied before the simulated call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverriddenSlot {
    pub key: B256,
    pub value: B256,
}
