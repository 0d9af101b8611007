//! Data model for SafeLens evidence packages.
//!
//! An evidence package is a single JSON document bundling a pending Safe
//! transaction, its confirmations, and the optional cryptographic artifacts
//! (policy proof, consensus proof, simulation witness) that allow the
//! verifier to re-derive every claim locally. This crate owns the wire
//! format and its schema validation; it performs no verification itself.

pub mod export;
pub mod package;
pub mod proof;
pub mod schema;
pub mod ser;
pub mod trust;

pub use {
    export::{ExportContract, ExportContractReason},
    package::{
        Confirmation, DataDecoded, DecodedParameter, EvidencePackage, InnerCall, Operation,
        SafeTransaction, SignatureScheme,
    },
    proof::{
        AccountProof, BeaconProof, ConsensusMode, ConsensusProof, DecodedPolicy, EnvelopePayload,
        ExecutionEnvelope, NativeTransfer, OnchainPolicyProof, OverriddenSlot, Simulation,
        SimulationLog, SimulationWitness, StorageProofEntry, WitnessAccount,
    },
    schema::{ParseMode, ParsedPackage, SchemaError},
    trust::TrustLevel,
};

/// The set of schema versions this build understands.
pub const KNOWN_VERSIONS: &[&str] = &["1"];
