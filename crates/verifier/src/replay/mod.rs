//! Local replay of the packaged simulation against a witnessed world state.
//!
//! The replay re-encodes the `execTransaction` call from the package's own
//! transaction and confirmations, executes it on an EVM seeded exclusively
//! with proven state (plus the declared overrides), and cross-checks the
//! outcome against what the simulation claimed.

pub mod db;

use {
    crate::{
        cancel::CancellationToken,
        policy::{self, PolicyError},
        trie,
    },
    alloy_primitives::{Address, B256, Bytes, U256, keccak256},
    alloy_sol_types::{SolCall, sol},
    db::{WitnessDb, WitnessedAccount},
    evidence::{
        Confirmation, EvidencePackage, Simulation, SimulationLog, SimulationWitness,
        StorageProofEntry, ser::DecimalU256,
    },
    revm::{
        Context, ExecuteEvm, MainBuilder, MainContext,
        context::{
            TxEnv,
            result::{EVMError, ExecutionResult},
        },
        primitives::{TxKind, hardfork::SpecId},
        state::{AccountInfo, Bytecode},
    },
    serde::Serialize,
    serde_with::serde_as,
    std::collections::HashMap,
};

sol! {
    function execTransaction(
        address to,
        uint256 value,
        bytes calldata data,
        uint8 operation,
        uint256 safeTxGas,
        uint256 baseGas,
        uint256 gasPrice,
        address gasToken,
        address refundReceiver,
        bytes signatures
    ) external returns (bool success);
}

/// Default block gas limit when the simulation does not pin one.
const DEFAULT_GAS_LIMIT: u64 = 30_000_000;

/// What the local replay produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayDetails {
    pub success: bool,
    pub gas_used: u64,
    pub return_data: Bytes,
    pub logs: Vec<SimulationLog>,
}

/// First cross-check that diverged between replay and simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplayMismatch {
    Success,
    ReturnData,
    Logs,
    Gas,
}

impl ReplayMismatch {
    /// Stable machine-readable reason code.
    pub fn reason_code(self) -> &'static str {
        match self {
            Self::Success => "simulation-replay-mismatch-success",
            Self::ReturnData => "simulation-replay-mismatch-return-data",
            Self::Logs => "simulation-replay-mismatch-logs",
            Self::Gas => "simulation-replay-mismatch-gas",
        }
    }
}

/// Why the witness itself was unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WitnessError {
    #[error("witness state root is not the verified root")]
    StateRootMismatch { expected: B256, actual: B256 },
    #[error("witness account proof for {address} failed: {source}")]
    AccountProof {
        address: Address,
        source: PolicyError,
    },
    #[error("witness code for {address} does not hash to the proven codeHash")]
    CodeHashMismatch { address: Address },
    #[error("witness storage proof for {address} slot {key} failed")]
    StorageProof { address: Address, key: B256 },
    #[error("packaged simulation does not match the witness digest")]
    DigestMismatch { expected: B256, actual: B256 },
    #[error("simulation is missing its call context (from / gasLimit)")]
    MissingCallContext,
    #[error("replay execution failed: {0}")]
    Execution(String),
    #[error("replay read state outside the witness: {0}")]
    WitnessIncomplete(String),
}

/// Outcome of the replay step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// Every cross-check passed; the simulation is reproducible locally.
    Verified(ReplayDetails),
    /// Replay ran but diverged from the packaged simulation.
    Mismatch {
        reason: ReplayMismatch,
        details: ReplayDetails,
    },
    /// The witness could not be validated or executed.
    WitnessInvalid(WitnessError),
    Cancelled,
}

/// The canonical serialization the simulation digest commits to. Field
/// order is part of the format.
#[serde_as]
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulationDigest<'a> {
    success: bool,
    return_data: &'a Bytes,
    #[serde_as(as = "DecimalU256")]
    gas_used: U256,
    logs: &'a [SimulationLog],
    block_number: u64,
}

/// Recompute the canonical digest of a packaged simulation.
pub fn simulation_digest(simulation: &Simulation) -> B256 {
    let digest = SimulationDigest {
        success: simulation.success,
        return_data: &simulation.return_data,
        gas_used: simulation.gas_used,
        logs: &simulation.logs,
        block_number: simulation.block_number,
    };
    let bytes = serde_json::to_vec(&digest)
        .unwrap_or_default();
    keccak256(bytes)
}

/// Replay the packaged simulation against `anchored_root` and cross-check.
pub fn replay_simulation(
    package: &EvidencePackage,
    simulation: &Simulation,
    witness: &SimulationWitness,
    anchored_root: B256,
    cancel: &CancellationToken,
) -> ReplayOutcome {
    if cancel.is_cancelled() {
        return ReplayOutcome::Cancelled;
    }
    let db = match build_db(simulation, witness, anchored_root) {
        Ok(db) => db,
        Err(err) => return ReplayOutcome::WitnessInvalid(err),
    };
    if cancel.is_cancelled() {
        return ReplayOutcome::Cancelled;
    }

    let (Some(from), Some(gas_limit)) = (simulation.from, simulation.gas_limit) else {
        return ReplayOutcome::WitnessInvalid(WitnessError::MissingCallContext);
    };
    let gas_limit = u64::try_from(gas_limit).unwrap_or(DEFAULT_GAS_LIMIT);

    let details = match execute(package, witness, db, from, gas_limit) {
        Ok(details) => details,
        Err(err) => return ReplayOutcome::WitnessInvalid(err),
    };

    match cross_check(simulation, &details) {
        None => ReplayOutcome::Verified(details),
        Some(reason) => ReplayOutcome::Mismatch { reason, details },
    }
}

/// Validate every witness proof and assemble the execution database.
fn build_db(
    simulation: &Simulation,
    witness: &SimulationWitness,
    anchored_root: B256,
) -> Result<WitnessDb, WitnessError> {
    if witness.state_root != anchored_root {
        return Err(WitnessError::StateRootMismatch {
            expected: anchored_root,
            actual: witness.state_root,
        });
    }

    let digest = simulation_digest(simulation);
    if digest != witness.simulation_digest {
        return Err(WitnessError::DigestMismatch {
            expected: witness.simulation_digest,
            actual: digest,
        });
    }

    // The Safe's account body anchors the witness to the verified root even
    // when the Safe appears again in the account list.
    policy::verify_account(witness.state_root, &witness.safe_account_proof).map_err(|source| {
        WitnessError::AccountProof {
            address: witness.safe_account_proof.address,
            source,
        }
    })?;

    let mut db = WitnessDb::default();
    for account in &witness.accounts {
        let address = account.proof.address;
        let storage_root =
            policy::verify_account(witness.state_root, &account.proof).map_err(|source| {
                WitnessError::AccountProof { address, source }
            })?;

        let code = match &account.code {
            Some(code) => {
                if keccak256(code) != account.proof.code_hash {
                    return Err(WitnessError::CodeHashMismatch { address });
                }
                Some(code.clone())
            }
            None => None,
        };

        let storage = verified_storage(address, storage_root, &account.storage)?;
        let info = AccountInfo {
            balance: account.proof.balance,
            nonce: account.proof.nonce,
            code_hash: account.proof.code_hash,
            code: code.map(Bytecode::new_raw),
        };
        db.insert(address, WitnessedAccount { info, storage });
    }

    for slot in &witness.overridden_slots {
        db.override_slot(witness.safe_address, slot.key, slot.value);
    }
    Ok(db)
}

fn verified_storage(
    address: Address,
    storage_root: B256,
    entries: &[StorageProofEntry],
) -> Result<HashMap<U256, U256>, WitnessError> {
    let mut storage = HashMap::with_capacity(entries.len());
    for entry in entries {
        let proven = trie::verify_proof(storage_root, keccak256(entry.key), &entry.proof)
            .map_err(|_| WitnessError::StorageProof {
                address,
                key: entry.key,
            })?;
        let value = match proven {
            Some(rlp) => <U256 as alloy_rlp::Decodable>::decode(&mut rlp.as_slice()).map_err(
                |_| WitnessError::StorageProof {
                    address,
                    key: entry.key,
                },
            )?,
            None => U256::ZERO,
        };
        if value != entry.value {
            return Err(WitnessError::StorageProof {
                address,
                key: entry.key,
            });
        }
        storage.insert(U256::from_be_bytes(entry.key.0), value);
    }
    Ok(storage)
}

/// Re-encode `execTransaction` and run it on the witnessed state.
fn execute(
    package: &EvidencePackage,
    witness: &SimulationWitness,
    db: WitnessDb,
    from: Address,
    gas_limit: u64,
) -> Result<ReplayDetails, WitnessError> {
    let calldata = encode_exec_transaction(package);
    let nonce = db.nonce_of(&from);
    let chain_id = package.chain_id;
    let block_number = witness.block_number;
    let timestamp = witness
        .block_timestamp
        .unwrap_or_else(|| u64::try_from(package.packaged_at.timestamp()).unwrap_or_default());

    let mut evm = Context::mainnet()
        .with_db(db)
        .modify_cfg_chained(|cfg| {
            cfg.chain_id = chain_id;
            cfg.spec = SpecId::CANCUN;
        })
        .modify_block_chained(|block| {
            block.number = block_number;
            block.timestamp = timestamp;
            block.gas_limit = gas_limit.max(DEFAULT_GAS_LIMIT);
            block.basefee = 0;
        })
        .build_mainnet();

    let tx = TxEnv {
        caller: from,
        gas_limit,
        // Zero gas price so an unfunded witnessed sender can still replay.
        gas_price: 0,
        kind: TxKind::Call(package.safe_address),
        data: calldata.into(),
        value: U256::ZERO,
        nonce,
        chain_id: Some(chain_id),
        ..Default::default()
    };

    let outcome = evm.transact(tx).map_err(|err| match err {
        EVMError::Database(db_err) => WitnessError::WitnessIncomplete(db_err.to_string()),
        other => WitnessError::Execution(other.to_string()),
    })?;

    Ok(match outcome.result {
        ExecutionResult::Success {
            gas_used,
            logs,
            output,
            ..
        } => ReplayDetails {
            success: true,
            gas_used,
            return_data: output.into_data(),
            logs: logs
                .into_iter()
                .map(|log| SimulationLog {
                    address: log.address,
                    topics: log.data.topics().to_vec(),
                    data: log.data.data.clone(),
                })
                .collect(),
        },
        ExecutionResult::Revert { gas_used, output } => ReplayDetails {
            success: false,
            gas_used,
            return_data: output,
            logs: Vec::new(),
        },
        ExecutionResult::Halt { gas_used, .. } => ReplayDetails {
            success: false,
            gas_used,
            return_data: Bytes::new(),
            logs: Vec::new(),
        },
    })
}

/// Build the `execTransaction` calldata from package data alone. The Safe
/// requires signatures sorted ascending by signer address.
pub fn encode_exec_transaction(package: &EvidencePackage) -> Vec<u8> {
    let mut confirmations: Vec<&Confirmation> = package.confirmations.iter().collect();
    confirmations.sort_by_key(|confirmation| confirmation.owner);
    let mut signatures = Vec::with_capacity(confirmations.len() * 65);
    for confirmation in confirmations {
        signatures.extend_from_slice(confirmation.signature.as_ref());
    }

    let tx = &package.transaction;
    execTransactionCall {
        to: tx.to,
        value: tx.value,
        data: tx.data.clone(),
        operation: u8::from(tx.operation),
        safeTxGas: tx.safe_tx_gas,
        baseGas: tx.base_gas,
        gasPrice: tx.gas_price,
        gasToken: tx.gas_token,
        refundReceiver: tx.refund_receiver,
        signatures: signatures.into(),
    }
    .abi_encode()
}

/// Compare replay output against the packaged simulation, in check order.
fn cross_check(simulation: &Simulation, replay: &ReplayDetails) -> Option<ReplayMismatch> {
    if replay.success != simulation.success {
        return Some(ReplayMismatch::Success);
    }
    if replay.return_data != simulation.return_data {
        return Some(ReplayMismatch::ReturnData);
    }
    if simulation.trace_available && !simulation.logs.is_empty() && replay.logs != simulation.logs {
        return Some(ReplayMismatch::Logs);
    }
    // Local replay may be cheaper (warm-state differences) but never
    // costlier than the packaged execution.
    if U256::from(replay.gas_used) > simulation.gas_used {
        return Some(ReplayMismatch::Gas);
    }
    None
}

#[cfg(test)]
pub(crate) mod tests {
    use {
        super::*,
        crate::trie::tests::build_trie,
        alloy_primitives::{address, hex},
        evidence::{
            AccountProof, ExportContract, Operation, OverriddenSlot, SafeTransaction,
            WitnessAccount,
        },
        std::collections::BTreeMap,
    };

    const SAFE: Address = address!("9f0000000000000000000000000000000000213e");
    const SENDER: Address = address!("00000000000000000000000000000000000000f0");

    /// PUSH1 42, MSTORE, LOG0(mem[0..32]), RETURN(mem[0..32]).
    pub(crate) const CODE_LOG_AND_RETURN_42: &[u8] = &hex!("602a60005260206000a060206000f3");
    /// SLOAD(0), MSTORE, RETURN(mem[0..32]).
    pub(crate) const CODE_RETURN_SLOT_0: &[u8] = &hex!("60005460005260206000f3");
    /// REVERT(0, 0).
    pub(crate) const CODE_REVERT: &[u8] = &hex!("60006000fd");

    fn returned_word(value: u8) -> Bytes {
        let mut word = [0u8; 32];
        word[31] = value;
        Bytes::from(word.to_vec())
    }

    pub(crate) struct Fixture {
        pub(crate) package: EvidencePackage,
        pub(crate) simulation: Simulation,
        pub(crate) witness: SimulationWitness,
        pub(crate) state_root: B256,
    }

    /// Build a witnessed world where the Safe's "code" is a tiny test
    /// program, so the replay machinery can be exercised without the real
    /// singleton bytecode.
    pub(crate) fn fixture(code: &[u8], storage_slots: &[(B256, U256)]) -> Fixture {
        // Storage trie for the Safe.
        let leaves: BTreeMap<B256, Vec<u8>> = storage_slots
            .iter()
            .map(|(key, value)| (keccak256(key), alloy_rlp::encode(value)))
            .collect();
        let targets: Vec<B256> = storage_slots.iter().map(|(k, _)| keccak256(k)).collect();
        let (storage_root, storage_proofs) = if storage_slots.is_empty() {
            (alloy_trie::EMPTY_ROOT_HASH, BTreeMap::new())
        } else {
            build_trie(&leaves, &targets)
        };

        // State trie with the Safe account.
        #[derive(alloy_rlp::RlpEncodable)]
        struct Account {
            nonce: u64,
            balance: U256,
            storage_root: B256,
            code_hash: B256,
        }
        let account = Account {
            nonce: 5,
            balance: U256::ZERO,
            storage_root,
            code_hash: keccak256(code),
        };
        let account_key = keccak256(SAFE);
        let (state_root, account_proofs) = build_trie(
            &BTreeMap::from([(account_key, alloy_rlp::encode(&account))]),
            &[account_key],
        );

        let proof = AccountProof {
            address: SAFE,
            nonce: 5,
            balance: U256::ZERO,
            storage_hash: storage_root,
            code_hash: keccak256(code),
            proof: account_proofs[&account_key].clone(),
        };

        let simulation = Simulation {
            success: true,
            return_data: returned_word(42),
            gas_used: U256::from(100_000u64),
            logs: vec![],
            native_transfers: None,
            block_number: 19_000_000,
            trace_available: false,
            from: Some(SENDER),
            gas_limit: Some(U256::from(1_000_000u64)),
        };

        let witness = SimulationWitness {
            chain_id: 1,
            safe_address: SAFE,
            block_number: 19_000_000,
            block_timestamp: Some(1_700_000_000),
            state_root,
            safe_account_proof: proof.clone(),
            accounts: vec![WitnessAccount {
                proof,
                code: Some(Bytes::copy_from_slice(code)),
                storage: storage_slots
                    .iter()
                    .map(|(key, value)| StorageProofEntry {
                        key: *key,
                        value: *value,
                        proof: storage_proofs[&keccak256(key)].clone(),
                    })
                    .collect(),
            }],
            overridden_slots: vec![],
            simulation_digest: simulation_digest(&simulation),
        };

        let package = EvidencePackage {
            version: "1".into(),
            chain_id: 1,
            safe_address: SAFE,
            safe_tx_hash: B256::ZERO,
            transaction: SafeTransaction {
                to: Address::repeat_byte(0x11),
                value: U256::ZERO,
                data: Bytes::new(),
                operation: Operation::Call,
                safe_tx_gas: U256::ZERO,
                base_gas: U256::ZERO,
                gas_price: U256::ZERO,
                gas_token: Address::ZERO,
                refund_receiver: Address::ZERO,
                nonce: U256::from(28),
            },
            confirmations: vec![],
            confirmations_required: 1,
            data_decoded: None,
            onchain_policy_proof: None,
            consensus_proof: None,
            simulation: Some(simulation.clone()),
            simulation_witness: Some(witness.clone()),
            export_contract: ExportContract::complete(),
            packaged_at: "2026-01-15T12:00:00Z".parse().unwrap(),
            sources: None,
        };

        Fixture {
            package,
            simulation,
            witness,
            state_root,
        }
    }

    #[test]
    fn honest_witness_replays_and_verifies() {
        let fixture = fixture(CODE_LOG_AND_RETURN_42, &[]);
        let mut simulation = fixture.simulation.clone();
        // The program emits one log; claim it with trace available.
        simulation.trace_available = true;
        simulation.logs = vec![SimulationLog {
            address: SAFE,
            topics: vec![],
            data: returned_word(42),
        }];
        let mut witness = fixture.witness.clone();
        witness.simulation_digest = simulation_digest(&simulation);

        let outcome = replay_simulation(
            &fixture.package,
            &simulation,
            &witness,
            fixture.state_root,
            &CancellationToken::new(),
        );
        match outcome {
            ReplayOutcome::Verified(details) => {
                assert!(details.success);
                assert_eq!(details.return_data, returned_word(42));
                assert_eq!(details.logs.len(), 1);
                assert!(U256::from(details.gas_used) <= simulation.gas_used);
            }
            other => panic!("expected verified replay, got {other:?}"),
        }
    }

    #[test]
    fn status_divergence_is_a_success_mismatch() {
        let fixture = fixture(CODE_REVERT, &[]);
        // Simulation claims success but the code reverts.
        let outcome = replay_simulation(
            &fixture.package,
            &fixture.simulation,
            &fixture.witness,
            fixture.state_root,
            &CancellationToken::new(),
        );
        match outcome {
            ReplayOutcome::Mismatch { reason, details } => {
                assert_eq!(reason, ReplayMismatch::Success);
                assert_eq!(reason.reason_code(), "simulation-replay-mismatch-success");
                assert!(!details.success);
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn return_data_divergence_is_detected() {
        let fixture = fixture(CODE_LOG_AND_RETURN_42, &[]);
        let mut simulation = fixture.simulation.clone();
        simulation.return_data = returned_word(41);
        let mut witness = fixture.witness.clone();
        witness.simulation_digest = simulation_digest(&simulation);

        let outcome = replay_simulation(
            &fixture.package,
            &simulation,
            &witness,
            fixture.state_root,
            &CancellationToken::new(),
        );
        assert!(matches!(
            outcome,
            ReplayOutcome::Mismatch {
                reason: ReplayMismatch::ReturnData,
                ..
            }
        ));
    }

    #[test]
    fn witnessed_storage_feeds_the_replay() {
        let slot = B256::ZERO;
        let fixture = fixture(CODE_RETURN_SLOT_0, &[(slot, U256::from(7))]);
        let mut simulation = fixture.simulation.clone();
        simulation.return_data = returned_word(7);
        let mut witness = fixture.witness.clone();
        witness.simulation_digest = simulation_digest(&simulation);

        let outcome = replay_simulation(
            &fixture.package,
            &simulation,
            &witness,
            fixture.state_root,
            &CancellationToken::new(),
        );
        assert!(matches!(outcome, ReplayOutcome::Verified(_)), "{outcome:?}");
    }

    #[test]
    fn overridden_slots_shadow_witnessed_storage() {
        let slot = B256::ZERO;
        let fixture = fixture(CODE_RETURN_SLOT_0, &[(slot, U256::from(7))]);
        let mut simulation = fixture.simulation.clone();
        simulation.return_data = returned_word(42);
        let mut witness = fixture.witness.clone();
        witness.overridden_slots = vec![OverriddenSlot {
            key: slot,
            value: B256::with_last_byte(42),
        }];
        witness.simulation_digest = simulation_digest(&simulation);

        let outcome = replay_simulation(
            &fixture.package,
            &simulation,
            &witness,
            fixture.state_root,
            &CancellationToken::new(),
        );
        assert!(matches!(outcome, ReplayOutcome::Verified(_)), "{outcome:?}");
    }

    #[test]
    fn unanchored_witness_is_rejected() {
        let fixture = fixture(CODE_LOG_AND_RETURN_42, &[]);
        let outcome = replay_simulation(
            &fixture.package,
            &fixture.simulation,
            &fixture.witness,
            B256::repeat_byte(0xaa),
            &CancellationToken::new(),
        );
        assert!(matches!(
            outcome,
            ReplayOutcome::WitnessInvalid(WitnessError::StateRootMismatch { .. })
        ));
    }

    #[test]
    fn tampered_simulation_fails_the_digest_check() {
        let fixture = fixture(CODE_LOG_AND_RETURN_42, &[]);
        let mut simulation = fixture.simulation.clone();
        simulation.gas_used = U256::from(99u64);
        let outcome = replay_simulation(
            &fixture.package,
            &simulation,
            &fixture.witness,
            fixture.state_root,
            &CancellationToken::new(),
        );
        assert!(matches!(
            outcome,
            ReplayOutcome::WitnessInvalid(WitnessError::DigestMismatch { .. })
        ));
    }

    #[test]
    fn cancellation_short_circuits() {
        let fixture = fixture(CODE_LOG_AND_RETURN_42, &[]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(
            replay_simulation(
                &fixture.package,
                &fixture.simulation,
                &fixture.witness,
                fixture.state_root,
                &cancel,
            ),
            ReplayOutcome::Cancelled
        );
    }

    #[test]
    fn digest_is_order_stable() {
        let fixture = fixture(CODE_LOG_AND_RETURN_42, &[]);
        assert_eq!(
            simulation_digest(&fixture.simulation),
            simulation_digest(&fixture.simulation.clone()),
        );
    }
}
