//! On-chain policy-proof verification.
//!
//! Re-derives the Safe's owner set, threshold, nonce, modules, guard,
//! fallback handler, and singleton from MPT storage proofs at a pinned
//! execution block, and compares them against the generator's claims.
//! Failure here only invalidates the policy source; hash and signature
//! checks are unaffected.

pub mod layout;

use {
    crate::trie::{self, TrieError},
    alloy_primitives::{Address, B256, U256, keccak256},
    alloy_rlp::{RlpDecodable, RlpEncodable},
    evidence::{AccountProof, DecodedPolicy, OnchainPolicyProof, StorageProofEntry},
    std::collections::HashMap,
};

/// Policy values re-derived from proven storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPolicy {
    pub owners: Vec<Address>,
    pub threshold: u64,
    pub nonce: u64,
    pub modules: Vec<Address>,
    pub guard: Address,
    pub fallback_handler: Address,
    pub singleton: Address,
    /// Root and block the proof was anchored to, echoed for the composer.
    pub state_root: B256,
    pub block_number: u64,
}

/// Why a policy proof was rejected. The first failure wins; later fields
/// are not inspected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("account proof failed: {0}")]
    AccountProof(TrieError),
    #[error("account absent from state trie")]
    AccountAbsent,
    #[error("account body undecodable: {0}")]
    AccountDecode(String),
    #[error("account {field} mismatch")]
    AccountMismatch { field: &'static str },
    #[error("storage proof for slot {key} failed: {source}")]
    StorageProof { key: B256, source: TrieError },
    #[error("storage value for slot {key} undecodable")]
    StorageDecode { key: B256 },
    #[error("slot {key} proven absent but declared non-zero")]
    AbsentNonZero { key: B256 },
    #[error("storage value for slot {key} does not match the proof")]
    StorageValueMismatch { key: B256 },
    #[error("storage proof contains slot {key} the policy does not need")]
    UnexpectedSlot { key: B256 },
    #[error("duplicate storage proof for slot {key}")]
    DuplicateSlot { key: B256 },
    #[error("required slot {key} missing from storage proof")]
    MissingSlot { key: B256 },
    #[error("owner list malformed: {0}")]
    OwnerList(String),
    #[error("module list malformed: {0}")]
    ModuleList(String),
    #[error("declared policy field {field} does not match proven storage")]
    PolicyMismatch {
        field: &'static str,
        expected: String,
        actual: String,
    },
}

impl PolicyError {
    /// The declared-policy field the first mismatch was found in, if any.
    pub fn mismatched_field(&self) -> Option<&'static str> {
        match self {
            Self::PolicyMismatch { field, .. } => Some(field),
            Self::AccountMismatch { field } => Some(field),
            _ => None,
        }
    }
}

/// The account body proven by an MPT account proof.
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
struct TrieAccount {
    nonce: u64,
    balance: U256,
    storage_root: B256,
    code_hash: B256,
}

/// Verify the full policy proof and reconstruct the Safe configuration.
pub fn verify_policy_proof(proof: &OnchainPolicyProof) -> Result<VerifiedPolicy, PolicyError> {
    let storage_root = verify_account(proof.state_root, &proof.account_proof)?;
    let storage = verify_storage(storage_root, &proof.storage_proof, &proof.decoded_policy)?;
    let policy = reconstruct(&storage, &proof.decoded_policy)?;
    compare(&policy, &proof.decoded_policy)?;

    Ok(VerifiedPolicy {
        owners: policy.owners,
        threshold: policy.threshold,
        nonce: policy.nonce,
        modules: policy.modules,
        guard: policy.guard,
        fallback_handler: policy.fallback_handler,
        singleton: policy.singleton,
        state_root: proof.state_root,
        block_number: proof.block_number,
    })
}

/// Walk the account trie and cross-check the declared account body.
/// Returns the proven storage root. Shared with the simulation-witness
/// verifier.
pub(crate) fn verify_account(
    state_root: B256,
    account: &AccountProof,
) -> Result<B256, PolicyError> {
    let value = trie::verify_proof(
        state_root,
        keccak256(account.address),
        &account.proof,
    )
    .map_err(PolicyError::AccountProof)?
    .ok_or(PolicyError::AccountAbsent)?;

    let decoded = <TrieAccount as alloy_rlp::Decodable>::decode(&mut value.as_slice())
        .map_err(|err| PolicyError::AccountDecode(err.to_string()))?;

    if decoded.nonce != account.nonce {
        return Err(PolicyError::AccountMismatch { field: "nonce" });
    }
    if decoded.balance != account.balance {
        return Err(PolicyError::AccountMismatch { field: "balance" });
    }
    if decoded.storage_root != account.storage_hash {
        return Err(PolicyError::AccountMismatch {
            field: "storageHash",
        });
    }
    if decoded.code_hash != account.code_hash {
        return Err(PolicyError::AccountMismatch { field: "codeHash" });
    }
    Ok(decoded.storage_root)
}

/// Verify every storage-proof entry and collect the proven slot values.
///
/// The expected key set is derived from the declared policy; an entry
/// outside it is rejected so a proof cannot carry unrelated slots.
fn verify_storage(
    storage_root: B256,
    entries: &[StorageProofEntry],
    declared: &DecodedPolicy,
) -> Result<HashMap<B256, U256>, PolicyError> {
    let expected = expected_slots(declared);
    let mut proven = HashMap::new();

    for entry in entries {
        if !expected.contains(&entry.key) {
            return Err(PolicyError::UnexpectedSlot { key: entry.key });
        }
        let value = trie::verify_proof(storage_root, keccak256(entry.key), &entry.proof)
            .map_err(|source| PolicyError::StorageProof {
                key: entry.key,
                source,
            })?;

        let proven_value = match value {
            Some(rlp) => <U256 as alloy_rlp::Decodable>::decode(&mut rlp.as_slice())
                .map_err(|_| PolicyError::StorageDecode { key: entry.key })?,
            None if entry.value.is_zero() => U256::ZERO,
            None => return Err(PolicyError::AbsentNonZero { key: entry.key }),
        };
        if proven_value != entry.value {
            return Err(PolicyError::StorageValueMismatch { key: entry.key });
        }
        if proven.insert(entry.key, proven_value).is_some() {
            return Err(PolicyError::DuplicateSlot { key: entry.key });
        }
    }

    for key in expected {
        if !proven.contains_key(&key) {
            return Err(PolicyError::MissingSlot { key });
        }
    }
    Ok(proven)
}

/// Every storage key the declared policy requires a witness for.
fn expected_slots(declared: &DecodedPolicy) -> Vec<B256> {
    let mut slots = vec![
        layout::fixed_slot(layout::SINGLETON_SLOT),
        layout::fixed_slot(layout::OWNER_COUNT_SLOT),
        layout::fixed_slot(layout::THRESHOLD_SLOT),
        layout::fixed_slot(layout::NONCE_SLOT),
        layout::FALLBACK_HANDLER_SLOT,
        layout::GUARD_SLOT,
        layout::owners_head_slot(),
        layout::modules_head_slot(),
    ];
    slots.extend(declared.owners.iter().map(|o| layout::owner_next_slot(*o)));
    slots.extend(declared.modules.iter().map(|m| layout::module_next_slot(*m)));
    slots.dedup();
    slots
}

struct Reconstructed {
    owners: Vec<Address>,
    threshold: u64,
    nonce: u64,
    modules: Vec<Address>,
    guard: Address,
    fallback_handler: Address,
    singleton: Address,
}

fn reconstruct(
    storage: &HashMap<B256, U256>,
    declared: &DecodedPolicy,
) -> Result<Reconstructed, PolicyError> {
    let slot = |key: B256| storage.get(&key).copied().unwrap_or(U256::ZERO);

    let owner_count = slot(layout::fixed_slot(layout::OWNER_COUNT_SLOT));
    let owner_count = u64::try_from(owner_count)
        .map_err(|_| PolicyError::OwnerList("ownerCount exceeds u64".into()))?;

    let owners = walk_list(
        storage,
        layout::owners_head_slot(),
        layout::owner_next_slot,
        owner_count,
    )
    .map_err(PolicyError::OwnerList)?;
    if owners.len() as u64 != owner_count {
        return Err(PolicyError::OwnerList(format!(
            "walked {} owners but ownerCount is {owner_count}",
            owners.len(),
        )));
    }

    // The module list length is whatever the declared set claims; the walk
    // itself still has to terminate at the sentinel within that bound.
    let modules = walk_list(
        storage,
        layout::modules_head_slot(),
        layout::module_next_slot,
        declared.modules.len() as u64,
    )
    .map_err(PolicyError::ModuleList)?;

    let threshold = u64::try_from(slot(layout::fixed_slot(layout::THRESHOLD_SLOT)))
        .map_err(|_| PolicyError::OwnerList("threshold exceeds u64".into()))?;
    let nonce = u64::try_from(slot(layout::fixed_slot(layout::NONCE_SLOT)))
        .map_err(|_| PolicyError::OwnerList("nonce exceeds u64".into()))?;

    Ok(Reconstructed {
        owners,
        threshold,
        nonce,
        modules,
        guard: layout::word_to_address(slot(layout::GUARD_SLOT)),
        fallback_handler: layout::word_to_address(slot(layout::FALLBACK_HANDLER_SLOT)),
        singleton: layout::word_to_address(slot(layout::fixed_slot(layout::SINGLETON_SLOT))),
    })
}

/// Walk a sentinel-terminated linked list for at most `max_len` entries.
/// Rejects cycles, self-links, and walks that leave the proven slot set.
fn walk_list(
    storage: &HashMap<B256, U256>,
    head_slot: B256,
    next_slot: impl Fn(Address) -> B256,
    max_len: u64,
) -> Result<Vec<Address>, String> {
    let mut entries = Vec::new();
    let mut cursor = layout::word_to_address(storage.get(&head_slot).copied().unwrap_or_default());

    if cursor.is_zero() {
        // Uninitialized list head: treat as empty.
        return Ok(entries);
    }

    while cursor != layout::SENTINEL {
        if entries.len() as u64 >= max_len + 1 {
            return Err(format!("list did not terminate within {max_len} entries"));
        }
        if cursor.is_zero() {
            return Err("list pointer reached the zero address".into());
        }
        if entries.contains(&cursor) {
            return Err(format!("cycle at {cursor}"));
        }
        entries.push(cursor);
        let next = storage
            .get(&next_slot(cursor))
            .copied()
            .ok_or_else(|| format!("next pointer of {cursor} not witnessed"))?;
        cursor = layout::word_to_address(next);
    }
    Ok(entries)
}

fn compare(actual: &Reconstructed, declared: &DecodedPolicy) -> Result<(), PolicyError> {
    let mismatch = |field: &'static str, expected: String, got: String| {
        Err(PolicyError::PolicyMismatch {
            field,
            expected,
            actual: got,
        })
    };

    let mut proven_owners = actual.owners.clone();
    proven_owners.sort();
    let mut declared_owners = declared.owners.clone();
    declared_owners.sort();
    if proven_owners != declared_owners {
        return mismatch(
            "owners",
            format!("{declared_owners:?}"),
            format!("{proven_owners:?}"),
        );
    }
    if actual.threshold != declared.threshold {
        return mismatch(
            "threshold",
            declared.threshold.to_string(),
            actual.threshold.to_string(),
        );
    }
    if actual.nonce != declared.nonce {
        return mismatch("nonce", declared.nonce.to_string(), actual.nonce.to_string());
    }

    let mut proven_modules = actual.modules.clone();
    proven_modules.sort();
    let mut declared_modules = declared.modules.clone();
    declared_modules.sort();
    if proven_modules != declared_modules {
        return mismatch(
            "modules",
            format!("{declared_modules:?}"),
            format!("{proven_modules:?}"),
        );
    }
    if actual.guard != declared.guard {
        return mismatch("guard", declared.guard.to_string(), actual.guard.to_string());
    }
    if actual.fallback_handler != declared.fallback_handler {
        return mismatch(
            "fallbackHandler",
            declared.fallback_handler.to_string(),
            actual.fallback_handler.to_string(),
        );
    }
    if actual.singleton != declared.singleton {
        return mismatch(
            "singleton",
            declared.singleton.to_string(),
            actual.singleton.to_string(),
        );
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use {
        super::*,
        crate::trie::tests::build_trie,
        alloy_primitives::{Bytes, address},
        evidence::TrustLevel,
        std::collections::BTreeMap,
    };

    const OWNER_A: Address = address!("00000000000000000000000000000000000000aa");
    const OWNER_B: Address = address!("00000000000000000000000000000000000000bb");
    const OWNER_C: Address = address!("00000000000000000000000000000000000000cc");
    const SINGLETON: Address = address!("d9db270c1b5e3bd161e8c8503c55ceabee709552");

    fn address_word(address: Address) -> U256 {
        U256::from_be_bytes(B256::from(address.into_word()).0)
    }

    /// Build a complete, honest policy proof for a 3-owner Safe with
    /// threshold 2 and no modules/guard/fallback handler.
    pub(crate) fn fixture_proof() -> OnchainPolicyProof {
        // Owner linked list: sentinel -> C -> B -> A -> sentinel.
        let mut slots: Vec<(B256, U256)> = vec![
            (layout::fixed_slot(layout::SINGLETON_SLOT), address_word(SINGLETON)),
            (layout::fixed_slot(layout::OWNER_COUNT_SLOT), U256::from(3)),
            (layout::fixed_slot(layout::THRESHOLD_SLOT), U256::from(2)),
            (layout::fixed_slot(layout::NONCE_SLOT), U256::from(28)),
            (layout::owners_head_slot(), address_word(OWNER_C)),
            (layout::owner_next_slot(OWNER_C), address_word(OWNER_B)),
            (layout::owner_next_slot(OWNER_B), address_word(OWNER_A)),
            (layout::owner_next_slot(OWNER_A), address_word(layout::SENTINEL)),
            (layout::modules_head_slot(), address_word(layout::SENTINEL)),
        ];
        // Fallback handler and guard are unset; witnessed by exclusion.
        let absent = [layout::FALLBACK_HANDLER_SLOT, layout::GUARD_SLOT];

        let leaves: BTreeMap<B256, Vec<u8>> = slots
            .iter()
            .map(|(key, value)| (keccak256(key), alloy_rlp::encode(value)))
            .collect();
        let mut targets: Vec<B256> = slots.iter().map(|(key, _)| keccak256(key)).collect();
        targets.extend(absent.iter().map(keccak256));
        let (storage_root, storage_proofs) = build_trie(&leaves, &targets);

        slots.extend(absent.iter().map(|key| (*key, U256::ZERO)));
        let storage_proof = slots
            .iter()
            .map(|(key, value)| StorageProofEntry {
                key: *key,
                value: *value,
                proof: storage_proofs[&keccak256(key)].clone(),
            })
            .collect();

        // State trie with the Safe account alone.
        let safe = address!("9f0000000000000000000000000000000000213e");
        let account = TrieAccount {
            nonce: 1,
            balance: U256::ZERO,
            storage_root,
            code_hash: keccak256(b"proxy code"),
        };
        let account_key = keccak256(safe);
        let account_leaves =
            BTreeMap::from([(account_key, alloy_rlp::encode(&account))]);
        let (state_root, account_proofs) = build_trie(&account_leaves, &[account_key]);

        OnchainPolicyProof {
            block_number: 19_000_000,
            state_root,
            account_proof: AccountProof {
                address: safe,
                nonce: 1,
                balance: U256::ZERO,
                storage_hash: storage_root,
                code_hash: account.code_hash,
                proof: account_proofs[&account_key].clone(),
            },
            storage_proof,
            decoded_policy: DecodedPolicy {
                owners: vec![OWNER_A, OWNER_B, OWNER_C],
                threshold: 2,
                nonce: 28,
                modules: vec![],
                guard: Address::ZERO,
                fallback_handler: Address::ZERO,
                singleton: SINGLETON,
            },
            trust: TrustLevel::RpcSourced,
        }
    }

    #[test]
    fn honest_proof_reconstructs_policy() {
        let proof = fixture_proof();
        let verified = verify_policy_proof(&proof).unwrap();
        assert_eq!(verified.owners.len(), 3);
        assert_eq!(
            {
                let mut owners = verified.owners.clone();
                owners.sort();
                owners
            },
            vec![OWNER_A, OWNER_B, OWNER_C]
        );
        assert_eq!(verified.threshold, 2);
        assert_eq!(verified.nonce, 28);
        assert_eq!(verified.singleton, SINGLETON);
        assert!(verified.modules.is_empty());
        assert_eq!(verified.guard, Address::ZERO);
    }

    #[test]
    fn tampered_storage_value_fails() {
        let mut proof = fixture_proof();
        let entry = proof
            .storage_proof
            .iter_mut()
            .find(|e| e.key == layout::fixed_slot(layout::THRESHOLD_SLOT))
            .unwrap();
        entry.value = U256::from(1);
        assert!(matches!(
            verify_policy_proof(&proof),
            Err(PolicyError::StorageValueMismatch { .. })
        ));
    }

    #[test]
    fn tampered_node_byte_fails() {
        let mut proof = fixture_proof();
        let entry = &mut proof.storage_proof[0];
        let mut node = entry.proof[0].to_vec();
        node[0] ^= 0x01;
        entry.proof[0] = Bytes::from(node);
        assert!(matches!(
            verify_policy_proof(&proof),
            Err(PolicyError::StorageProof { .. })
        ));
    }

    #[test]
    fn unused_slot_is_rejected() {
        let mut proof = fixture_proof();
        proof.storage_proof.push(StorageProofEntry {
            key: layout::fixed_slot(99),
            value: U256::ZERO,
            proof: vec![],
        });
        assert!(matches!(
            verify_policy_proof(&proof),
            Err(PolicyError::UnexpectedSlot { .. })
        ));
    }

    #[test]
    fn missing_required_slot_is_rejected() {
        let mut proof = fixture_proof();
        proof
            .storage_proof
            .retain(|e| e.key != layout::fixed_slot(layout::NONCE_SLOT));
        assert!(matches!(
            verify_policy_proof(&proof),
            Err(PolicyError::MissingSlot { .. })
        ));
    }

    #[test]
    fn declared_mismatch_reports_first_field() {
        let mut proof = fixture_proof();
        proof.decoded_policy.threshold = 3;
        let err = verify_policy_proof(&proof).unwrap_err();
        assert_eq!(err.mismatched_field(), Some("threshold"));
    }

    #[test]
    fn account_body_mismatch_fails() {
        let mut proof = fixture_proof();
        proof.account_proof.nonce = 7;
        assert!(matches!(
            verify_policy_proof(&proof),
            Err(PolicyError::AccountMismatch { field: "nonce" })
        ));
    }
}
