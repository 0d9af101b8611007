//! Just enough SSZ hashing for light-client verification.
//!
//! Only the fixed structures the verifier touches are hashed, so the tree
//! layouts are written out directly instead of pulling in a full SSZ
//! library.

use {
    super::types::{
        BeaconBlockHeader, BlsPublicKeyBytes, ExecutionPayloadHeader, SYNC_COMMITTEE_SIZE,
        SyncCommittee,
    },
    alloy_primitives::B256,
    sha2::{Digest, Sha256},
};

type Chunk = [u8; 32];

const ZERO_CHUNK: Chunk = [0u8; 32];

fn hash_pair(left: &Chunk, right: &Chunk) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Merkleize `chunks` into a tree with `limit` leaves (a power of two),
/// padding with zero chunks.
fn merkleize(chunks: &[Chunk], limit: usize) -> Chunk {
    debug_assert!(limit.is_power_of_two() && chunks.len() <= limit);
    let mut layer: Vec<Chunk> = Vec::with_capacity(limit);
    layer.extend_from_slice(chunks);
    layer.resize(limit, ZERO_CHUNK);
    while layer.len() > 1 {
        layer = layer
            .chunks(2)
            .map(|pair| hash_pair(&pair[0], &pair[1]))
            .collect();
    }
    layer[0]
}

fn uint64_chunk(value: u64) -> Chunk {
    let mut chunk = ZERO_CHUNK;
    chunk[..8].copy_from_slice(&value.to_le_bytes());
    chunk
}

fn bytes_chunk(bytes: &[u8]) -> Chunk {
    let mut chunk = ZERO_CHUNK;
    chunk[..bytes.len()].copy_from_slice(bytes);
    chunk
}

/// `hash_tree_root` of a `ByteList[32]` (the execution header's
/// `extra_data`): one chunk merkleized at limit 1, with the length mixed in.
fn byte_list_root(bytes: &[u8]) -> Chunk {
    let chunks = if bytes.is_empty() {
        Vec::new()
    } else {
        vec![bytes_chunk(bytes)]
    };
    let root = merkleize(&chunks, 1);
    hash_pair(&root, &uint64_chunk(bytes.len() as u64))
}

/// `hash_tree_root` of one compressed BLS public key (`Vector[byte, 48]`).
fn pubkey_root(pubkey: &BlsPublicKeyBytes) -> Chunk {
    let mut second = ZERO_CHUNK;
    second[..16].copy_from_slice(&pubkey.0[32..]);
    hash_pair(&bytes_chunk(&pubkey.0[..32]), &second)
}

/// `hash_tree_root` of a `BeaconBlockHeader` (5 fields, 8 leaves).
pub fn hash_tree_root_header(header: &BeaconBlockHeader) -> B256 {
    let chunks = [
        uint64_chunk(header.slot),
        uint64_chunk(header.proposer_index),
        header.parent_root.0,
        header.state_root.0,
        header.body_root.0,
    ];
    B256::new(merkleize(&chunks, 8))
}

/// `hash_tree_root` of a `SyncCommittee`.
pub fn hash_tree_root_sync_committee(committee: &SyncCommittee) -> B256 {
    let pubkey_roots: Vec<Chunk> = committee.pubkeys.iter().map(pubkey_root).collect();
    let pubkeys_root = merkleize(&pubkey_roots, SYNC_COMMITTEE_SIZE);
    let aggregate_root = pubkey_root(&committee.aggregate_pubkey);
    B256::new(hash_pair(&pubkeys_root, &aggregate_root))
}

/// `hash_tree_root` of a Deneb/Electra `ExecutionPayloadHeader` (17 fields).
pub fn hash_tree_root_execution(header: &ExecutionPayloadHeader) -> B256 {
    let bloom_chunks: Vec<Chunk> = header
        .logs_bloom
        .as_slice()
        .chunks(32)
        .map(bytes_chunk)
        .collect();

    let chunks = [
        header.parent_hash.0,
        bytes_chunk(header.fee_recipient.as_slice()),
        header.state_root.0,
        header.receipts_root.0,
        merkleize(&bloom_chunks, 8),
        header.prev_randao.0,
        uint64_chunk(header.block_number),
        uint64_chunk(header.gas_limit),
        uint64_chunk(header.gas_used),
        uint64_chunk(header.timestamp),
        byte_list_root(&header.extra_data),
        header.base_fee_per_gas.to_le_bytes::<32>(),
        header.block_hash.0,
        header.transactions_root.0,
        header.withdrawals_root.0,
        uint64_chunk(header.blob_gas_used),
        uint64_chunk(header.excess_blob_gas),
    ];
    B256::new(merkleize(&chunks, 32))
}

/// Verify a Merkle branch: fold `leaf` up through `branch`, taking the
/// sibling side from the bits of `index`, and compare against `root`.
pub fn is_valid_merkle_branch(
    leaf: B256,
    branch: &[B256],
    depth: u32,
    index: u64,
    root: B256,
) -> bool {
    if branch.len() != depth as usize {
        return false;
    }
    let mut node = leaf.0;
    for (level, sibling) in branch.iter().enumerate() {
        node = if index >> level & 1 == 1 {
            hash_pair(&sibling.0, &node)
        } else {
            hash_pair(&node, &sibling.0)
        };
    }
    node == root.0
}

/// Fold a leaf up a branch to produce the root it would verify against.
/// Test-fixture helper, inverse of [`is_valid_merkle_branch`].
pub fn branch_root(leaf: B256, branch: &[B256], index: u64) -> B256 {
    let mut node = leaf.0;
    for (level, sibling) in branch.iter().enumerate() {
        node = if index >> level & 1 == 1 {
            hash_pair(&sibling.0, &node)
        } else {
            hash_pair(&node, &sibling.0)
        };
    }
    B256::new(node)
}

/// `hash_tree_root(ForkData { current_version, genesis_validators_root })`.
pub fn compute_fork_data_root(fork_version: [u8; 4], genesis_validators_root: B256) -> B256 {
    B256::new(hash_pair(
        &bytes_chunk(&fork_version),
        &genesis_validators_root.0,
    ))
}

/// 32-byte signing domain: type ‖ fork-data-root prefix.
pub fn compute_domain(
    domain_type: [u8; 4],
    fork_version: [u8; 4],
    genesis_validators_root: B256,
) -> [u8; 32] {
    let fork_data_root = compute_fork_data_root(fork_version, genesis_validators_root);
    let mut domain = [0u8; 32];
    domain[..4].copy_from_slice(&domain_type);
    domain[4..].copy_from_slice(&fork_data_root.0[..28]);
    domain
}

/// `hash_tree_root(SigningData { object_root, domain })`.
pub fn compute_signing_root(object_root: B256, domain: [u8; 32]) -> B256 {
    B256::new(hash_pair(&object_root.0, &domain))
}
