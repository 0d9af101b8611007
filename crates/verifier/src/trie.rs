//! Merkle-Patricia-Trie proof walking.
//!
//! One walker serves both the account trie and storage tries: the caller
//! passes the already-keccak-hashed key and the proof nodes, and gets back
//! the RLP-encoded terminal value, or `None` when the proof shows the key
//! absent. Node type is inferred from list arity and the terminator bit of
//! the hex-prefix header byte.

use {
    alloy_primitives::{B256, Bytes, keccak256},
    alloy_rlp::Header,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrieError {
    #[error("malformed trie node at depth {depth}: {reason}")]
    NodeDecode { depth: usize, reason: String },
    #[error("node hash mismatch at depth {depth}")]
    HashMismatch { depth: usize },
    #[error("proof ended early at depth {depth}")]
    MissingNode { depth: usize },
    #[error("{count} unused trailing proof nodes")]
    TrailingNodes { count: usize },
}

/// Verify one proof path and return the RLP-encoded value at `hashed_key`,
/// or `None` when the proof demonstrates absence.
///
/// Every supplied node must be used; trailing nodes are rejected so a proof
/// cannot smuggle unrelated data past the verifier.
pub fn verify_proof(
    root: B256,
    hashed_key: B256,
    nodes: &[Bytes],
) -> Result<Option<Vec<u8>>, TrieError> {
    let path = nibbles(hashed_key.as_slice());
    let mut offset = 0usize;
    let mut next_node = 0usize;
    let mut pending = Pending::Hash(root);

    loop {
        let depth = next_node;
        let owned;
        let node_bytes: &[u8] = match &pending {
            Pending::Hash(expected) => {
                let node = nodes
                    .get(next_node)
                    .ok_or(TrieError::MissingNode { depth })?;
                next_node += 1;
                if keccak256(node) != *expected {
                    return Err(TrieError::HashMismatch { depth });
                }
                node.as_ref()
            }
            Pending::Inline(bytes) => {
                owned = bytes.clone();
                &owned
            }
        };

        let items = decode_items(node_bytes, depth)?;
        match items.len() {
            17 => {
                if offset == path.len() {
                    let value = items[16].payload;
                    finish(nodes, next_node)?;
                    return Ok((!value.is_empty()).then(|| value.to_vec()));
                }
                let child = &items[usize::from(path[offset])];
                offset += 1;
                match child_ref(child, depth)? {
                    Some(next) => pending = next,
                    None => {
                        // Empty branch slot: the key does not exist.
                        finish(nodes, next_node)?;
                        return Ok(None);
                    }
                }
            }
            2 => {
                let (prefix, is_leaf) = hex_prefix(items[0].payload, depth)?;
                if is_leaf {
                    let matches = path[offset..] == prefix[..];
                    finish(nodes, next_node)?;
                    return Ok(matches.then(|| items[1].payload.to_vec()));
                }
                if !path[offset..].starts_with(&prefix) {
                    // Extension diverges from the key: absent.
                    finish(nodes, next_node)?;
                    return Ok(None);
                }
                offset += prefix.len();
                match child_ref(&items[1], depth)? {
                    Some(next) => pending = next,
                    None => {
                        return Err(TrieError::NodeDecode {
                            depth,
                            reason: "extension node with empty child".into(),
                        });
                    }
                }
            }
            arity => {
                return Err(TrieError::NodeDecode {
                    depth,
                    reason: format!("node list arity {arity}, expected 2 or 17"),
                });
            }
        }
    }
}

enum Pending {
    /// Next node must hash to this and is read from the proof list.
    Hash(B256),
    /// Next node is embedded in its parent (shorter than 32 bytes).
    Inline(Vec<u8>),
}

fn child_ref(item: &Item<'_>, depth: usize) -> Result<Option<Pending>, TrieError> {
    if item.is_list {
        return Ok(Some(Pending::Inline(item.raw.to_vec())));
    }
    match item.payload.len() {
        0 => Ok(None),
        32 => Ok(Some(Pending::Hash(B256::from_slice(item.payload)))),
        len => Err(TrieError::NodeDecode {
            depth,
            reason: format!("child reference of {len} bytes"),
        }),
    }
}

fn finish(nodes: &[Bytes], used: usize) -> Result<(), TrieError> {
    if used < nodes.len() {
        return Err(TrieError::TrailingNodes {
            count: nodes.len() - used,
        });
    }
    Ok(())
}

struct Item<'a> {
    is_list: bool,
    payload: &'a [u8],
    /// Full RLP encoding including the header; needed for inline children.
    raw: &'a [u8],
}

fn decode_items<'a>(node: &'a [u8], depth: usize) -> Result<Vec<Item<'a>>, TrieError> {
    let decode_err = |reason: &str| TrieError::NodeDecode {
        depth,
        reason: reason.to_owned(),
    };

    let mut buf = node;
    let header = Header::decode(&mut buf).map_err(|err| decode_err(&err.to_string()))?;
    if !header.list {
        return Err(decode_err("node is not an RLP list"));
    }
    if buf.len() != header.payload_length {
        return Err(decode_err("node has trailing bytes after list payload"));
    }

    let mut rest = buf;
    let mut items = Vec::new();
    while !rest.is_empty() {
        let raw_start = rest;
        let item_header = Header::decode(&mut rest).map_err(|err| decode_err(&err.to_string()))?;
        let header_len = raw_start.len() - rest.len();
        if item_header.payload_length > rest.len() {
            return Err(decode_err("item payload exceeds node bounds"));
        }
        items.push(Item {
            is_list: item_header.list,
            payload: &rest[..item_header.payload_length],
            raw: &raw_start[..header_len + item_header.payload_length],
        });
        rest = &rest[item_header.payload_length..];
    }
    Ok(items)
}

/// Decode a hex-prefix encoded path. Returns the nibbles and whether the
/// node is a leaf (terminator bit set).
fn hex_prefix(encoded: &[u8], depth: usize) -> Result<(Vec<u8>, bool), TrieError> {
    let first = *encoded.first().ok_or(TrieError::NodeDecode {
        depth,
        reason: "empty hex-prefix path".into(),
    })?;
    let flag = first >> 4;
    if flag > 3 {
        return Err(TrieError::NodeDecode {
            depth,
            reason: format!("hex-prefix flag nibble {flag}"),
        });
    }
    let is_leaf = flag & 2 != 0;
    let odd = flag & 1 != 0;

    let mut out = Vec::with_capacity(1 + (encoded.len() - 1) * 2);
    if odd {
        out.push(first & 0x0f);
    }
    for byte in &encoded[1..] {
        out.push(byte >> 4);
        out.push(byte & 0x0f);
    }
    Ok((out, is_leaf))
}

fn nibbles(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(byte >> 4);
        out.push(byte & 0x0f);
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use {
        super::*,
        alloy_primitives::U256,
        alloy_trie::{HashBuilder, Nibbles as TrieNibbles, proof::ProofRetainer},
        std::collections::BTreeMap,
    };

    /// Build a trie over `(hashed_key, rlp_value)` pairs and return the root
    /// plus the proof nodes for each requested key.
    pub(crate) fn build_trie(
        leaves: &BTreeMap<B256, Vec<u8>>,
        targets: &[B256],
    ) -> (B256, BTreeMap<B256, Vec<Bytes>>) {
        let retainer = ProofRetainer::new(
            targets
                .iter()
                .map(|key| TrieNibbles::unpack(key))
                .collect(),
        );
        let mut builder = HashBuilder::default().with_proof_retainer(retainer);
        for (key, value) in leaves {
            builder.add_leaf(TrieNibbles::unpack(key), value);
        }
        let root = builder.root();

        let retained = builder.take_proof_nodes().into_nodes_sorted();
        let proofs = targets
            .iter()
            .map(|key| {
                let path = TrieNibbles::unpack(key);
                let nodes = retained
                    .iter()
                    .filter(|(prefix, _)| path.starts_with(prefix))
                    .map(|(_, node)| Bytes::copy_from_slice(node))
                    .collect();
                (*key, nodes)
            })
            .collect();
        (root, proofs)
    }

    fn rlp_uint(value: u64) -> Vec<u8> {
        alloy_rlp::encode(U256::from(value))
    }

    #[test]
    fn single_leaf_inclusion() {
        let key = keccak256(b"slot-4");
        let leaves = BTreeMap::from([(key, rlp_uint(2))]);
        let (root, proofs) = build_trie(&leaves, &[key]);

        let value = verify_proof(root, key, &proofs[&key]).unwrap();
        assert_eq!(value, Some(rlp_uint(2)));
    }

    #[test]
    fn multi_leaf_inclusion() {
        let mut leaves = BTreeMap::new();
        for i in 0u64..12 {
            leaves.insert(keccak256(i.to_be_bytes()), rlp_uint(1000 + i));
        }
        let target = keccak256(7u64.to_be_bytes());
        let (root, proofs) = build_trie(&leaves, &[target]);

        let value = verify_proof(root, target, &proofs[&target]).unwrap();
        assert_eq!(value, Some(rlp_uint(1007)));
    }

    #[test]
    fn flipped_byte_in_any_node_fails() {
        let mut leaves = BTreeMap::new();
        for i in 0u64..12 {
            leaves.insert(keccak256(i.to_be_bytes()), rlp_uint(1000 + i));
        }
        let target = keccak256(7u64.to_be_bytes());
        let (root, proofs) = build_trie(&leaves, &[target]);
        let proof = &proofs[&target];

        for node_index in 0..proof.len() {
            for byte_index in 0..proof[node_index].len() {
                let mut tampered: Vec<Bytes> = proof.clone();
                let mut bytes = tampered[node_index].to_vec();
                bytes[byte_index] ^= 0x01;
                tampered[node_index] = bytes.into();

                let result = verify_proof(root, target, &tampered);
                assert!(
                    !matches!(result, Ok(Some(ref v)) if *v == rlp_uint(1007)),
                    "tampering node {node_index} byte {byte_index} went unnoticed",
                );
            }
        }
    }

    #[test]
    fn absent_key_is_none() {
        let mut leaves = BTreeMap::new();
        for i in 0u64..12 {
            leaves.insert(keccak256(i.to_be_bytes()), rlp_uint(1000 + i));
        }
        let absent = keccak256(b"never-inserted");
        let (root, proofs) = build_trie(&leaves, &[absent]);

        let value = verify_proof(root, absent, &proofs[&absent]).unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn trailing_nodes_are_rejected() {
        let key = keccak256(b"slot-4");
        let leaves = BTreeMap::from([(key, rlp_uint(2))]);
        let (root, proofs) = build_trie(&leaves, &[key]);

        let mut padded = proofs[&key].clone();
        padded.push(Bytes::from(alloy_rlp::encode(U256::from(1))));
        assert!(matches!(
            verify_proof(root, key, &padded),
            Err(TrieError::TrailingNodes { count: 1 })
        ));
    }

    #[test]
    fn wrong_root_is_hash_mismatch() {
        let key = keccak256(b"slot-4");
        let leaves = BTreeMap::from([(key, rlp_uint(2))]);
        let (_, proofs) = build_trie(&leaves, &[key]);

        assert_eq!(
            verify_proof(B256::repeat_byte(0xaa), key, &proofs[&key]),
            Err(TrieError::HashMismatch { depth: 0 })
        );
    }

    #[test]
    fn hex_prefix_decoding() {
        // Even-length extension: flag 0.
        assert_eq!(hex_prefix(&[0x00, 0xab], 0).unwrap(), (vec![0xa, 0xb], false));
        // Odd-length extension: flag 1 carries the first nibble.
        assert_eq!(hex_prefix(&[0x1a, 0xbc], 0).unwrap(), (vec![0xa, 0xb, 0xc], false));
        // Even-length leaf: flag 2.
        assert_eq!(hex_prefix(&[0x20, 0xab], 0).unwrap(), (vec![0xa, 0xb], true));
        // Odd-length leaf: flag 3.
        assert_eq!(hex_prefix(&[0x3a], 0).unwrap(), (vec![0xa], true));
        assert!(hex_prefix(&[0x40], 0).is_err());
    }
}
