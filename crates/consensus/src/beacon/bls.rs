//! BLS12-381 aggregate verification over sync-committee signatures.
//!
//! Thin wrapper over `blst`; no field arithmetic lives here.

use {
    super::types::{BlsPublicKeyBytes, BlsSignatureBytes},
    alloy_primitives::B256,
    blst::{BLST_ERROR, min_pk},
};

/// Ethereum's BLS signature domain separation tag.
pub const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSZ_NUL_";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlsError {
    #[error("public key {index} does not deserialize to a valid G1 point")]
    InvalidPublicKey { index: usize },
    #[error("signature does not deserialize to a valid G2 point")]
    InvalidSignature,
    #[error("no participating public keys")]
    NoParticipants,
}

/// Verify an aggregate signature by the given participants over
/// `signing_root`. Returns `Ok(false)` for a well-formed but wrong
/// signature.
pub fn fast_aggregate_verify(
    participants: &[&BlsPublicKeyBytes],
    signing_root: B256,
    signature: &BlsSignatureBytes,
) -> Result<bool, BlsError> {
    if participants.is_empty() {
        return Err(BlsError::NoParticipants);
    }
    let keys: Vec<min_pk::PublicKey> = participants
        .iter()
        .enumerate()
        .map(|(index, key)| {
            min_pk::PublicKey::key_validate(&key.0)
                .map_err(|_| BlsError::InvalidPublicKey { index })
        })
        .collect::<Result<_, _>>()?;
    let key_refs: Vec<&min_pk::PublicKey> = keys.iter().collect();

    let signature =
        min_pk::Signature::from_bytes(&signature.0).map_err(|_| BlsError::InvalidSignature)?;

    Ok(signature.fast_aggregate_verify(true, signing_root.as_slice(), DST, &key_refs)
        == BLST_ERROR::BLST_SUCCESS)
}

#[cfg(test)]
pub(crate) mod tests {
    use {super::*, blst::min_pk::{AggregateSignature, SecretKey}};

    /// Deterministic test keypairs.
    pub(crate) fn secret_key(seed: u64) -> SecretKey {
        let mut ikm = [0u8; 32];
        ikm[..8].copy_from_slice(&seed.to_be_bytes());
        ikm[31] = 1;
        SecretKey::key_gen(&ikm, &[]).unwrap()
    }

    pub(crate) fn public_key_bytes(secret: &SecretKey) -> BlsPublicKeyBytes {
        BlsPublicKeyBytes(secret.sk_to_pk().to_bytes())
    }

    /// Aggregate-sign `message` with every key.
    pub(crate) fn aggregate_sign(keys: &[SecretKey], message: B256) -> BlsSignatureBytes {
        let signatures: Vec<_> = keys
            .iter()
            .map(|key| key.sign(message.as_slice(), DST, &[]))
            .collect();
        let signature_refs: Vec<_> = signatures.iter().collect();
        let aggregate = AggregateSignature::aggregate(&signature_refs, false).unwrap();
        BlsSignatureBytes(aggregate.to_signature().to_bytes())
    }

    #[test]
    fn aggregate_round_trip() {
        let keys: Vec<SecretKey> = (0..8).map(secret_key).collect();
        let publics: Vec<BlsPublicKeyBytes> = keys.iter().map(public_key_bytes).collect();
        let public_refs: Vec<&BlsPublicKeyBytes> = publics.iter().collect();
        let message = B256::repeat_byte(0x42);

        let signature = aggregate_sign(&keys, message);
        assert_eq!(
            fast_aggregate_verify(&public_refs, message, &signature),
            Ok(true)
        );
        assert_eq!(
            fast_aggregate_verify(&public_refs, B256::repeat_byte(0x43), &signature),
            Ok(false)
        );
        // Dropping a signer invalidates the aggregate.
        assert_eq!(
            fast_aggregate_verify(&public_refs[1..], message, &signature),
            Ok(false)
        );
    }

    #[test]
    fn malformed_inputs_are_errors() {
        let keys: Vec<SecretKey> = (0..2).map(secret_key).collect();
        let publics: Vec<BlsPublicKeyBytes> = keys.iter().map(public_key_bytes).collect();
        let public_refs: Vec<&BlsPublicKeyBytes> = publics.iter().collect();
        let message = B256::repeat_byte(0x42);

        assert_eq!(
            fast_aggregate_verify(&[], message, &aggregate_sign(&keys, message)),
            Err(BlsError::NoParticipants)
        );

        let garbage_key = BlsPublicKeyBytes([0xff; 48]);
        assert!(matches!(
            fast_aggregate_verify(&[&garbage_key], message, &aggregate_sign(&keys, message)),
            Err(BlsError::InvalidPublicKey { index: 0 })
        ));

        assert_eq!(
            fast_aggregate_verify(&public_refs, message, &BlsSignatureBytes([0xff; 96])),
            Err(BlsError::InvalidSignature)
        );
    }
}
