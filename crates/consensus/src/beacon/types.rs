//! Beacon light-client structures in their REST-API JSON shape.
//!
//! Numbers arrive as decimal strings and roots as 0x hex; the structures
//! may be wrapped in the API's `{"version": ..., "data": ...}` envelope,
//! which [`from_json`] strips transparently.

use {
    alloy_primitives::{B256, Bloom, Bytes, U256},
    serde::{Deserialize, Deserializer, Serialize, Serializer, de},
    serde_with::{DisplayFromStr, serde_as},
};

pub const SYNC_COMMITTEE_SIZE: usize = 512;
pub const SLOTS_PER_EPOCH: u64 = 32;
pub const EPOCHS_PER_SYNC_COMMITTEE_PERIOD: u64 = 256;
pub const SLOTS_PER_SYNC_COMMITTEE_PERIOD: u64 =
    SLOTS_PER_EPOCH * EPOCHS_PER_SYNC_COMMITTEE_PERIOD;
pub const DOMAIN_SYNC_COMMITTEE: [u8; 4] = [0x07, 0x00, 0x00, 0x00];

/// Sync-committee period of a slot.
pub fn sync_committee_period(slot: u64) -> u64 {
    slot / SLOTS_PER_SYNC_COMMITTEE_PERIOD
}

pub fn epoch_at_slot(slot: u64) -> u64 {
    slot / SLOTS_PER_EPOCH
}

/// A compressed BLS12-381 G1 public key (48 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlsPublicKeyBytes(pub [u8; 48]);

/// A compressed BLS12-381 G2 signature (96 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlsSignatureBytes(pub [u8; 96]);

macro_rules! fixed_hex {
    ($name:ident, $len:expr) => {
        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let text = String::deserialize(deserializer)?;
                let stripped = text.strip_prefix("0x").unwrap_or(&text);
                let bytes = hex::decode(stripped).map_err(de::Error::custom)?;
                let array: [u8; $len] = bytes.try_into().map_err(|_| {
                    de::Error::custom(concat!(
                        stringify!($name),
                        " must be ",
                        stringify!($len),
                        " bytes"
                    ))
                })?;
                Ok(Self(array))
            }
        }
    };
}

fixed_hex!(BlsPublicKeyBytes, 48);
fixed_hex!(BlsSignatureBytes, 96);

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconBlockHeader {
    #[serde_as(as = "DisplayFromStr")]
    pub slot: u64,
    #[serde_as(as = "DisplayFromStr")]
    pub proposer_index: u64,
    pub parent_root: B256,
    pub state_root: B256,
    pub body_root: B256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCommittee {
    pub pubkeys: Vec<BlsPublicKeyBytes>,
    pub aggregate_pubkey: BlsPublicKeyBytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAggregate {
    /// SSZ bitvector, one bit per committee member, hex encoded.
    pub sync_committee_bits: Bytes,
    pub sync_committee_signature: BlsSignatureBytes,
}

impl SyncAggregate {
    /// Number of set participation bits.
    pub fn participation(&self) -> usize {
        self.sync_committee_bits
            .iter()
            .map(|byte| byte.count_ones() as usize)
            .sum()
    }

    /// Whether committee member `index` participated.
    pub fn participated(&self, index: usize) -> bool {
        self.sync_committee_bits
            .get(index / 8)
            .is_some_and(|byte| byte >> (index % 8) & 1 == 1)
    }
}

/// Post-Capella light-client header: beacon header plus the execution
/// payload header proven into its body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightClientHeader {
    pub beacon: BeaconBlockHeader,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionPayloadHeader>,
    #[serde(default)]
    pub execution_branch: Vec<B256>,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPayloadHeader {
    pub parent_hash: B256,
    /// 20-byte fee recipient, kept as raw bytes for chunking.
    pub fee_recipient: alloy_primitives::Address,
    pub state_root: B256,
    pub receipts_root: B256,
    pub logs_bloom: Bloom,
    pub prev_randao: B256,
    #[serde_as(as = "DisplayFromStr")]
    pub block_number: u64,
    #[serde_as(as = "DisplayFromStr")]
    pub gas_limit: u64,
    #[serde_as(as = "DisplayFromStr")]
    pub gas_used: u64,
    #[serde_as(as = "DisplayFromStr")]
    pub timestamp: u64,
    /// Up to 32 bytes.
    pub extra_data: Bytes,
    #[serde_as(as = "DisplayFromStr")]
    pub base_fee_per_gas: U256,
    pub block_hash: B256,
    pub transactions_root: B256,
    pub withdrawals_root: B256,
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default)]
    pub blob_gas_used: u64,
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default)]
    pub excess_blob_gas: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightClientBootstrap {
    pub header: LightClientHeader,
    pub current_sync_committee: SyncCommittee,
    pub current_sync_committee_branch: Vec<B256>,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightClientUpdate {
    pub attested_header: LightClientHeader,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_sync_committee: Option<SyncCommittee>,
    #[serde(default)]
    pub next_sync_committee_branch: Vec<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalized_header: Option<LightClientHeader>,
    #[serde(default)]
    pub finality_branch: Vec<B256>,
    pub sync_aggregate: SyncAggregate,
    #[serde_as(as = "DisplayFromStr")]
    pub signature_slot: u64,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightClientFinalityUpdate {
    pub attested_header: LightClientHeader,
    pub finalized_header: LightClientHeader,
    pub finality_branch: Vec<B256>,
    pub sync_aggregate: SyncAggregate,
    #[serde_as(as = "DisplayFromStr")]
    pub signature_slot: u64,
}

/// Parse a light-client structure, stripping the REST envelope if present.
pub fn from_json<T: serde::de::DeserializeOwned>(
    value: &serde_json::Value,
) -> Result<T, serde_json::Error> {
    let inner = value.get("data").unwrap_or(value);
    serde_json::from_value(inner.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_parses_beacon_api_json() {
        let json = serde_json::json!({
            "slot": "9600000",
            "proposer_index": "123",
            "parent_root": "0x0101010101010101010101010101010101010101010101010101010101010101",
            "state_root": "0x0202020202020202020202020202020202020202020202020202020202020202",
            "body_root": "0x0303030303030303030303030303030303030303030303030303030303030303",
        });
        let header: BeaconBlockHeader = serde_json::from_value(json).unwrap();
        assert_eq!(header.slot, 9_600_000);
        assert_eq!(sync_committee_period(header.slot), 9_600_000 / 8192);
    }

    #[test]
    fn data_envelope_is_stripped() {
        let wrapped = serde_json::json!({
            "version": "deneb",
            "data": {
                "slot": "1",
                "proposer_index": "2",
                "parent_root": "0x0101010101010101010101010101010101010101010101010101010101010101",
                "state_root": "0x0202020202020202020202020202020202020202020202020202020202020202",
                "body_root": "0x0303030303030303030303030303030303030303030303030303030303030303",
            },
        });
        let header: BeaconBlockHeader = from_json(&wrapped).unwrap();
        assert_eq!(header.slot, 1);
    }

    #[test]
    fn pubkey_hex_round_trip_and_width_check() {
        let key = BlsPublicKeyBytes([0xab; 48]);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(serde_json::from_str::<BlsPublicKeyBytes>(&json).unwrap(), key);
        assert!(serde_json::from_str::<BlsPublicKeyBytes>("\"0xabcd\"").is_err());
    }

    #[test]
    fn participation_counts_bits() {
        let aggregate = SyncAggregate {
            sync_committee_bits: Bytes::from(vec![0b1010_0001, 0xff]),
            sync_committee_signature: BlsSignatureBytes([0; 96]),
        };
        assert_eq!(aggregate.participation(), 11);
        assert!(aggregate.participated(0));
        assert!(!aggregate.participated(1));
        assert!(aggregate.participated(5));
        assert!(aggregate.participated(8));
    }
}
