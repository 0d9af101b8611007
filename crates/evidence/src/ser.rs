//! Serde adapters for the evidence wire format.
//!
//! The format keeps every quantity that can exceed 2^53 as a decimal string
//! so JavaScript consumers never round it. Hex data is lower-case and
//! 0x-prefixed, which the `alloy-primitives` serde impls already produce.

use {
    alloy_primitives::U256,
    serde::{Deserialize, Deserializer, Serialize, Serializer, de},
    serde_with::{DeserializeAs, SerializeAs},
};

/// A [`U256`] carried as a decimal string (`"1000000000000000000"`).
///
/// Deserialization also tolerates plain JSON integers and `0x` hex strings,
/// since upstream services are not consistent about small quantities.
pub struct DecimalU256;

impl SerializeAs<U256> for DecimalU256 {
    fn serialize_as<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_string().serialize(serializer)
    }
}

impl<'de> DeserializeAs<'de, U256> for DecimalU256 {
    fn deserialize_as<D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(U256::from(n)),
            Raw::Text(s) => s
                .parse::<U256>()
                .map_err(|err| de::Error::custom(format!("invalid 256-bit quantity {s:?}: {err}"))),
        }
    }
}
