//! Calldata cross-checking against the API-provided decoding.
//!
//! The decoding is never authoritative: the verifier recomputes the 4-byte
//! selector from the reported method signature, re-decodes the argument
//! tail locally, and compares value by value. The outcome only moves the
//! `decoded-calldata` trust label; it can neither validate nor invalidate
//! the transaction itself.

use {
    alloy_dyn_abi::{DynSolType, DynSolValue},
    alloy_primitives::{hex, keccak256},
    evidence::{DataDecoded, SafeTransaction},
    serde::Serialize,
};

/// Aggregate outcome over every call step the evidence exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum CalldataOutcome {
    /// Every step's selector and every reported argument matched.
    SelfVerified,
    /// All checked steps matched but some steps lacked decoded inputs.
    Partial,
    /// A selector or argument conflicted with the raw bytes.
    Mismatch { step: usize, detail: String },
    /// No decoded data to check against.
    ApiOnly,
}

/// Cross-check the transaction's decoding, including decoded multisend
/// children.
pub fn cross_check(tx: &SafeTransaction, decoded: Option<&DataDecoded>) -> CalldataOutcome {
    let Some(decoded) = decoded else {
        return CalldataOutcome::ApiOnly;
    };
    if tx.data.is_empty() {
        // Nothing to compare a decoding against; a decoding for an empty
        // payload is itself suspect.
        return if decoded.method.is_empty() {
            CalldataOutcome::ApiOnly
        } else {
            CalldataOutcome::Mismatch {
                step: 0,
                detail: "decoded method reported for empty calldata".into(),
            }
        };
    }

    let mut steps: Vec<(&[u8], Option<&DataDecoded>)> = vec![(tx.data.as_ref(), Some(decoded))];
    if decoded.method == "multiSend" {
        for parameter in &decoded.parameters {
            let Some(children) = &parameter.value_decoded else {
                continue;
            };
            for child in children {
                let empty: &[u8] = &[];
                let data = child.data.as_ref().map(|b| b.as_ref()).unwrap_or(empty);
                if !data.is_empty() {
                    steps.push((data, child.data_decoded.as_ref()));
                }
            }
        }
    }

    let mut partial = false;
    for (index, (data, step_decoded)) in steps.iter().enumerate() {
        match step_decoded {
            None => partial = true,
            Some(decoded) => {
                if let Err(detail) = check_step(data, decoded) {
                    return CalldataOutcome::Mismatch {
                        step: index,
                        detail,
                    };
                }
            }
        }
    }

    if partial {
        CalldataOutcome::Partial
    } else {
        CalldataOutcome::SelfVerified
    }
}

/// Check one call step: selector first, then each decoded argument.
fn check_step(data: &[u8], decoded: &DataDecoded) -> Result<(), String> {
    if data.len() < 4 {
        return Err("calldata shorter than a selector".into());
    }

    let types: Vec<&str> = decoded
        .parameters
        .iter()
        .map(|p| p.param_type.as_str())
        .collect();
    let signature = format!("{}({})", decoded.method, types.join(","));
    let selector = &keccak256(signature.as_bytes())[..4];
    if selector != &data[..4] {
        return Err(format!(
            "selector mismatch: {} implies 0x{}, calldata starts 0x{}",
            signature,
            hex::encode(selector),
            hex::encode(&data[..4]),
        ));
    }

    let tuple = DynSolType::Tuple(
        types
            .iter()
            .map(|t| DynSolType::parse(t).map_err(|err| format!("unparseable type {t:?}: {err}")))
            .collect::<Result<_, _>>()?,
    );
    let values = match tuple.abi_decode_params(&data[4..]) {
        Ok(DynSolValue::Tuple(values)) => values,
        Ok(single) => vec![single],
        Err(err) => return Err(format!("argument tail does not decode: {err}")),
    };
    if values.len() != decoded.parameters.len() {
        return Err(format!(
            "decoded {} arguments, API reported {}",
            values.len(),
            decoded.parameters.len(),
        ));
    }

    for (value, parameter) in values.iter().zip(&decoded.parameters) {
        compare_value(value, &parameter.value).map_err(|reason| {
            format!("argument {:?}: {reason}", parameter.name)
        })?;
    }
    Ok(())
}

/// Compare one locally decoded value against the API-reported JSON value
/// with per-type semantics.
fn compare_value(local: &DynSolValue, reported: &serde_json::Value) -> Result<(), String> {
    use serde_json::Value;

    let text = || reported.as_str().map(str::to_owned).or_else(|| {
        // Integers occasionally arrive as JSON numbers.
        reported.as_u64().map(|n| n.to_string())
    });

    match local {
        DynSolValue::Address(address) => match text() {
            Some(reported) if reported.eq_ignore_ascii_case(&address.to_string()) => Ok(()),
            other => Err(format!("address {address} reported as {other:?}")),
        },
        DynSolValue::Uint(value, _) => match text() {
            Some(reported) if reported.trim() == value.to_string() => Ok(()),
            other => Err(format!("uint {value} reported as {other:?}")),
        },
        DynSolValue::Int(value, _) => match text() {
            Some(reported) if reported.trim() == value.to_string() => Ok(()),
            other => Err(format!("int {value} reported as {other:?}")),
        },
        DynSolValue::Bool(value) => match reported {
            Value::Bool(reported) if reported == value => Ok(()),
            Value::String(reported) if reported.eq_ignore_ascii_case(&value.to_string()) => Ok(()),
            other => Err(format!("bool {value} reported as {other:?}")),
        },
        DynSolValue::Bytes(bytes) => compare_hex(bytes, reported),
        DynSolValue::FixedBytes(word, size) => compare_hex(&word[..*size], reported),
        DynSolValue::String(value) => match reported.as_str() {
            Some(reported) if reported == value => Ok(()),
            other => Err(format!("string {value:?} reported as {other:?}")),
        },
        DynSolValue::Array(values) | DynSolValue::FixedArray(values) | DynSolValue::Tuple(values) => {
            let Some(reported) = reported.as_array() else {
                return Err(format!("expected array, reported {reported:?}"));
            };
            if reported.len() != values.len() {
                return Err(format!(
                    "array length {} reported as {}",
                    values.len(),
                    reported.len(),
                ));
            }
            for (index, (value, reported)) in values.iter().zip(reported).enumerate() {
                compare_value(value, reported).map_err(|reason| format!("[{index}] {reason}"))?;
            }
            Ok(())
        }
        other => Err(format!("unsupported value shape {other:?}")),
    }
}

fn compare_hex(local: &[u8], reported: &serde_json::Value) -> Result<(), String> {
    let Some(reported) = reported.as_str() else {
        return Err(format!("expected hex string, reported {reported:?}"));
    };
    let normalized = reported.strip_prefix("0x").unwrap_or(reported);
    if normalized.eq_ignore_ascii_case(&hex::encode(local)) {
        Ok(())
    } else {
        Err(format!(
            "bytes 0x{} reported as {reported:?}",
            hex::encode(local),
        ))
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        alloy_primitives::{Address, Bytes, U256},
        evidence::{DecodedParameter, Operation},
    };

    fn transfer_calldata(to: Address, amount: U256) -> Vec<u8> {
        let selector = &keccak256(b"transfer(address,uint256)")[..4];
        let tail = DynSolValue::Tuple(vec![
            DynSolValue::Address(to),
            DynSolValue::Uint(amount, 256),
        ])
        .abi_encode_params();
        [selector, tail.as_slice()].concat()
    }

    fn transaction(data: Vec<u8>) -> SafeTransaction {
        SafeTransaction {
            to: Address::repeat_byte(0x11),
            value: U256::ZERO,
            data: Bytes::from(data),
            operation: Operation::Call,
            safe_tx_gas: U256::ZERO,
            base_gas: U256::ZERO,
            gas_price: U256::ZERO,
            gas_token: Address::ZERO,
            refund_receiver: Address::ZERO,
            nonce: U256::ZERO,
        }
    }

    fn transfer_decoded(to: &str, amount: &str) -> DataDecoded {
        DataDecoded {
            method: "transfer".into(),
            parameters: vec![
                DecodedParameter {
                    name: "to".into(),
                    param_type: "address".into(),
                    value: to.into(),
                    value_decoded: None,
                },
                DecodedParameter {
                    name: "value".into(),
                    param_type: "uint256".into(),
                    value: amount.into(),
                    value_decoded: None,
                },
            ],
        }
    }

    #[test]
    fn matching_decoding_is_self_verified() {
        let to = Address::repeat_byte(0xaa);
        let tx = transaction(transfer_calldata(to, U256::from(1_000u64)));
        // Mixed-case address must still match.
        let decoded = transfer_decoded(&to.to_string().to_uppercase().replace("0X", "0x"), "1000");
        assert_eq!(cross_check(&tx, Some(&decoded)), CalldataOutcome::SelfVerified);
    }

    #[test]
    fn wrong_amount_is_a_mismatch() {
        let to = Address::repeat_byte(0xaa);
        let tx = transaction(transfer_calldata(to, U256::from(1_000u64)));
        let decoded = transfer_decoded(&to.to_string(), "999");
        assert!(matches!(
            cross_check(&tx, Some(&decoded)),
            CalldataOutcome::Mismatch { step: 0, .. }
        ));
    }

    #[test]
    fn wrong_method_name_is_a_selector_mismatch() {
        let to = Address::repeat_byte(0xaa);
        let tx = transaction(transfer_calldata(to, U256::from(1_000u64)));
        let mut decoded = transfer_decoded(&to.to_string(), "1000");
        decoded.method = "transferFrom".into();
        assert!(matches!(
            cross_check(&tx, Some(&decoded)),
            CalldataOutcome::Mismatch { step: 0, .. }
        ));
    }

    #[test]
    fn missing_decoding_is_api_only() {
        let tx = transaction(transfer_calldata(Address::ZERO, U256::ZERO));
        assert_eq!(cross_check(&tx, None), CalldataOutcome::ApiOnly);
    }

    #[test]
    fn multisend_children_are_checked_individually() {
        let to = Address::repeat_byte(0xaa);
        let child_data = transfer_calldata(to, U256::from(5u64));

        // The outer multiSend payload: bytes argument packing is opaque
        // here; only its selector and bytes argument are checked.
        let packed = DynSolValue::Bytes(child_data.clone()).abi_encode_params();
        let outer_data = [&keccak256(b"multiSend(bytes)")[..4], packed.as_slice()].concat();

        let decoded = DataDecoded {
            method: "multiSend".into(),
            parameters: vec![DecodedParameter {
                name: "transactions".into(),
                param_type: "bytes".into(),
                value: format!("0x{}", hex::encode(&packed_bytes(&packed))).into(),
                value_decoded: Some(vec![evidence::InnerCall {
                    operation: Operation::Call,
                    to,
                    value: U256::ZERO,
                    data: Some(Bytes::from(child_data)),
                    data_decoded: Some(transfer_decoded(&to.to_string(), "4")),
                }]),
            }],
        };
        let tx = transaction(outer_data);
        // The child decoding claims 4 but the bytes say 5.
        assert!(matches!(
            cross_check(&tx, Some(&decoded)),
            CalldataOutcome::Mismatch { step: 1, .. }
        ));
    }

    /// Extract the dynamic bytes payload from an ABI-encoded single-bytes
    /// tuple for the reported value string.
    fn packed_bytes(encoded: &[u8]) -> Vec<u8> {
        let length = U256::from_be_slice(&encoded[32..64]);
        let length = usize::try_from(length).unwrap();
        encoded[64..64 + length].to_vec()
    }

    #[test]
    fn child_without_decoding_is_partial() {
        let to = Address::repeat_byte(0xaa);
        let child_data = transfer_calldata(to, U256::from(5u64));
        let packed = DynSolValue::Bytes(child_data.clone()).abi_encode_params();
        let outer_data = [&keccak256(b"multiSend(bytes)")[..4], packed.as_slice()].concat();

        let decoded = DataDecoded {
            method: "multiSend".into(),
            parameters: vec![DecodedParameter {
                name: "transactions".into(),
                param_type: "bytes".into(),
                value: format!("0x{}", hex::encode(packed_bytes(&packed))).into(),
                value_decoded: Some(vec![evidence::InnerCall {
                    operation: Operation::Call,
                    to,
                    value: U256::ZERO,
                    data: Some(Bytes::from(child_data)),
                    data_decoded: None,
                }]),
            }],
        };
        let tx = transaction(outer_data);
        assert_eq!(cross_check(&tx, Some(&decoded)), CalldataOutcome::Partial);
    }
}
