//! Schema validation and canonical parsing of untrusted package JSON.
//!
//! Everything downstream assumes a well-formed package; this module is the
//! only place that deals with missing fields, wrong widths, or unknown
//! versions. Failure here aborts verification before anything else runs.

use {
    crate::{EvidencePackage, KNOWN_VERSIONS},
    serde_json::Value,
};

/// How to treat fields this build does not know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Unknown top-level fields are a schema violation.
    #[default]
    Strict,
    /// Unknown top-level fields become warnings on the result.
    Lenient,
}

/// A successfully parsed package plus any lenient-mode warnings.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPackage {
    pub package: EvidencePackage,
    pub warnings: Vec<String>,
}

/// Fatal input errors. These produce no report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("schema violation at {path}: expected {expected}")]
    Violation { path: String, expected: String },
    #[error("unsupported evidence package version {0:?}")]
    UnsupportedVersion(String),
}

impl SchemaError {
    fn violation(path: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::Violation {
            path: path.into(),
            expected: expected.into(),
        }
    }
}

/// Top-level fields defined by schema version 1. Anything else is unknown.
const TOP_LEVEL_FIELDS: &[&str] = &[
    "version",
    "chainId",
    "safeAddress",
    "safeTxHash",
    "transaction",
    "confirmations",
    "confirmationsRequired",
    "dataDecoded",
    "onchainPolicyProof",
    "consensusProof",
    "simulation",
    "simulationWitness",
    "exportContract",
    "packagedAt",
    "sources",
];

/// Parse and validate one evidence package document.
pub fn parse_package(json: &str, mode: ParseMode) -> Result<ParsedPackage, SchemaError> {
    let value: Value =
        serde_json::from_str(json).map_err(|err| SchemaError::InvalidJson(err.to_string()))?;

    let object = value
        .as_object()
        .ok_or_else(|| SchemaError::violation("$", "object"))?;

    // Version gates everything else: a future package must fail with
    // `unsupported-version`, not with whatever field it added.
    let version = object
        .get("version")
        .ok_or_else(|| SchemaError::violation("$.version", "string"))?
        .as_str()
        .ok_or_else(|| SchemaError::violation("$.version", "string"))?;
    if !KNOWN_VERSIONS.contains(&version) {
        return Err(SchemaError::UnsupportedVersion(version.to_owned()));
    }

    let mut warnings = Vec::new();
    for key in object.keys() {
        if !TOP_LEVEL_FIELDS.contains(&key.as_str()) {
            match mode {
                ParseMode::Strict => {
                    return Err(SchemaError::violation(
                        format!("$.{key}"),
                        "no unknown top-level fields",
                    ));
                }
                ParseMode::Lenient => {
                    warnings.push(format!("ignoring unknown top-level field {key:?}"));
                }
            }
        }
    }

    precheck(object)?;

    let package: EvidencePackage = serde_json::from_value(value)
        .map_err(|err| SchemaError::violation("$", err.to_string()))?;

    postcheck(&package)?;

    Ok(ParsedPackage { package, warnings })
}

/// Structural checks that produce precise paths before serde gets involved.
fn precheck(object: &serde_json::Map<String, Value>) -> Result<(), SchemaError> {
    require_u64(object, "chainId")?;
    require_hex(object, "safeAddress", 20)?;
    require_hex(object, "safeTxHash", 32)?;

    let tx = object
        .get("transaction")
        .and_then(Value::as_object)
        .ok_or_else(|| SchemaError::violation("$.transaction", "object"))?;
    require_hex(tx, "transaction.to", 20)?;
    require_quantity(tx, "transaction.value")?;
    require_quantity(tx, "transaction.nonce")?;
    require_quantity(tx, "transaction.safeTxGas")?;
    require_quantity(tx, "transaction.baseGas")?;
    require_quantity(tx, "transaction.gasPrice")?;
    require_hex(tx, "transaction.gasToken", 20)?;
    require_hex(tx, "transaction.refundReceiver", 20)?;

    let confirmations = object
        .get("confirmations")
        .and_then(Value::as_array)
        .ok_or_else(|| SchemaError::violation("$.confirmations", "array"))?;
    for (i, confirmation) in confirmations.iter().enumerate() {
        let entry = confirmation
            .as_object()
            .ok_or_else(|| SchemaError::violation(format!("$.confirmations[{i}]"), "object"))?;
        require_hex(entry, &format!("confirmations[{i}].owner"), 20)?;
    }

    let required = object
        .get("confirmationsRequired")
        .and_then(Value::as_u64)
        .ok_or_else(|| {
            SchemaError::violation("$.confirmationsRequired", "unsigned integer")
        })?;
    if required < 1 {
        return Err(SchemaError::violation("$.confirmationsRequired", ">= 1"));
    }

    let packaged_at = object
        .get("packagedAt")
        .and_then(Value::as_str)
        .ok_or_else(|| SchemaError::violation("$.packagedAt", "RFC 3339 timestamp"))?;
    if chrono::DateTime::parse_from_rfc3339(packaged_at).is_err() {
        return Err(SchemaError::violation("$.packagedAt", "RFC 3339 timestamp"));
    }

    if !object.contains_key("exportContract") {
        return Err(SchemaError::violation("$.exportContract", "object"));
    }

    Ok(())
}

/// Cross-field invariants that need the typed package.
fn postcheck(package: &EvidencePackage) -> Result<(), SchemaError> {
    if let Some(witness) = &package.simulation_witness {
        let simulation = package.simulation.as_ref().ok_or_else(|| {
            SchemaError::violation("$.simulation", "present when simulationWitness is")
        })?;
        if simulation.from.is_none() {
            return Err(SchemaError::violation(
                "$.simulation.from",
                "present when simulationWitness is",
            ));
        }
        if simulation.gas_limit.is_none() {
            return Err(SchemaError::violation(
                "$.simulation.gasLimit",
                "present when simulationWitness is",
            ));
        }
        if witness.chain_id != package.chain_id {
            return Err(SchemaError::violation(
                "$.simulationWitness.chainId",
                "equal to package chainId",
            ));
        }
        if witness.safe_address != package.safe_address {
            return Err(SchemaError::violation(
                "$.simulationWitness.safeAddress",
                "equal to package safeAddress",
            ));
        }
    }
    Ok(())
}

fn require_u64(
    object: &serde_json::Map<String, Value>,
    field: &str,
) -> Result<u64, SchemaError> {
    object
        .get(field.rsplit('.').next().unwrap_or(field))
        .and_then(Value::as_u64)
        .ok_or_else(|| SchemaError::violation(format!("$.{field}"), "unsigned integer"))
}

fn require_hex(
    object: &serde_json::Map<String, Value>,
    field: &str,
    width: usize,
) -> Result<(), SchemaError> {
    let key = field.rsplit('.').next().unwrap_or(field);
    // `confirmations[0].owner` style paths keep only the final segment as key.
    let key = key.rsplit("].").next().unwrap_or(key);
    let expected = format!("0x-prefixed hex of {width} bytes");
    let text = object
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| SchemaError::violation(format!("$.{field}"), expected.clone()))?;
    let stripped = text
        .strip_prefix("0x")
        .ok_or_else(|| SchemaError::violation(format!("$.{field}"), expected.clone()))?;
    if stripped.len() != width * 2 || !stripped.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(SchemaError::violation(format!("$.{field}"), expected));
    }
    Ok(())
}

/// A 256-bit quantity: decimal string, 0x hex string, or small integer.
fn require_quantity(
    object: &serde_json::Map<String, Value>,
    field: &str,
) -> Result<(), SchemaError> {
    let key = field.rsplit('.').next().unwrap_or(field);
    let expected = "decimal-string 256-bit quantity";
    match object.get(key) {
        Some(Value::Number(n)) if n.is_u64() => Ok(()),
        Some(Value::String(s)) => s
            .parse::<alloy_primitives::U256>()
            .map(|_| ())
            .map_err(|_| SchemaError::violation(format!("$.{field}"), expected)),
        _ => Err(SchemaError::violation(format!("$.{field}"), expected)),
    }
}
