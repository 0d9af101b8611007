//! Operator settings: endpoints for the generator side.
//!
//! The verifier never reads these; they only steer where `analyze`
//! fetches evidence from.

use {
    anyhow::{Context, Result},
    serde::{Deserialize, Serialize},
    std::path::Path,
    url::Url,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Settings {
    /// Execution RPC endpoint used to fetch storage proofs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<Url>,
    /// Beacon REST endpoint used to fetch light-client data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beacon_api_url: Option<Url>,
    /// Override for the Safe Transaction Service base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_service_url: Option<Url>,
    /// Parse packages leniently by default.
    #[serde(default)]
    pub lenient: bool,
}

const TEMPLATE: &str = "\
# SafeLens settings.
#
# Everything here configures evidence *generation* only; verification is
# purely local and never reads this file.

# Execution RPC endpoint for storage proofs (eth_getProof).
# rpc-url = \"https://ethereum-rpc.example.org\"

# Beacon REST endpoint for light-client data.
# beacon-api-url = \"https://beacon.example.org\"

# Override the Safe Transaction Service base URL.
# tx-service-url = \"https://safe-transaction-mainnet.safe.global\"

# Accept unknown package fields with warnings instead of rejecting them.
lenient = false
";

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("parsing settings from {}", path.display()))
    }

    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("{} already exists", path.display());
        }
        std::fs::write(path, TEMPLATE)
            .with_context(|| format!("writing settings template to {}", path.display()))
    }

    pub fn show(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_else(|_| "# <unrepresentable>".into())
    }
}
