//! Safe Transaction Service client and URL handling — the thin generator
//! side of `analyze`.
//!
//! Everything fetched here is untrusted input to the verifier; this module
//! records honestly, via the export contract, which artifacts it could not
//! attach.

use {
    crate::settings::Settings,
    anyhow::{Context, Result, anyhow, bail},
    alloy_primitives::{Address, B256, Bytes, U256},
    chrono::Utc,
    evidence::{
        Confirmation, DataDecoded, EvidencePackage, ExportContract, ExportContractReason,
        Operation, SafeTransaction, SignatureScheme, ser::DecimalU256,
    },
    serde::Deserialize,
    serde_with::serde_as,
    std::collections::BTreeMap,
    url::Url,
};

/// A parsed analyze target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub chain: Chain,
    pub safe: Address,
    pub safe_tx_hash: B256,
}

/// Chains with a public Safe Transaction Service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chain {
    Mainnet,
    Sepolia,
    Gnosis,
    Optimism,
    Base,
    Arbitrum,
    Linea,
}

impl Chain {
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "eth" => Some(Self::Mainnet),
            "sep" => Some(Self::Sepolia),
            "gno" => Some(Self::Gnosis),
            "oeth" => Some(Self::Optimism),
            "base" => Some(Self::Base),
            "arb1" => Some(Self::Arbitrum),
            "linea" => Some(Self::Linea),
            _ => None,
        }
    }

    pub fn id(self) -> u64 {
        match self {
            Self::Mainnet => 1,
            Self::Sepolia => 11_155_111,
            Self::Gnosis => 100,
            Self::Optimism => 10,
            Self::Base => 8453,
            Self::Arbitrum => 42_161,
            Self::Linea => 59_144,
        }
    }

    pub fn tx_service(self) -> &'static str {
        match self {
            Self::Mainnet => "https://safe-transaction-mainnet.safe.global",
            Self::Sepolia => "https://safe-transaction-sepolia.safe.global",
            Self::Gnosis => "https://safe-transaction-gnosis-chain.safe.global",
            Self::Optimism => "https://safe-transaction-optimism.safe.global",
            Self::Base => "https://safe-transaction-base.safe.global",
            Self::Arbitrum => "https://safe-transaction-arbitrum.safe.global",
            Self::Linea => "https://safe-transaction-linea.safe.global",
        }
    }
}

/// Parse either a Safe{Wallet} queue URL
/// (`…/transactions/tx?safe=eth:0x…&id=multisig_0x…_0xhash`) or the
/// compact `chain:safe:safeTxHash` form.
pub fn parse_target(input: &str) -> Result<Target> {
    if let Ok(url) = Url::parse(input) {
        if url.has_host() {
            return parse_app_url(&url);
        }
    }
    parse_compact(input)
}

fn parse_app_url(url: &Url) -> Result<Target> {
    let query: BTreeMap<_, _> = url.query_pairs().collect();
    let safe_param = query
        .get("safe")
        .ok_or_else(|| anyhow!("URL has no safe= query parameter"))?;
    let (prefix, address) = safe_param
        .split_once(':')
        .ok_or_else(|| anyhow!("safe= parameter is not <chain>:<address>"))?;
    let chain = Chain::from_prefix(prefix)
        .ok_or_else(|| anyhow!("unsupported chain prefix {prefix:?}"))?;
    let safe: Address = address.parse().context("safe address in URL")?;

    let id = query
        .get("id")
        .ok_or_else(|| anyhow!("URL has no id= query parameter"))?;
    let hash = id
        .rsplit('_')
        .next()
        .filter(|part| part.starts_with("0x"))
        .ok_or_else(|| anyhow!("id= parameter does not end in a transaction hash"))?;
    let safe_tx_hash: B256 = hash.parse().context("safeTxHash in URL")?;

    Ok(Target {
        chain,
        safe,
        safe_tx_hash,
    })
}

fn parse_compact(input: &str) -> Result<Target> {
    let mut parts = input.splitn(3, ':');
    let (Some(prefix), Some(safe), Some(hash)) = (parts.next(), parts.next(), parts.next())
    else {
        bail!("expected <chain>:<safe>:<safeTxHash> or a Safe{{Wallet}} URL");
    };
    let chain = Chain::from_prefix(prefix)
        .ok_or_else(|| anyhow!("unsupported chain prefix {prefix:?}"))?;
    Ok(Target {
        chain,
        safe: safe.parse().context("safe address")?,
        safe_tx_hash: hash.parse().context("safeTxHash")?,
    })
}

/// One multisig transaction as the Safe Transaction Service returns it.
/// Quantity fields arrive as a mix of integers and strings; the decimal
/// adapter tolerates both.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceTransaction {
    to: Address,
    #[serde_as(as = "DecimalU256")]
    value: U256,
    #[serde(default)]
    data: Option<Bytes>,
    operation: u8,
    #[serde_as(as = "DecimalU256")]
    safe_tx_gas: U256,
    #[serde_as(as = "DecimalU256")]
    base_gas: U256,
    #[serde_as(as = "DecimalU256")]
    gas_price: U256,
    gas_token: Address,
    refund_receiver: Address,
    #[serde_as(as = "DecimalU256")]
    nonce: U256,
    safe_tx_hash: B256,
    confirmations_required: u32,
    #[serde(default)]
    confirmations: Vec<ServiceConfirmation>,
    #[serde(default)]
    data_decoded: Option<DataDecoded>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceConfirmation {
    owner: Address,
    #[serde(default)]
    signature: Option<Bytes>,
    signature_type: String,
}

impl ServiceConfirmation {
    fn scheme(&self) -> SignatureScheme {
        match self.signature_type.as_str() {
            "ETH_SIGN" => SignatureScheme::EthSign,
            "APPROVED_HASH" => SignatureScheme::ApprovedHash,
            "CONTRACT_SIGNATURE" => SignatureScheme::Contract,
            _ => SignatureScheme::Ecdsa,
        }
    }
}

/// Fetch one pending transaction and assemble an evidence package.
///
/// This build attaches no proofs; the export contract says so explicitly
/// so the verifier can render honest "absent data" details.
pub async fn assemble_package(
    client: &reqwest::Client,
    settings: &Settings,
    target: &Target,
) -> Result<EvidencePackage> {
    let base = settings
        .tx_service_url
        .as_ref()
        .map(|url| url.as_str().trim_end_matches('/').to_owned())
        .unwrap_or_else(|| target.chain.tx_service().to_owned());
    let url = format!(
        "{base}/api/v1/multisig-transactions/{}/",
        target.safe_tx_hash,
    );

    tracing::debug!(%url, "fetching transaction from the Safe service");
    let response = client
        .get(&url)
        .send()
        .await
        .context("requesting the Safe Transaction Service")?;
    if !response.status().is_success() {
        bail!(
            "Safe Transaction Service returned {} for {url}",
            response.status(),
        );
    }
    let service_tx: ServiceTransaction = response
        .json()
        .await
        .context("decoding the Safe Transaction Service response")?;

    let mut reasons = vec![
        ExportContractReason::MissingOnchainPolicyProof,
        ExportContractReason::MissingSimulation,
        ExportContractReason::MissingConsensusProof,
    ];
    if settings.rpc_url.is_none() {
        reasons.insert(0, ExportContractReason::MissingRpcUrl);
    }

    let confirmations = service_tx
        .confirmations
        .iter()
        .map(|confirmation| Confirmation {
            owner: confirmation.owner,
            signature: confirmation.signature.clone().unwrap_or_default(),
            scheme: confirmation.scheme(),
        })
        .collect();

    Ok(EvidencePackage {
        version: "1".into(),
        chain_id: target.chain.id(),
        safe_address: target.safe,
        safe_tx_hash: service_tx.safe_tx_hash,
        transaction: SafeTransaction {
            to: service_tx.to,
            value: service_tx.value,
            data: service_tx.data.unwrap_or_default(),
            operation: Operation::try_from(service_tx.operation)
                .map_err(|err| anyhow!("service returned {err}"))?,
            safe_tx_gas: service_tx.safe_tx_gas,
            base_gas: service_tx.base_gas,
            gas_price: service_tx.gas_price,
            gas_token: service_tx.gas_token,
            refund_receiver: service_tx.refund_receiver,
            nonce: service_tx.nonce,
        },
        confirmations,
        confirmations_required: service_tx.confirmations_required,
        data_decoded: service_tx.data_decoded,
        onchain_policy_proof: None,
        consensus_proof: None,
        simulation: None,
        simulation_witness: None,
        export_contract: ExportContract::partial(reasons),
        packaged_at: Utc::now(),
        sources: Some(BTreeMap::from([(
            "transaction".to_owned(),
            url,
        )])),
    })
}
