//! EIP-712 Safe transaction hashing.
//!
//! Recomputes `safeTxHash` exactly as the Safe singleton does on-chain:
//! `keccak256(0x19 ‖ 0x01 ‖ domainSeparator ‖ structHash)` with a two-field
//! domain (`chainId`, `verifyingContract`) and the ten-field `SafeTx`
//! struct. The type hashes are derived from the `sol!` definitions rather
//! than hard-coded.

use {
    alloy_primitives::{Address, B256, U256},
    alloy_sol_types::{Eip712Domain, SolStruct, sol},
    evidence::SafeTransaction,
    serde::Serialize,
};

sol! {
    /// The struct the Safe hashes for `getTransactionHash`.
    struct SafeTx {
        address to;
        uint256 value;
        bytes data;
        uint8 operation;
        uint256 safeTxGas;
        uint256 baseGas;
        uint256 gasPrice;
        address gasToken;
        address refundReceiver;
        uint256 nonce;
    }
}

/// Intermediate digests, surfaced in the report so an operator can compare
/// them against a hardware wallet's display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HashDetails {
    pub domain_separator: B256,
    pub struct_hash: B256,
    pub safe_tx_hash: B256,
}

/// Recompute the EIP-712 digest for `tx` on `safe` at `chain_id`.
pub fn compute_safe_tx_hash(
    tx: &SafeTransaction,
    chain_id: u64,
    safe: Address,
) -> HashDetails {
    let domain = Eip712Domain::new(
        None,
        None,
        Some(U256::from(chain_id)),
        Some(safe),
        None,
    );
    let message = SafeTx {
        to: tx.to,
        value: tx.value,
        data: tx.data.clone(),
        operation: u8::from(tx.operation),
        safeTxGas: tx.safe_tx_gas,
        baseGas: tx.base_gas,
        gasPrice: tx.gas_price,
        gasToken: tx.gas_token,
        refundReceiver: tx.refund_receiver,
        nonce: tx.nonce,
    };

    HashDetails {
        domain_separator: domain.separator(),
        struct_hash: message.eip712_hash_struct(),
        safe_tx_hash: message.eip712_signing_hash(&domain),
    }
}
