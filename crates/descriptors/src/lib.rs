//! ERC-7730 style calldata descriptors for display.
//!
//! A read-mostly registry keyed by `(chainId, contract, selector)` into a
//! flat descriptor vector. Strictly presentation-level: nothing here
//! participates in trust decisions, and lookups that miss simply fall back
//! to raw calldata rendering.

use {
    alloy_primitives::{Address, keccak256},
    serde::{Deserialize, Serialize},
    std::{collections::HashMap, sync::OnceLock},
};

/// Display metadata for one `(contract, selector)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Zero means "any chain".
    pub chain_id: u64,
    /// Zero address means "any contract" (interface-level descriptors).
    pub contract: Address,
    pub selector: [u8; 4],
    /// Human intent line, e.g. "Send tokens".
    pub intent: String,
    /// Display labels for the decoded parameters, in ABI order.
    pub field_labels: Vec<String>,
}

/// Index into a flat descriptor arena. No back-pointers: descriptors do
/// not know their keys.
#[derive(Debug, Default)]
pub struct Registry {
    index: HashMap<(u64, Address, [u8; 4]), usize>,
    descriptors: Vec<Descriptor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a descriptor, replacing any previous entry for its key.
    pub fn insert(&mut self, descriptor: Descriptor) {
        let key = (
            descriptor.chain_id,
            descriptor.contract,
            descriptor.selector,
        );
        let slot = self.descriptors.len();
        self.descriptors.push(descriptor);
        self.index.insert(key, slot);
    }

    /// Look up a descriptor, falling back from the exact contract to the
    /// interface-level entry, and from the exact chain to "any chain".
    pub fn lookup(
        &self,
        chain_id: u64,
        contract: Address,
        selector: [u8; 4],
    ) -> Option<&Descriptor> {
        [
            (chain_id, contract, selector),
            (0, contract, selector),
            (chain_id, Address::ZERO, selector),
            (0, Address::ZERO, selector),
        ]
        .into_iter()
        .find_map(|key| self.index.get(&key))
        .map(|slot| &self.descriptors[*slot])
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// The process-wide registry with the built-in descriptor set.
/// Initialized lazily, exactly once.
pub fn global() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(builtin)
}

/// Built-in interface-level descriptors for the calls that dominate Safe
/// traffic.
fn builtin() -> Registry {
    let mut registry = Registry::new();
    let interface = |signature: &str, intent: &str, labels: &[&str]| Descriptor {
        chain_id: 0,
        contract: Address::ZERO,
        selector: selector(signature),
        intent: intent.to_owned(),
        field_labels: labels.iter().map(|label| (*label).to_owned()).collect(),
    };

    registry.insert(interface(
        "transfer(address,uint256)",
        "Send tokens",
        &["To", "Amount"],
    ));
    registry.insert(interface(
        "approve(address,uint256)",
        "Approve token spending",
        &["Spender", "Allowance"],
    ));
    registry.insert(interface(
        "transferFrom(address,address,uint256)",
        "Transfer tokens from another account",
        &["From", "To", "Amount"],
    ));
    registry.insert(interface(
        "multiSend(bytes)",
        "Batch of transactions",
        &["Transactions"],
    ));
    registry.insert(interface(
        "addOwnerWithThreshold(address,uint256)",
        "Add a Safe owner",
        &["Owner", "New threshold"],
    ));
    registry.insert(interface(
        "removeOwner(address,address,uint256)",
        "Remove a Safe owner",
        &["Previous owner", "Owner", "New threshold"],
    ));
    registry.insert(interface(
        "changeThreshold(uint256)",
        "Change the Safe threshold",
        &["New threshold"],
    ));
    registry.insert(interface(
        "setGuard(address)",
        "Set the Safe guard",
        &["Guard"],
    ));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interface_fallback_lookup() {
        let registry = global();
        let transfer = selector("transfer(address,uint256)");
        // Any chain, any contract resolves through the fallback chain.
        let descriptor = registry
            .lookup(1, Address::repeat_byte(0xaa), transfer)
            .unwrap();
        assert_eq!(descriptor.intent, "Send tokens");
        assert_eq!(descriptor.field_labels, vec!["To", "Amount"]);
    }

    #[test]
    fn exact_entry_wins_over_interface_entry() {
        let mut registry = Registry::new();
        let transfer = selector("transfer(address,uint256)");
        registry.insert(Descriptor {
            chain_id: 0,
            contract: Address::ZERO,
            selector: transfer,
            intent: "Send tokens".into(),
            field_labels: vec![],
        });
        registry.insert(Descriptor {
            chain_id: 1,
            contract: Address::repeat_byte(0xaa),
            selector: transfer,
            intent: "Send WETH".into(),
            field_labels: vec![],
        });
        assert_eq!(
            registry
                .lookup(1, Address::repeat_byte(0xaa), transfer)
                .unwrap()
                .intent,
            "Send WETH"
        );
        assert_eq!(
            registry
                .lookup(1, Address::repeat_byte(0xbb), transfer)
                .unwrap()
                .intent,
            "Send tokens"
        );
    }

    #[test]
    fn unknown_selector_misses() {
        assert!(global().lookup(1, Address::ZERO, [0, 0, 0, 0]).is_none());
    }

    #[test]
    fn global_registry_is_shared() {
        assert!(std::ptr::eq(global(), global()));
        assert!(!global().is_empty());
    }
}
