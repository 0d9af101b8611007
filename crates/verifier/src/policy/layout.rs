//! Storage layout of the deployed Safe singleton (v1.3.0 / v1.4.1).
//!
//! Both linked lists (owners, modules) use the address `0x…01` as their
//! sentinel: `list[SENTINEL]` is the head, and the list terminates when a
//! `next` pointer returns to the sentinel.

use alloy_primitives::{Address, B256, U256, keccak256};

/// Sentinel terminating the owner and module linked lists.
pub const SENTINEL: Address = Address::with_last_byte(0x01);

/// Slot 0: the master copy this proxy delegates to.
pub const SINGLETON_SLOT: u64 = 0;
/// Slot 1: `mapping(address => address) modules`.
pub const MODULES_SLOT: u64 = 1;
/// Slot 2: `mapping(address => address) owners`.
pub const OWNERS_SLOT: u64 = 2;
/// Slot 3: `ownerCount`.
pub const OWNER_COUNT_SLOT: u64 = 3;
/// Slot 4: `threshold`.
pub const THRESHOLD_SLOT: u64 = 4;
/// Slot 5: `nonce`.
pub const NONCE_SLOT: u64 = 5;

/// `keccak256("fallback_manager.handler.address")`.
pub const FALLBACK_HANDLER_SLOT: B256 = B256::new(alloy_primitives::hex!(
    "6c9a6c4a39284e37ed1cf53d337577d14212a4870fb976a4366c693b939918d5"
));

/// `keccak256("guard_manager.guard.address")`.
pub const GUARD_SLOT: B256 = B256::new(alloy_primitives::hex!(
    "4a204f620c8c5ccdca3fd54d003badd85ba500436a431f0cbda4f558c93c34c8"
));

/// Storage key of a fixed (non-mapping) slot.
pub fn fixed_slot(slot: u64) -> B256 {
    B256::from(U256::from(slot))
}

/// Storage key of `mapping[address]` rooted at `slot`, i.e.
/// `keccak256(pad32(key) ‖ pad32(slot))`.
pub fn mapping_slot(key: Address, slot: u64) -> B256 {
    let mut buf = [0u8; 64];
    buf[12..32].copy_from_slice(key.as_slice());
    buf[32..].copy_from_slice(B256::from(U256::from(slot)).as_slice());
    keccak256(buf)
}

/// Head of the owner linked list: `owners[SENTINEL]`.
pub fn owners_head_slot() -> B256 {
    mapping_slot(SENTINEL, OWNERS_SLOT)
}

/// Next pointer of `owner` in the owner linked list.
pub fn owner_next_slot(owner: Address) -> B256 {
    mapping_slot(owner, OWNERS_SLOT)
}

/// Head of the module linked list: `modules[SENTINEL]`.
pub fn modules_head_slot() -> B256 {
    mapping_slot(SENTINEL, MODULES_SLOT)
}

/// Next pointer of `module` in the module linked list.
pub fn module_next_slot(module: Address) -> B256 {
    mapping_slot(module, MODULES_SLOT)
}

/// Interpret a storage word as the address stored in its low 20 bytes.
pub fn word_to_address(word: U256) -> Address {
    Address::from_word(B256::from(word))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_address_one() {
        assert_eq!(
            SENTINEL,
            "0x0000000000000000000000000000000000000001".parse::<Address>().unwrap()
        );
    }

    #[test]
    fn named_slots_hash_their_names() {
        assert_eq!(
            FALLBACK_HANDLER_SLOT,
            keccak256(b"fallback_manager.handler.address")
        );
        assert_eq!(GUARD_SLOT, keccak256(b"guard_manager.guard.address"));
    }

    #[test]
    fn mapping_slot_layout() {
        // keccak256 of the 32-byte-padded key followed by the padded slot.
        let owner = Address::repeat_byte(0xaa);
        let mut expected = [0u8; 64];
        expected[12..32].copy_from_slice(owner.as_slice());
        expected[63] = 2;
        assert_eq!(mapping_slot(owner, OWNERS_SLOT), keccak256(expected));
    }

    #[test]
    fn word_address_round_trip() {
        let owner = Address::repeat_byte(0xbc);
        let word = U256::from_be_bytes(B256::from(owner.into_word()).0);
        assert_eq!(word_to_address(word), owner);
    }
}
