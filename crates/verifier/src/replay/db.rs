//! Witness-backed `revm` database.
//!
//! Every account and storage slot the replay may read must have been proven
//! under the anchored state root (or declared as an explicit override).
//! Reads outside the witnessed set fail the replay instead of silently
//! returning zero, so an incomplete witness cannot masquerade as a
//! successful re-execution.

use {
    alloy_primitives::{Address, B256, U256},
    revm::{
        Database,
        database_interface::DBErrorMarker,
        state::{AccountInfo, Bytecode},
    },
    std::collections::HashMap,
};

/// One witnessed account, fully resolved for execution.
#[derive(Debug, Clone)]
pub struct WitnessedAccount {
    pub info: AccountInfo,
    pub storage: HashMap<U256, U256>,
}

/// In-memory state assembled from verified witness proofs.
#[derive(Debug, Default)]
pub struct WitnessDb {
    accounts: HashMap<Address, WitnessedAccount>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WitnessDbError {
    #[error("storage slot {slot} of {address} was read but not witnessed")]
    UnwitnessedStorage { address: Address, slot: U256 },
    #[error("bytecode for hash {0} was not witnessed")]
    UnwitnessedCode(B256),
}

impl DBErrorMarker for WitnessDbError {}

impl WitnessDb {
    pub fn insert(&mut self, address: Address, account: WitnessedAccount) {
        self.accounts.insert(address, account);
    }

    pub fn account(&self, address: &Address) -> Option<&WitnessedAccount> {
        self.accounts.get(address)
    }

    /// Apply an explicit storage override to `address`.
    pub fn override_slot(&mut self, address: Address, key: B256, value: B256) {
        let account = self.accounts.entry(address).or_insert_with(|| WitnessedAccount {
            info: AccountInfo::default(),
            storage: HashMap::new(),
        });
        account.storage.insert(
            U256::from_be_bytes(key.0),
            U256::from_be_bytes(value.0),
        );
    }

    pub fn nonce_of(&self, address: &Address) -> u64 {
        self.accounts
            .get(address)
            .map(|account| account.info.nonce)
            .unwrap_or_default()
    }
}

impl Database for WitnessDb {
    type Error = WitnessDbError;

    fn basic(&mut self, address: Address) -> Result<Option<AccountInfo>, Self::Error> {
        // Accounts outside the witness read as nonexistent; touching their
        // storage is still an error below.
        Ok(self.accounts.get(&address).map(|account| account.info.clone()))
    }

    fn code_by_hash(&mut self, code_hash: B256) -> Result<Bytecode, Self::Error> {
        // Witnessed accounts carry their code inline in `AccountInfo`, so
        // this is only reached for code the witness did not provide.
        Err(WitnessDbError::UnwitnessedCode(code_hash))
    }

    fn storage(&mut self, address: Address, index: U256) -> Result<U256, Self::Error> {
        match self.accounts.get(&address) {
            Some(account) => account
                .storage
                .get(&index)
                .copied()
                .ok_or(WitnessDbError::UnwitnessedStorage {
                    address,
                    slot: index,
                }),
            None => Err(WitnessDbError::UnwitnessedStorage {
                address,
                slot: index,
            }),
        }
    }

    fn block_hash(&mut self, _number: u64) -> Result<B256, Self::Error> {
        // No header chain is witnessed; BLOCKHASH reads as zero, the same
        // as an out-of-range lookup on-chain.
        Ok(B256::ZERO)
    }
}
