use alloy_primitives::{Address, B256, U256, map::HashMap};

use crate::{Account, StateChangeset, StateError, StateProvider, StateWriter};

/// State held entirely in memory.
///
/// Serves as the parent state of development chains and tests, and records the last block it
/// persisted so callers can check what was written.
#[derive(Debug, Clone, Default)]
pub struct InMemoryState {
    /// Accounts by address.
    accounts: HashMap<Address, Account>,
    /// Storage slots by account.
    storage: HashMap<Address, HashMap<B256, U256>>,
    /// Block number of the last persisted changeset.
    last_written_block: Option<u64>,
}

impl InMemoryState {
    /// Inserts or replaces an account.
    pub fn insert_account(&mut self, address: Address, account: Account) {
        self.accounts.insert(address, account);
    }

    /// Returns the state with `account` inserted at `address`.
    pub fn with_account(mut self, address: Address, account: Account) -> Self {
        self.insert_account(address, account);
        self
    }

    /// Writes a storage slot.
    pub fn insert_storage(&mut self, address: Address, slot: B256, value: U256) {
        self.storage.entry(address).or_default().insert(slot, value);
    }

    /// Returns the account at `address`.
    pub fn account(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    /// Returns the block number of the last persisted changeset.
    pub const fn last_written_block(&self) -> Option<u64> {
        self.last_written_block
    }
}

impl StateProvider for InMemoryState {
    fn basic_account(&self, address: &Address) -> Result<Option<Account>, StateError> {
        Ok(self.accounts.get(address).copied())
    }

    fn storage(&self, address: &Address, slot: &B256) -> Result<U256, StateError> {
        Ok(self
            .storage
            .get(address)
            .and_then(|slots| slots.get(slot))
            .copied()
            .unwrap_or_default())
    }
}

impl StateWriter for InMemoryState {
    fn write_state(&mut self, block_number: u64, changes: &StateChangeset) -> Result<(), StateError> {
        self.accounts.extend(changes.accounts.iter().map(|(address, account)| (*address, *account)));
        for (address, slots) in &changes.storage {
            self.storage.entry(*address).or_default().extend(slots.iter().map(|(k, v)| (*k, *v)));
        }
        self.last_written_block = Some(block_number);
        Ok(())
    }
}
