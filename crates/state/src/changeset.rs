use std::collections::BTreeMap;

use alloy_primitives::{Address, B256, U256};

use crate::Account;

/// Accounts and storage slots written by a block, sorted for deterministic persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateChangeset {
    /// Post-block value of every touched account.
    pub accounts: BTreeMap<Address, Account>,
    /// Post-block value of every written storage slot, grouped by account.
    pub storage: BTreeMap<Address, BTreeMap<B256, U256>>,
}

impl StateChangeset {
    /// Returns `true` if the block wrote nothing.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.storage.is_empty()
    }

    /// Returns the written value of `slot` in `address`, if any.
    pub fn storage_slot(&self, address: &Address, slot: &B256) -> Option<U256> {
        self.storage.get(address).and_then(|slots| slots.get(slot)).copied()
    }
}
