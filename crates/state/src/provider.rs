//! Traits implemented by the storage engine the builder runs on.

use alloy_primitives::{Address, B256, U256};

use crate::{StateChangeset, StateError};

/// An account as seen by the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Account {
    /// Account nonce.
    pub nonce: u64,
    /// Account balance in wei.
    pub balance: U256,
    /// Hash of the account's bytecode, `None` for externally owned accounts.
    pub bytecode_hash: Option<B256>,
}

impl Account {
    /// Creates an externally owned account.
    pub const fn new(nonce: u64, balance: U256) -> Self {
        Self { nonce, balance, bytecode_hash: None }
    }

    /// Returns `true` if the account has code.
    pub const fn has_bytecode(&self) -> bool {
        self.bytecode_hash.is_some()
    }
}

/// Read access to the parent state a block is built on.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait StateProvider {
    /// Returns the account at `address`, or `None` if it does not exist.
    fn basic_account(&self, address: &Address) -> Result<Option<Account>, StateError>;

    /// Returns the value of storage `slot` of `address`, zero if unset.
    fn storage(&self, address: &Address, slot: &B256) -> Result<U256, StateError>;
}

/// Persists the writes of a finalized block.
#[auto_impl::auto_impl(&mut, Box)]
pub trait StateWriter {
    /// Writes `changes` as the post-state of `block_number`.
    fn write_state(&mut self, block_number: u64, changes: &StateChangeset) -> Result<(), StateError>;
}
