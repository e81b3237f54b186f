use alloy_primitives::{
    Address, B256, U256,
    map::{HashMap, HashSet},
};
use tracing::trace;

use crate::{Account, StateChangeset, StateError, StateProvider};

/// Undo record of a single overlay write.
#[derive(Debug, Clone)]
enum JournalEntry {
    /// An account entry was written; `previous` is the overlay value before the write.
    Account {
        /// Written account.
        address: Address,
        /// Overlay value before the write, `None` if the account was only in the provider.
        previous: Option<Account>,
    },
    /// A storage slot was written.
    Storage {
        /// Owner of the slot.
        address: Address,
        /// Written slot.
        slot: B256,
        /// Overlay value before the write.
        previous: Option<U256>,
    },
}

/// Opaque handle to a point in the state journal.
///
/// Produced by [`IntraBlockState::checkpoint`] and resolved exactly once through
/// [`IntraBlockState::commit`] or [`IntraBlockState::rollback`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a checkpoint must be committed or rolled back"]
pub struct Checkpoint {
    /// Identifier used to catch resolving a stale checkpoint.
    id: u64,
    /// Journal length when the checkpoint was taken.
    journal_len: usize,
}

/// Mutable world state of the block under construction.
///
/// Reads fall through to the provider, writes land in an in-memory overlay. While a checkpoint is
/// open every write records its previous overlay value, which is what makes rollback exact.
#[derive(Debug)]
pub struct IntraBlockState<P> {
    /// Parent state.
    provider: P,
    /// Accounts written during this block.
    accounts: HashMap<Address, Account>,
    /// Storage slots written during this block.
    storage: HashMap<(Address, B256), U256>,
    /// Undo log of the open checkpoint.
    journal: Vec<JournalEntry>,
    /// Id of the open checkpoint, if any.
    open_checkpoint: Option<u64>,
    /// Id handed to the next checkpoint.
    next_checkpoint_id: u64,
}

impl<P: StateProvider> IntraBlockState<P> {
    /// Creates an empty overlay over `provider`.
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            accounts: HashMap::default(),
            storage: HashMap::default(),
            journal: Vec::new(),
            open_checkpoint: None,
            next_checkpoint_id: 0,
        }
    }

    /// Returns the parent state provider.
    pub const fn provider(&self) -> &P {
        &self.provider
    }

    /// Returns the current account at `address`.
    pub fn basic_account(&self, address: &Address) -> Result<Option<Account>, StateError> {
        match self.accounts.get(address) {
            Some(account) => Ok(Some(*account)),
            None => self.provider.basic_account(address),
        }
    }

    /// Returns the current nonce of `address`, zero for missing accounts.
    pub fn nonce(&self, address: &Address) -> Result<u64, StateError> {
        Ok(self.basic_account(address)?.map_or(0, |account| account.nonce))
    }

    /// Returns the current balance of `address`, zero for missing accounts.
    pub fn balance(&self, address: &Address) -> Result<U256, StateError> {
        Ok(self.basic_account(address)?.map_or(U256::ZERO, |account| account.balance))
    }

    /// Returns the current value of storage `slot` of `address`.
    pub fn storage(&self, address: &Address, slot: &B256) -> Result<U256, StateError> {
        match self.storage.get(&(*address, *slot)) {
            Some(value) => Ok(*value),
            None => self.provider.storage(address, slot),
        }
    }

    /// Sets the nonce of `address`, creating the account if needed.
    pub fn set_nonce(&mut self, address: Address, nonce: u64) -> Result<(), StateError> {
        self.modify_account(address, |account| account.nonce = nonce)
    }

    /// Increments the nonce of `address`.
    ///
    /// Fails with [`StateError::NonceOverflow`] and leaves the account untouched if the nonce is
    /// already `u64::MAX`.
    pub fn increment_nonce(&mut self, address: Address) -> Result<(), StateError> {
        let nonce =
            self.nonce(&address)?.checked_add(1).ok_or(StateError::NonceOverflow(address))?;
        self.modify_account(address, |account| account.nonce = nonce)
    }

    /// Credits `amount` to `address`.
    pub fn add_balance(&mut self, address: Address, amount: U256) -> Result<(), StateError> {
        if amount.is_zero() && self.accounts.contains_key(&address) {
            return Ok(());
        }
        self.modify_account(address, |account| {
            account.balance = account.balance.saturating_add(amount)
        })
    }

    /// Debits `amount` from `address`.
    ///
    /// Returns `false` and leaves the account untouched if the balance does not cover `amount`.
    pub fn checked_sub_balance(&mut self, address: Address, amount: U256) -> Result<bool, StateError> {
        if self.balance(&address)? < amount {
            return Ok(false);
        }
        self.modify_account(address, |account| account.balance -= amount)?;
        Ok(true)
    }

    /// Writes `value` to storage `slot` of `address`.
    pub fn set_storage(&mut self, address: Address, slot: B256, value: U256) -> Result<(), StateError> {
        let previous = self.storage.insert((address, slot), value);
        if self.open_checkpoint.is_some() {
            self.journal.push(JournalEntry::Storage { address, slot, previous });
        }
        Ok(())
    }

    /// Loads the account (defaulting to an empty one), applies `f` and journals the write.
    fn modify_account(&mut self, address: Address, f: impl FnOnce(&mut Account)) -> Result<(), StateError> {
        let previous = self.accounts.get(&address).copied();
        let mut account = match previous {
            Some(account) => account,
            None => self.provider.basic_account(&address)?.unwrap_or_default(),
        };
        f(&mut account);
        self.accounts.insert(address, account);
        if self.open_checkpoint.is_some() {
            self.journal.push(JournalEntry::Account { address, previous });
        }
        Ok(())
    }

    /// Opens a checkpoint at the current state.
    ///
    /// Only one checkpoint may be open at a time; it has to be resolved before the next one.
    pub fn checkpoint(&mut self) -> Checkpoint {
        debug_assert!(self.open_checkpoint.is_none(), "a state checkpoint is already open");

        let id = self.next_checkpoint_id;
        self.next_checkpoint_id += 1;
        self.open_checkpoint = Some(id);
        Checkpoint { id, journal_len: self.journal.len() }
    }

    /// Undoes every write made since `checkpoint`, keeping the checkpoint open.
    ///
    /// Calling this again without intervening writes is a no-op.
    pub fn revert_to(&mut self, checkpoint: &Checkpoint) {
        debug_assert_eq!(self.open_checkpoint, Some(checkpoint.id), "stale state checkpoint");

        let reverted = self.journal.len().saturating_sub(checkpoint.journal_len);
        while self.journal.len() > checkpoint.journal_len {
            match self.journal.pop() {
                Some(JournalEntry::Account { address, previous }) => match previous {
                    Some(account) => {
                        self.accounts.insert(address, account);
                    }
                    None => {
                        self.accounts.remove(&address);
                    }
                },
                Some(JournalEntry::Storage { address, slot, previous }) => match previous {
                    Some(value) => {
                        self.storage.insert((address, slot), value);
                    }
                    None => {
                        self.storage.remove(&(address, slot));
                    }
                },
                None => break,
            }
        }
        if reverted > 0 {
            trace!(target: "state", checkpoint = checkpoint.id, reverted, "reverted state writes");
        }
    }

    /// Undoes every write made since `checkpoint` and closes it.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.revert_to(&checkpoint);
        self.open_checkpoint = None;
    }

    /// Keeps every write made since `checkpoint` and closes it.
    pub fn commit(&mut self, checkpoint: Checkpoint) {
        debug_assert_eq!(self.open_checkpoint, Some(checkpoint.id), "stale state checkpoint");

        self.journal.truncate(checkpoint.journal_len);
        self.open_checkpoint = None;
    }

    /// Returns `true` while a checkpoint is open.
    pub const fn has_open_checkpoint(&self) -> bool {
        self.open_checkpoint.is_some()
    }

    /// Returns the addresses written so far.
    pub fn touched_accounts(&self) -> HashSet<Address> {
        self.accounts.keys().chain(self.storage.keys().map(|(address, _)| address)).copied().collect()
    }

    /// Collects the writes accumulated so far.
    pub fn changeset(&self) -> StateChangeset {
        let mut changes = StateChangeset::default();
        changes.accounts.extend(self.accounts.iter().map(|(address, account)| (*address, *account)));
        for ((address, slot), value) in &self.storage {
            changes.storage.entry(*address).or_default().insert(*slot, *value);
        }
        changes
    }
}
