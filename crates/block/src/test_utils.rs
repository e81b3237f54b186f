//! Deterministic collaborators for exercising the builder without an EVM.

use std::{
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use alloy_consensus::{
    Header, Signed, Transaction, TxEip1559, TxEnvelope, TxLegacy, transaction::Recovered,
};
use alloy_primitives::{
    Address, B256, Bytes, Log, LogData, Signature, TxKind, U256, keccak256, map::HashSet,
};
use kiln_chainspec::KILN_DEV_CHAIN_ID;
use kiln_primitives::{MIN_TRANSACTION_GAS, PendingTransaction};
use kiln_state::{IntraBlockState, StateChangeset, StateError, StateProvider};

use crate::{
    cancel::Interrupt,
    error::{ConsensusError, TxExecutionError},
    executor::{TransactionExecutor, TxExecutionOutcome},
    finalize::{
        ConsensusEngine, FinalizeInput, FinalizeOutcome, apply_withdrawals,
        calculate_receipts_root, drain_balances,
    },
};

/// Gas charged per byte of calldata by [`TransferExecutor`].
pub const CALLDATA_GAS_PER_BYTE: u64 = 16;

/// Placeholder signature; senders are supplied explicitly.
fn dummy_signature() -> Signature {
    Signature::new(U256::from(1), U256::from(2), false)
}

/// Signature that fails recovery.
pub fn invalid_signature() -> Signature {
    Signature::new(U256::ZERO, U256::ZERO, false)
}

/// A replay-protected legacy value transfer with gas limit 21000 and gas price 1.
pub fn legacy_transfer(nonce: u64, to: Address, value: u64) -> TxLegacy {
    TxLegacy {
        chain_id: Some(KILN_DEV_CHAIN_ID),
        nonce,
        gas_price: 1,
        gas_limit: MIN_TRANSACTION_GAS,
        to: TxKind::Call(to),
        value: U256::from(value),
        input: Bytes::default(),
    }
}

/// Signs `tx` with a placeholder signature.
pub fn sign_legacy(tx: TxLegacy) -> TxEnvelope {
    Signed::new_unhashed(tx, dummy_signature()).into()
}

/// Signs `tx` with a placeholder signature.
pub fn sign_eip1559(tx: TxEip1559) -> TxEnvelope {
    Signed::new_unhashed(tx, dummy_signature()).into()
}

/// A legacy transfer from `sender` with the sender already attributed.
pub fn transfer(sender: Address, nonce: u64, to: Address, value: u64) -> PendingTransaction {
    PendingTransaction::with_sender(sign_legacy(legacy_transfer(nonce, to, value)), sender)
}

/// Executes plain value transfers against the state overlay.
///
/// Gas used is the intrinsic gas: 21000 plus 16 per calldata byte. Calldata is echoed as a log
/// emitted by the recipient. The sender pays `gas_used * effective_gas_price + value`, the
/// beneficiary receives the priority fee.
#[derive(Debug, Default)]
pub struct TransferExecutor {
    /// Transactions rejected with [`TxExecutionError::Invalid`].
    rejected: HashSet<B256>,
    /// Transactions that fail with a storage error.
    state_failures: HashSet<B256>,
    /// Interrupt raised once the given number of transactions succeeded.
    interrupt_after: Option<(usize, Interrupt)>,
    /// Time every execution takes.
    delay: Option<Duration>,
    /// Number of successful executions.
    executed: AtomicUsize,
}

impl TransferExecutor {
    /// Rejects `hash` as invalid.
    pub fn reject(mut self, hash: B256) -> Self {
        self.rejected.insert(hash);
        self
    }

    /// Fails `hash` with a storage error.
    pub fn fail_state(mut self, hash: B256) -> Self {
        self.state_failures.insert(hash);
        self
    }

    /// Raises `interrupt` after `count` successful executions.
    pub fn interrupt_after(mut self, count: usize, interrupt: Interrupt) -> Self {
        self.interrupt_after = Some((count, interrupt));
        self
    }

    /// Makes every execution take at least `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of successful executions so far.
    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::Relaxed)
    }

    /// Intrinsic gas of `tx`.
    pub fn intrinsic_gas(tx: &TxEnvelope) -> u64 {
        MIN_TRANSACTION_GAS + CALLDATA_GAS_PER_BYTE * tx.input().len() as u64
    }
}

impl TransactionExecutor for TransferExecutor {
    fn execute<P: StateProvider>(
        &self,
        header: &Header,
        tx: &Recovered<TxEnvelope>,
        state: &mut IntraBlockState<P>,
    ) -> Result<TxExecutionOutcome, TxExecutionError> {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        let hash = *tx.tx_hash();
        if self.state_failures.contains(&hash) {
            return Err(StateError::provider("storage unavailable").into());
        }
        if self.rejected.contains(&hash) {
            return Err(TxExecutionError::Invalid("rejected by executor".to_string()));
        }

        let sender = tx.signer();
        let state_nonce = state.nonce(&sender)?;
        if tx.nonce() < state_nonce {
            return Err(TxExecutionError::NonceTooLow { tx: tx.nonce(), state: state_nonce });
        }
        if tx.nonce() > state_nonce {
            return Err(TxExecutionError::NonceTooHigh { tx: tx.nonce(), state: state_nonce });
        }

        if tx.nonce() == u64::MAX {
            return Err(TxExecutionError::NonceMaxValue);
        }

        let gas_used = Self::intrinsic_gas(tx);
        if tx.gas_limit() < gas_used {
            return Err(TxExecutionError::IntrinsicGasTooLow { have: tx.gas_limit(), want: gas_used });
        }

        let base_fee = header.base_fee_per_gas;
        if let Some(base_fee) = base_fee
            && tx.max_fee_per_gas() < base_fee as u128
        {
            return Err(TxExecutionError::FeeCapTooLow {
                max_fee_per_gas: tx.max_fee_per_gas(),
                base_fee,
            });
        }

        let upfront = U256::from(tx.gas_limit()) * U256::from(tx.max_fee_per_gas()) + tx.value();
        let balance = state.balance(&sender)?;
        if balance < upfront {
            return Err(TxExecutionError::InsufficientFunds { have: balance, want: upfront });
        }

        let gas_price = tx.effective_gas_price(base_fee);
        let cost = U256::from(gas_used) * U256::from(gas_price) + tx.value();
        if !state.checked_sub_balance(sender, cost)? {
            return Err(TxExecutionError::InsufficientFunds { have: balance, want: cost });
        }
        state.increment_nonce(sender)?;

        let mut logs = Vec::new();
        if let Some(to) = tx.to() {
            state.add_balance(to, tx.value())?;
            if !tx.input().is_empty() {
                logs.push(Log {
                    address: to,
                    data: LogData::new_unchecked(vec![keccak256(sender)], tx.input().clone()),
                });
            }
        }
        let tip = gas_price.saturating_sub(base_fee.unwrap_or_default() as u128);
        state.add_balance(header.beneficiary, U256::from(tip) * U256::from(gas_used))?;

        let executed = self.executed.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some((count, interrupt)) = &self.interrupt_after
            && executed >= *count
        {
            interrupt.request_stop();
        }

        Ok(TxExecutionOutcome { gas_used, success: true, logs })
    }
}

/// Consensus engine that processes withdrawals and derives a state root from the changeset.
#[derive(Debug, Default)]
pub struct MockConsensus {
    /// Accounts drained on the DAO fork block.
    dao_drained: Vec<Address>,
    /// Recipient of the drained balances.
    dao_beneficiary: Address,
    /// Number of `initialize` calls.
    initialized: AtomicUsize,
    /// Block numbers passed to `finalize`, in call order.
    finalized: Mutex<Vec<u64>>,
    /// Fails `finalize` when set.
    fail_finalize: bool,
}

impl MockConsensus {
    /// Drains `accounts` into `beneficiary` on the DAO fork block.
    pub fn with_dao_fork(mut self, accounts: Vec<Address>, beneficiary: Address) -> Self {
        self.dao_drained = accounts;
        self.dao_beneficiary = beneficiary;
        self
    }

    /// Makes `finalize` fail.
    pub fn failing(mut self) -> Self {
        self.fail_finalize = true;
        self
    }

    /// Number of `initialize` calls.
    pub fn initialized(&self) -> usize {
        self.initialized.load(Ordering::Relaxed)
    }

    /// Block numbers finalized so far.
    pub fn finalized(&self) -> Vec<u64> {
        self.finalized.lock().map(|blocks| blocks.clone()).unwrap_or_default()
    }

    /// Hashes the sorted changeset into a stand-in state root.
    pub fn state_root(changes: &StateChangeset) -> B256 {
        let mut preimage = Vec::new();
        for (address, account) in &changes.accounts {
            preimage.extend_from_slice(address.as_slice());
            preimage.extend_from_slice(&account.nonce.to_be_bytes());
            preimage.extend_from_slice(&account.balance.to_be_bytes::<32>());
        }
        for (address, slots) in &changes.storage {
            for (slot, value) in slots {
                preimage.extend_from_slice(address.as_slice());
                preimage.extend_from_slice(slot.as_slice());
                preimage.extend_from_slice(&value.to_be_bytes::<32>());
            }
        }
        keccak256(preimage)
    }
}

impl ConsensusEngine for MockConsensus {
    fn initialize<P: StateProvider>(
        &self,
        _header: &Header,
        _state: &mut IntraBlockState<P>,
    ) -> Result<(), ConsensusError> {
        self.initialized.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn apply_dao_fork<P: StateProvider>(
        &self,
        state: &mut IntraBlockState<P>,
    ) -> Result<(), ConsensusError> {
        Ok(drain_balances(state, &self.dao_drained, self.dao_beneficiary)?)
    }

    fn finalize<P: StateProvider>(
        &self,
        input: FinalizeInput<'_>,
        state: &mut IntraBlockState<P>,
    ) -> Result<FinalizeOutcome, ConsensusError> {
        if self.fail_finalize {
            return Err(ConsensusError::Rule("finalization refused".to_string()));
        }
        if let Ok(mut finalized) = self.finalized.lock() {
            finalized.push(input.header.number);
        }
        if let Some(withdrawals) = input.withdrawals {
            apply_withdrawals(state, withdrawals)?;
        }
        Ok(FinalizeOutcome {
            state_root: Self::state_root(&state.changeset()),
            receipts_root: calculate_receipts_root(input.receipts),
        })
    }
}
