//! Speculative screening of fetched transactions.

use alloy_consensus::Transaction;
use alloy_primitives::U256;
use kiln_primitives::{MIN_TRANSACTION_GAS, PendingTransaction};
use kiln_state::{IntraBlockState, StateError, StateProvider};
use tracing::{debug, trace};

/// Block context the filter checks transactions against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterContext {
    /// Number of the block the transactions are meant for.
    pub block_number: u64,
    /// Base fee of that block, if London is active.
    pub base_fee: Option<u64>,
}

/// Drops transactions that cannot be valid in the block before they reach the builder.
#[auto_impl::auto_impl(&mut, Box)]
pub trait TransactionFilter {
    /// Returns the transactions of `batch` worth applying, in their original order.
    fn filter(
        &mut self,
        batch: Vec<PendingTransaction>,
        ctx: FilterContext,
    ) -> Result<Vec<PendingTransaction>, StateError>;
}

/// Accepts every transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFilter;

impl TransactionFilter for NoopFilter {
    fn filter(
        &mut self,
        batch: Vec<PendingTransaction>,
        _ctx: FilterContext,
    ) -> Result<Vec<PendingTransaction>, StateError> {
        Ok(batch)
    }
}

/// Rejection counters of one filter pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    /// Sender account does not exist.
    pub no_sender: usize,
    /// Sender account has code (EIP-3607).
    pub sender_is_contract: usize,
    /// Nonce below the simulated account nonce.
    pub nonce_too_low: usize,
    /// Nonce above the simulated account nonce.
    pub nonce_gap: usize,
    /// Nonce is `u64::MAX` and cannot be incremented (EIP-2681).
    pub nonce_max: usize,
    /// Fee cap below the block base fee.
    pub fee_too_low: usize,
    /// Gas limit below the cheapest transaction.
    pub intrinsic_gas: usize,
    /// Balance does not cover `gas_limit * fee_cap + value`.
    pub balance_too_low: usize,
}

impl FilterStats {
    /// Total number of rejected transactions.
    pub const fn rejected(&self) -> usize {
        self.no_sender +
            self.sender_is_contract +
            self.nonce_too_low +
            self.nonce_gap +
            self.nonce_max +
            self.fee_too_low +
            self.intrinsic_gas +
            self.balance_too_low
    }
}

/// Screens transactions against a simulation of the block state.
///
/// The simulation lives for the whole building cycle: every accepted transaction bumps the
/// simulated sender nonce and debits its maximum cost, so the next batch is checked against the
/// state the earlier batches are expected to leave behind.
#[derive(Debug)]
pub struct BadTransactionFilter<P> {
    /// Simulated state, never persisted.
    simulation: IntraBlockState<P>,
}

impl<P: StateProvider> BadTransactionFilter<P> {
    /// Creates a filter simulating on top of `provider`.
    pub fn new(provider: P) -> Self {
        Self { simulation: IntraBlockState::new(provider) }
    }

    /// Returns the simulated state.
    pub const fn simulation(&self) -> &IntraBlockState<P> {
        &self.simulation
    }
}

impl<P: StateProvider> TransactionFilter for BadTransactionFilter<P> {
    fn filter(
        &mut self,
        batch: Vec<PendingTransaction>,
        ctx: FilterContext,
    ) -> Result<Vec<PendingTransaction>, StateError> {
        let initial = batch.len();
        let mut stats = FilterStats::default();
        let mut accepted = Vec::with_capacity(initial);

        for pending in batch {
            let Ok(sender) = pending.recover_sender() else {
                // Left to the builder, which logs and skips it.
                accepted.push(pending);
                continue;
            };
            let Some(account) = self.simulation.basic_account(&sender)? else {
                stats.no_sender += 1;
                continue;
            };
            if account.has_bytecode() {
                stats.sender_is_contract += 1;
                continue;
            }

            let tx = pending.tx();
            if tx.nonce() < account.nonce {
                stats.nonce_too_low += 1;
                continue;
            }
            if tx.nonce() > account.nonce {
                stats.nonce_gap += 1;
                continue;
            }
            if tx.nonce() == u64::MAX {
                stats.nonce_max += 1;
                continue;
            }
            if let Some(base_fee) = ctx.base_fee
                && tx.max_fee_per_gas() < base_fee as u128
            {
                stats.fee_too_low += 1;
                continue;
            }
            if tx.gas_limit() < MIN_TRANSACTION_GAS {
                stats.intrinsic_gas += 1;
                continue;
            }

            let cost = U256::from(tx.gas_limit())
                .saturating_mul(U256::from(tx.max_fee_per_gas()))
                .saturating_add(tx.value());
            if !self.simulation.checked_sub_balance(sender, cost)? {
                trace!(target: "tx_selection", hash = %pending.hash(), %sender, %cost, "insufficient simulated balance");
                stats.balance_too_low += 1;
                continue;
            }
            self.simulation.increment_nonce(sender)?;
            accepted.push(pending);
        }

        if stats.rejected() > 0 {
            debug!(
                target: "tx_selection",
                block_number = ctx.block_number,
                initial,
                accepted = accepted.len(),
                ?stats,
                "filtered bad transactions"
            );
        }
        Ok(accepted)
    }
}
