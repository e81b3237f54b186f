//! The block aggregate mutated while transactions are applied.

use alloy_consensus::{Header, ReceiptEnvelope, TxEnvelope, transaction::Recovered};
use alloy_eips::eip4895::Withdrawal;
use alloy_primitives::Log;

use crate::{receipt::build_receipt, transaction::PendingTransaction};

/// A block under construction.
///
/// Accepted transactions and their receipts are kept in lockstep: the only way to grow the block
/// is [`CandidateBlock::append_transaction`], which also advances `header.gas_used`.
#[derive(Debug, Clone, Default)]
pub struct CandidateBlock {
    /// Header of the block being built. `gas_used` is maintained by the builder.
    pub header: Header,
    /// Accepted transactions in inclusion order, paired with their sender.
    transactions: Vec<Recovered<TxEnvelope>>,
    /// Receipts, one per accepted transaction.
    receipts: Vec<ReceiptEnvelope>,
    /// Ommer headers to include.
    pub ommers: Vec<Header>,
    /// Withdrawals to process during finalization, post-Shanghai.
    pub withdrawals: Option<Vec<Withdrawal>>,
    /// Transactions to apply instead of pulling from the pool.
    prepared_transactions: Option<Vec<PendingTransaction>>,
}

impl CandidateBlock {
    /// Creates an empty candidate for `header`.
    pub fn new(header: Header) -> Self {
        Self { header, ..Default::default() }
    }

    /// Sets the ommer headers.
    pub fn with_ommers(mut self, ommers: Vec<Header>) -> Self {
        self.ommers = ommers;
        self
    }

    /// Sets the withdrawals processed at the end of the block.
    pub fn with_withdrawals(mut self, withdrawals: Vec<Withdrawal>) -> Self {
        self.withdrawals = Some(withdrawals);
        self
    }

    /// Pre-loads the transactions to include, bypassing the pool.
    pub fn with_prepared_transactions(mut self, transactions: Vec<PendingTransaction>) -> Self {
        self.prepared_transactions = Some(transactions);
        self
    }

    /// Returns the block number.
    pub const fn number(&self) -> u64 {
        self.header.number
    }

    /// Returns the gas still available in the block.
    pub const fn gas_remaining(&self) -> u64 {
        self.header.gas_limit.saturating_sub(self.header.gas_used)
    }

    /// Returns the accepted transactions.
    pub fn transactions(&self) -> &[Recovered<TxEnvelope>] {
        &self.transactions
    }

    /// Returns the receipts of the accepted transactions.
    pub fn receipts(&self) -> &[ReceiptEnvelope] {
        &self.receipts
    }

    /// Number of accepted transactions.
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Returns `true` if no transaction was accepted yet.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Returns `true` if a non-empty pre-supplied transaction list is present.
    pub fn has_prepared_transactions(&self) -> bool {
        self.prepared_transactions.as_ref().is_some_and(|txs| !txs.is_empty())
    }

    /// Takes the pre-supplied transactions out of the block.
    pub fn take_prepared_transactions(&mut self) -> Option<Vec<PendingTransaction>> {
        self.prepared_transactions.take()
    }

    /// Appends a committed transaction, charging `gas_used` to the header and recording the
    /// receipt with the new cumulative gas.
    ///
    /// Callers guarantee `gas_used` fits in the remaining block gas.
    pub fn append_transaction(
        &mut self,
        tx: Recovered<TxEnvelope>,
        success: bool,
        gas_used: u64,
        logs: Vec<Log>,
    ) -> &ReceiptEnvelope {
        debug_assert!(gas_used <= self.gas_remaining(), "block gas limit exceeded");

        self.header.gas_used += gas_used;
        let receipt = build_receipt(tx.tx_type(), success, self.header.gas_used, logs);
        self.transactions.push(tx);
        self.receipts.push(receipt);
        &self.receipts[self.receipts.len() - 1]
    }

    /// Splits the block into header, transactions, receipts, ommers and withdrawals.
    pub fn into_parts(
        self,
    ) -> (
        Header,
        Vec<Recovered<TxEnvelope>>,
        Vec<ReceiptEnvelope>,
        Vec<Header>,
        Option<Vec<Withdrawal>>,
    ) {
        (self.header, self.transactions, self.receipts, self.ommers, self.withdrawals)
    }
}
