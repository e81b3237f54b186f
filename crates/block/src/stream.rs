//! Cursors over the transactions of one batch.

use alloy_primitives::{Address, map::HashSet};
use kiln_primitives::PendingTransaction;

/// Cursor over transactions grouped by sender.
///
/// The builder inspects the current transaction with [`TransactionStream::peek`] and then always
/// advances, either past the transaction alone ([`TransactionStream::shift`]) or past every
/// remaining transaction of its sender ([`TransactionStream::pop`]).
#[auto_impl::auto_impl(&mut, Box)]
pub trait TransactionStream {
    /// Returns the current transaction without consuming it.
    fn peek(&self) -> Option<&PendingTransaction>;

    /// Advances past the current transaction only.
    fn shift(&mut self);

    /// Drops the current transaction and the remaining transactions of its sender.
    fn pop(&mut self);
}

/// A [`TransactionStream`] that yields transactions in the order they were supplied.
#[derive(Debug, Clone, Default)]
pub struct FixedOrderTransactions {
    /// Transactions in iteration order.
    transactions: Vec<PendingTransaction>,
    /// Index of the current transaction.
    cursor: usize,
    /// Senders whose remaining transactions are skipped.
    dropped: HashSet<Address>,
}

impl FixedOrderTransactions {
    /// Creates a stream over `transactions`.
    ///
    /// Senders are recovered once here for transactions that come without one.
    pub fn new(transactions: Vec<PendingTransaction>) -> Self {
        let transactions = transactions.into_iter().map(PendingTransaction::into_attributed).collect();
        Self { transactions, cursor: 0, dropped: HashSet::default() }
    }

    /// Returns `true` if the stream has no transaction left.
    pub fn is_empty(&self) -> bool {
        self.peek().is_none()
    }

    /// Number of transactions the stream was created with.
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Moves the cursor forward until it rests on a transaction of a sender that was not dropped.
    fn skip_dropped(&mut self) {
        if self.dropped.is_empty() {
            return;
        }
        while let Some(tx) = self.transactions.get(self.cursor) {
            match tx.sender() {
                Some(sender) if self.dropped.contains(&sender) => self.cursor += 1,
                _ => break,
            }
        }
    }
}

impl TransactionStream for FixedOrderTransactions {
    /// Returns the transaction under the cursor.
    fn peek(&self) -> Option<&PendingTransaction> {
        self.transactions.get(self.cursor)
    }

    /// Moves the cursor one step, then past any dropped sender.
    fn shift(&mut self) {
        if self.cursor < self.transactions.len() {
            self.cursor += 1;
        }
        self.skip_dropped();
    }

    /// Marks the current sender as dropped and moves on.
    fn pop(&mut self) {
        let Some(tx) = self.transactions.get(self.cursor) else { return };
        if let Some(sender) = tx.sender() {
            self.dropped.insert(sender);
        }
        self.shift();
    }
}

impl From<Vec<PendingTransaction>> for FixedOrderTransactions {
    /// Wraps `transactions` in a stream starting at the first one.
    fn from(transactions: Vec<PendingTransaction>) -> Self {
        Self::new(transactions)
    }
}
