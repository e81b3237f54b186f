//! The transaction pool seam.

use alloy_primitives::{Address, Bytes};

use crate::error::PoolError;

/// A raw transaction handed out by the pool together with the sender it recovered on admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PooledTransaction {
    /// EIP-2718 encoded transaction.
    pub rlp: Bytes,
    /// Sender recovered by the pool.
    pub sender: Address,
}

impl PooledTransaction {
    /// Creates a pooled transaction.
    pub const fn new(rlp: Bytes, sender: Address) -> Self {
        Self { rlp, sender }
    }
}

/// Answer of [`TransactionPool::best_ready`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BestReady {
    /// Best ready transactions, grouped by sender in nonce order.
    pub transactions: Vec<PooledTransaction>,
    /// `false` while the pool is still indexing and a later call may return more.
    pub complete: bool,
}

/// Read access to the best executable transactions of the pool.
#[auto_impl::auto_impl(&, Arc)]
pub trait TransactionPool {
    /// Returns up to `max_count` transactions that fit in `remaining_gas`, ready on top of block
    /// `execution_at`.
    fn best_ready(
        &self,
        max_count: u16,
        remaining_gas: u64,
        execution_at: u64,
    ) -> Result<BestReady, PoolError>;
}
