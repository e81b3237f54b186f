//! Errors of the mining-exec stage.

use alloy_eips::eip2718::Eip2718Error;
use kiln_block::BlockBuildError;
use kiln_state::{BoxedStorageError, StateError};

/// Failure reported by a [`TransactionPool`](crate::pool::TransactionPool).
#[derive(Debug, thiserror::Error)]
#[error("transaction pool error: {0}")]
pub struct PoolError(#[source] pub BoxedStorageError);

impl PoolError {
    /// Wraps a pool backend error.
    pub fn new(err: impl Into<BoxedStorageError>) -> Self {
        Self(err.into())
    }
}

/// Failure reported by a [`ProgressStore`](crate::progress::ProgressStore).
#[derive(Debug, thiserror::Error)]
#[error("stage progress error: {0}")]
pub struct ProgressError(#[source] pub BoxedStorageError);

impl ProgressError {
    /// Wraps a progress store error.
    pub fn new(err: impl Into<BoxedStorageError>) -> Self {
        Self(err.into())
    }
}

/// Fatal errors of a mining-exec run, one variant per failing sub-step.
#[derive(Debug, thiserror::Error)]
pub enum MiningError {
    /// Reading the execution watermark failed.
    #[error("failed to read execution progress: {0}")]
    ReadProgress(#[source] ProgressError),
    /// The pool could not serve a batch.
    #[error("failed to fetch transactions for block {block_number}: {source}")]
    Pool {
        /// Block being built.
        block_number: u64,
        /// Underlying error.
        #[source]
        source: PoolError,
    },
    /// A pooled transaction could not be decoded.
    #[error("failed to decode pooled transaction {index}: {source}")]
    Decode {
        /// Position of the transaction in the pool answer.
        index: usize,
        /// Underlying error.
        #[source]
        source: Eip2718Error,
    },
    /// The bad-transaction filter could not read its simulation state.
    #[error("failed to filter transactions: {0}")]
    Filter(#[source] StateError),
    /// Applying transactions or finalizing the block failed.
    #[error(transparent)]
    Build(#[from] BlockBuildError),
    /// Persisting the state of the sealed block failed.
    #[error("failed to persist block {block_number}: {source}")]
    Persist {
        /// Block whose state was being persisted.
        block_number: u64,
        /// Underlying error.
        #[source]
        source: StateError,
    },
    /// Recording the stage progress failed.
    #[error("failed to save execution progress at block {block_number}: {source}")]
    SaveProgress {
        /// Block the progress was recorded for.
        block_number: u64,
        /// Underlying error.
        #[source]
        source: ProgressError,
    },
}
