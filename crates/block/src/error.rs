//! Error types of transaction application and block finalization.

use alloy_primitives::{B256, U256};
use kiln_state::StateError;

/// Errors raised by the [`GasPool`](crate::gas_pool::GasPool).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GasPoolError {
    /// The pool cannot cover the requested gas.
    #[error("gas limit reached: have {have}, want {want}")]
    GasLimitReached {
        /// Gas left in the pool.
        have: u64,
        /// Gas requested.
        want: u64,
    },
}

/// Outcome classes of a failed transaction execution.
///
/// Every variant except [`TxExecutionError::State`] is local to the transaction: the builder
/// rolls it back and moves on. A state error means the storage engine failed and aborts the
/// building cycle.
#[derive(Debug, thiserror::Error)]
pub enum TxExecutionError {
    /// The transaction gas limit does not fit in the remaining block gas.
    #[error("gas limit reached: have {have}, want {want}")]
    GasLimitReached {
        /// Gas left in the block.
        have: u64,
        /// Gas limit of the transaction.
        want: u64,
    },
    /// The transaction nonce is below the account nonce.
    #[error("nonce too low: tx {tx}, state {state}")]
    NonceTooLow {
        /// Transaction nonce.
        tx: u64,
        /// Account nonce.
        state: u64,
    },
    /// The transaction nonce is above the account nonce.
    #[error("nonce too high: tx {tx}, state {state}")]
    NonceTooHigh {
        /// Transaction nonce.
        tx: u64,
        /// Account nonce.
        state: u64,
    },
    /// The transaction nonce is `u64::MAX` and cannot be incremented (EIP-2681).
    #[error("nonce has max value")]
    NonceMaxValue,
    /// The sender cannot pay for gas and value.
    #[error("insufficient funds for gas * price + value: have {have}, want {want}")]
    InsufficientFunds {
        /// Sender balance.
        have: U256,
        /// Upfront cost of the transaction.
        want: U256,
    },
    /// The gas limit is below the intrinsic gas of the transaction.
    #[error("intrinsic gas too low: have {have}, want {want}")]
    IntrinsicGasTooLow {
        /// Transaction gas limit.
        have: u64,
        /// Intrinsic gas.
        want: u64,
    },
    /// The maximum fee per gas is below the block base fee.
    #[error("max fee per gas {max_fee_per_gas} less than block base fee {base_fee}")]
    FeeCapTooLow {
        /// Maximum fee per gas of the transaction.
        max_fee_per_gas: u128,
        /// Base fee of the block.
        base_fee: u64,
    },
    /// Any other rule the transaction violates.
    #[error("invalid transaction: {0}")]
    Invalid(String),
    /// The storage engine failed while executing the transaction.
    #[error(transparent)]
    State(#[from] StateError),
}

impl TxExecutionError {
    /// Returns `true` if the error must abort the building cycle instead of skipping the
    /// transaction.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::State(_))
    }
}

impl From<GasPoolError> for TxExecutionError {
    /// Maps a pool shortage onto the execution error of the same name.
    fn from(err: GasPoolError) -> Self {
        match err {
            GasPoolError::GasLimitReached { have, want } => Self::GasLimitReached { have, want },
        }
    }
}

/// Errors returned by a [`ConsensusEngine`](crate::finalize::ConsensusEngine).
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    /// The engine rejected the block.
    #[error("consensus rule violated: {0}")]
    Rule(String),
    /// State access failed during pre or post processing.
    #[error(transparent)]
    State(#[from] StateError),
}

/// Fatal errors of a block building cycle.
#[derive(Debug, thiserror::Error)]
pub enum BlockBuildError {
    /// The process is shutting down.
    #[error("block building stopped")]
    Stopped,
    /// Executing a transaction hit a storage failure.
    #[error("failed to execute transaction {hash}: {source}")]
    Execution {
        /// Hash of the transaction being executed.
        hash: B256,
        /// Underlying error.
        #[source]
        source: TxExecutionError,
    },
    /// Pre-execution changes could not be applied.
    #[error("failed to apply pre-execution changes: {0}")]
    PreExecution(#[source] ConsensusError),
    /// The consensus engine could not finalize the block.
    #[error("failed to finalize block {number}: {source}")]
    Finalize {
        /// Number of the block being finalized.
        number: u64,
        /// Underlying error.
        #[source]
        source: ConsensusError,
    },
    /// State access failed outside of transaction execution.
    #[error(transparent)]
    State(#[from] StateError),
}
