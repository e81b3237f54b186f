//! The execution engine seam.

use alloy_consensus::{Header, TxEnvelope, transaction::Recovered};
use alloy_primitives::Log;
use kiln_state::{IntraBlockState, StateProvider};

use crate::error::TxExecutionError;

/// Result of a transaction that was executed and may be included in the block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TxExecutionOutcome {
    /// Gas consumed, after refunds. Never above the transaction gas limit.
    pub gas_used: u64,
    /// Whether execution succeeded. A reverted transaction is still included.
    pub success: bool,
    /// Logs emitted during execution.
    pub logs: Vec<Log>,
}

/// Applies a single transaction to the block state.
///
/// Implementations validate the transaction against `state` (nonce, balance, intrinsic gas, fee
/// cap), run it and write its effects to `state`. The builder wraps every call in a checkpoint, so
/// an implementation may leave partial writes behind when it returns an error.
#[auto_impl::auto_impl(&, Arc)]
pub trait TransactionExecutor {
    /// Executes `tx` on top of `state` in the context of `header`.
    fn execute<P: StateProvider>(
        &self,
        header: &Header,
        tx: &Recovered<TxEnvelope>,
        state: &mut IntraBlockState<P>,
    ) -> Result<TxExecutionOutcome, TxExecutionError>;
}
