#![cfg_attr(not(test), deny(missing_docs, clippy::missing_docs_in_private_items))]
#![cfg_attr(test, allow(missing_docs, clippy::missing_docs_in_private_items))]
//! Block construction: the gas pool, transaction streams, the transaction applier, cooperative
//! cancellation and block finalization.

/// Transaction application loop and its owning builder.
pub mod builder;
/// Interrupt, quit signal and grace period handling.
pub mod cancel;
/// Error types and their classification.
pub mod error;
/// The execution engine trait.
pub mod executor;
/// Consensus engine trait, root computation and block sealing.
pub mod finalize;
/// Remaining-gas accounting.
pub mod gas_pool;
/// Cursors over the transactions of a batch.
pub mod stream;
/// Value-transfer executor, mock consensus engine and transaction helpers for tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use builder::{ApplyOutcome, BlockBuilder};
pub use cancel::{CancelCheck, CancellationController, Interrupt, QuitSignal};
pub use error::{BlockBuildError, ConsensusError, GasPoolError, TxExecutionError};
pub use executor::{TransactionExecutor, TxExecutionOutcome};
pub use finalize::{ConsensusEngine, FinalizeInput, FinalizeOutcome, finalize_block, seal_block};
pub use gas_pool::GasPool;
pub use stream::{FixedOrderTransactions, TransactionStream};
