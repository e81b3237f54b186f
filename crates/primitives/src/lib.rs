#![cfg_attr(not(test), deny(missing_docs, clippy::missing_docs_in_private_items))]
#![cfg_attr(test, allow(missing_docs, clippy::missing_docs_in_private_items))]
//! Primitive types flowing through block construction: the candidate block under assembly, the
//! pool transactions it is fed with and the sealed result.

/// The mutable block aggregate under construction.
pub mod block;
/// The finalized, sealed block returned to callers.
pub mod built_block;
/// Receipt construction helpers.
pub mod receipt;
/// Sender-attributed pending transactions.
pub mod transaction;

pub use block::CandidateBlock;
pub use built_block::BuiltBlock;
pub use receipt::build_receipt;
pub use transaction::PendingTransaction;

/// Gas charged for the simplest possible transaction, a plain value transfer.
pub const MIN_TRANSACTION_GAS: u64 = 21_000;
