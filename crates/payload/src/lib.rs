#![cfg_attr(not(test), deny(missing_docs, clippy::missing_docs_in_private_items))]
#![cfg_attr(test, allow(missing_docs, clippy::missing_docs_in_private_items))]
//! The mining-exec stage: fetches transaction batches from the pool, screens them and drives the
//! block builder until the block is full, the pool is drained or the builder is interrupted.

/// Stage settings.
pub mod config;
/// Error types of the stage and its collaborators.
pub mod error;
/// Batch fetching from the transaction pool.
pub mod fetch;
/// Speculative screening of fetched transactions.
pub mod filter;
/// Pending logs notification.
pub mod notify;
/// The transaction pool interface.
pub mod pool;
/// Stage progress bookkeeping.
pub mod progress;
/// The fetch/apply/finalize cycle.
pub mod stage;

pub use config::MiningExecConfig;
pub use error::{MiningError, PoolError, ProgressError};
pub use fetch::fetch_next_transactions;
pub use filter::{BadTransactionFilter, FilterContext, FilterStats, NoopFilter, TransactionFilter};
pub use notify::{PendingLogsNotifier, notify_pending_logs};
pub use pool::{BestReady, PooledTransaction, TransactionPool};
pub use progress::{InMemoryProgress, ProgressStore};
pub use stage::{MiningExecStage, SharedNotifier};
