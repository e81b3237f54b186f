use core::error::Error;

use alloy_primitives::Address;

/// Boxed error returned by a storage backend.
pub type BoxedStorageError = Box<dyn Error + Send + Sync>;

/// Errors raised while reading or persisting world state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// The backing provider failed to serve a read.
    #[error("state provider error: {0}")]
    Provider(#[source] BoxedStorageError),
    /// The storage engine failed to persist the block writes.
    #[error("failed to persist state for block {block_number}: {source}")]
    Write {
        /// Block whose writes were being persisted.
        block_number: u64,
        /// Underlying storage error.
        #[source]
        source: BoxedStorageError,
    },
    /// Incrementing the nonce would exceed `u64::MAX` (EIP-2681).
    #[error("nonce of {0} overflows")]
    NonceOverflow(Address),
}

impl StateError {
    /// Wraps a backend read failure.
    pub fn provider(err: impl Into<BoxedStorageError>) -> Self {
        Self::Provider(err.into())
    }

    /// Wraps a backend write failure for `block_number`.
    pub fn write(block_number: u64, err: impl Into<BoxedStorageError>) -> Self {
        Self::Write { block_number, source: err.into() }
    }
}
