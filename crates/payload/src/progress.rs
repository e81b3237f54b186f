//! Stage progress bookkeeping.

use crate::error::ProgressError;

/// Where the execution stage records how far it got.
///
/// The mining-exec stage reads the watermark to ask the pool for transactions ready on top of it
/// and, once a block is built, records the block number so later stages do not run ahead of it.
#[auto_impl::auto_impl(&mut, Box)]
pub trait ProgressStore {
    /// Returns the last block processed by the execution stage.
    fn execution_progress(&self) -> Result<u64, ProgressError>;

    /// Records `block_number` as the execution stage progress.
    fn save_execution_progress(&mut self, block_number: u64) -> Result<(), ProgressError>;
}

/// A [`ProgressStore`] held in memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InMemoryProgress {
    /// Execution stage progress.
    execution: u64,
}

impl InMemoryProgress {
    /// Creates a store with `execution` as the current progress.
    pub const fn new(execution: u64) -> Self {
        Self { execution }
    }
}

impl ProgressStore for InMemoryProgress {
    fn execution_progress(&self) -> Result<u64, ProgressError> {
        Ok(self.execution)
    }

    fn save_execution_progress(&mut self, block_number: u64) -> Result<(), ProgressError> {
        self.execution = block_number;
        Ok(())
    }
}
