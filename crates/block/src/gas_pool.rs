//! Gas accounting for the block under construction.

use crate::error::GasPoolError;

/// Gas still available in the block.
///
/// The builder buys the full gas limit of a transaction before executing it and refunds what the
/// transaction did not use. A rejected attempt restores the value captured by
/// [`GasPool::snapshot`] so that no gas is charged for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GasPool {
    /// Remaining gas.
    gas: u64,
}

impl GasPool {
    /// Creates a pool holding `gas`.
    pub const fn new(gas: u64) -> Self {
        Self { gas }
    }

    /// Returns the remaining gas.
    pub const fn gas(&self) -> u64 {
        self.gas
    }

    /// Deducts `amount`, failing without change if the pool cannot cover it.
    pub const fn sub_gas(&mut self, amount: u64) -> Result<(), GasPoolError> {
        if self.gas < amount {
            return Err(GasPoolError::GasLimitReached { have: self.gas, want: amount });
        }
        self.gas -= amount;
        Ok(())
    }

    /// Returns `amount` to the pool.
    pub const fn add_gas(&mut self, amount: u64) {
        self.gas = self.gas.saturating_add(amount);
    }

    /// Captures the current value for a later [`GasPool::restore`].
    pub const fn snapshot(&self) -> u64 {
        self.gas
    }

    /// Resets the pool to a value captured by [`GasPool::snapshot`].
    pub const fn restore(&mut self, snapshot: u64) {
        self.gas = snapshot;
    }
}
