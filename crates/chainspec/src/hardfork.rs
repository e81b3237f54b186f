//! Fork queries the block builder relies on, on top of [`EthereumHardforks`].
use alloy_hardforks::{EthereumHardfork, EthereumHardforks, ForkCondition};

/// Extends [`EthereumHardforks`] with the queries needed while assembling a block.
#[auto_impl::auto_impl(&, Arc)]
pub trait KilnHardforks: EthereumHardforks {
    /// Chain id that replay-protected transactions must carry.
    fn chain_id(&self) -> u64;

    /// Returns `true` if EIP-155 replay protection is active at `block_number`.
    ///
    /// Protected transactions must not be included before Spurious Dragon.
    fn is_replay_protection_active_at_block(&self, block_number: u64) -> bool {
        self.is_spurious_dragon_active_at_block(block_number)
    }

    /// Returns `true` if `block_number` is exactly the DAO fork block of a chain that supports it.
    fn is_dao_fork_block(&self, block_number: u64) -> bool {
        matches!(
            self.ethereum_fork_activation(EthereumHardfork::Dao),
            ForkCondition::Block(block) if block == block_number
        )
    }
}
