//! Kiln chain-spec wrapper type.
use alloy_genesis::ChainConfig;
use alloy_hardforks::{EthereumChainHardforks, EthereumHardfork, EthereumHardforks, ForkCondition};

use crate::hardfork::KilnHardforks;

/// A Kiln chain specification.
///
/// A chain specification describes:
///
/// - The chain id replay-protected transactions are bound to
/// - What hardforks are activated, and under which conditions
#[derive(Debug, Clone)]
pub struct KilnChainSpec {
    /// Chain id of the network.
    pub chain_id: u64,
    /// Hardfork activation schedule.
    pub hardforks: EthereumChainHardforks,
}

impl KilnChainSpec {
    /// Creates a spec for `chain_id` with an empty fork schedule (pre-Homestead rules).
    pub fn new(chain_id: u64) -> Self {
        let forks: [(EthereumHardfork, ForkCondition); 0] = [];
        Self { chain_id, hardforks: EthereumChainHardforks::new(forks) }
    }

    /// Returns the scheduled forks with their activation condition, in fork order.
    pub fn forks_iter(&self) -> impl Iterator<Item = (EthereumHardfork, ForkCondition)> + '_ {
        EthereumHardfork::VARIANTS.iter().filter_map(|fork| {
            let condition = self.hardforks.ethereum_fork_activation(*fork);
            (condition != ForkCondition::Never).then_some((*fork, condition))
        })
    }

    /// Parses the `config` object of a genesis file.
    pub fn from_json(chain_config: &str) -> Result<Self, serde_json::Error> {
        let config: ChainConfig = serde_json::from_str(chain_config)?;
        Ok(Self::from(&config))
    }

    /// Returns the spec with `fork` scheduled under `condition`.
    ///
    /// Replaces the condition `fork` was scheduled under, if any.
    pub fn with_fork(self, fork: EthereumHardfork, condition: ForkCondition) -> Self {
        let forks = self
            .forks_iter()
            .filter(|(known, _)| *known != fork)
            .chain(core::iter::once((fork, condition)))
            .collect::<Vec<_>>();
        Self { chain_id: self.chain_id, hardforks: EthereumChainHardforks::new(forks) }
    }
}

impl From<&ChainConfig> for KilnChainSpec {
    /// Maps the block and timestamp activations of a genesis chain config onto a fork schedule.
    fn from(config: &ChainConfig) -> Self {
        let mut forks = Vec::new();

        let block_forks = [
            (EthereumHardfork::Homestead, config.homestead_block),
            (EthereumHardfork::Tangerine, config.eip150_block),
            (EthereumHardfork::SpuriousDragon, config.eip155_block.or(config.eip158_block)),
            (EthereumHardfork::Byzantium, config.byzantium_block),
            (EthereumHardfork::Constantinople, config.constantinople_block),
            (EthereumHardfork::Petersburg, config.petersburg_block),
            (EthereumHardfork::Istanbul, config.istanbul_block),
            (EthereumHardfork::Berlin, config.berlin_block),
            (EthereumHardfork::London, config.london_block),
        ];
        forks.extend(
            block_forks
                .into_iter()
                .filter_map(|(fork, block)| Some((fork, ForkCondition::Block(block?)))),
        );

        if config.dao_fork_support
            && let Some(block) = config.dao_fork_block
        {
            forks.push((EthereumHardfork::Dao, ForkCondition::Block(block)));
        }

        let timestamp_forks = [
            (EthereumHardfork::Shanghai, config.shanghai_time),
            (EthereumHardfork::Cancun, config.cancun_time),
            (EthereumHardfork::Prague, config.prague_time),
        ];
        forks.extend(
            timestamp_forks
                .into_iter()
                .filter_map(|(fork, timestamp)| Some((fork, ForkCondition::Timestamp(timestamp?)))),
        );

        Self { chain_id: config.chain_id, hardforks: EthereumChainHardforks::new(forks) }
    }
}

impl EthereumHardforks for KilnChainSpec {
    /// Retrieves [`ForkCondition`] by an [`EthereumHardfork`]. If `fork` is not present, returns
    /// [`ForkCondition::Never`].
    fn ethereum_fork_activation(&self, fork: EthereumHardfork) -> ForkCondition {
        self.hardforks.ethereum_fork_activation(fork)
    }
}

impl KilnHardforks for KilnChainSpec {
    /// Chain id of the network.
    fn chain_id(&self) -> u64 {
        self.chain_id
    }
}
