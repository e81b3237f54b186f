#![cfg_attr(not(test), deny(missing_docs, clippy::missing_docs_in_private_items))]
#![cfg_attr(test, allow(missing_docs, clippy::missing_docs_in_private_items))]
//! Chain identity and hardfork schedule used while building blocks.
use std::sync::{Arc, LazyLock};

use crate::spec::KilnChainSpec;

pub use alloy_hardforks::{EthereumChainHardforks, EthereumHardfork, EthereumHardforks, ForkCondition};

/// Kiln-specific fork queries.
pub mod hardfork;
/// The chain specification type.
pub mod spec;

/// Chain id of the local development network.
pub const KILN_DEV_CHAIN_ID: u64 = 1337;

/// The development network spec, every fork up to Cancun active from genesis.
pub static KILN_DEV: LazyLock<Arc<KilnChainSpec>> = LazyLock::new(|| make_kiln_dev_chain_spec().into());

// Creates the [`KilnChainSpec`] for the development network from the bundled chain config.
fn make_kiln_dev_chain_spec() -> KilnChainSpec {
    KilnChainSpec::from_json(include_str!("genesis/dev.json"))
        .expect("Can't deserialize Kiln dev chain config")
}
