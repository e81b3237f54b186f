//! Configuration for the mining-exec stage.

use core::time::Duration;

use kiln_block::cancel::DEFAULT_INTERRUPT_GRACE_PERIOD;
use kiln_primitives::MIN_TRANSACTION_GAS;
use serde::{Deserialize, Serialize};

/// Default number of transactions requested from the pool per batch.
pub const DEFAULT_BATCH_SIZE: u16 = 50;
/// Default number of pool polls before proceeding with an incomplete answer.
pub const DEFAULT_MAX_POOL_POLLS: u32 = 1000;
/// Default pause between two incomplete pool answers.
pub const DEFAULT_POOL_POLL_INTERVAL: Duration = Duration::from_millis(1);
/// Default bound on fetch/apply rounds per block.
pub const DEFAULT_KILL_SWITCH: u32 = 1000;

/// Settings of the mining-exec stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MiningExecConfig {
    /// Maximum number of transactions requested from the pool per batch.
    pub batch_size: u16,
    /// Maximum number of pool polls per batch.
    ///
    /// The pool may answer before it finished indexing. The fetcher polls again until the pool
    /// reports a complete answer or this many polls were made, then proceeds with the last
    /// answer.
    pub max_pool_polls: u32,
    /// Pause between two incomplete pool answers.
    #[serde(with = "millis")]
    pub pool_poll_interval: Duration,
    /// Maximum number of fetch/apply rounds for one block.
    pub kill_switch: u32,
    /// Time transactions keep being added after an interrupt.
    #[serde(with = "millis")]
    pub interrupt_grace_period: Duration,
    /// Remaining gas below which no further transaction is attempted.
    pub min_tx_gas: u64,
    /// Whether transactions are applied at all. When disabled the stage seals an empty block.
    pub noempty: bool,
}

impl Default for MiningExecConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_pool_polls: DEFAULT_MAX_POOL_POLLS,
            pool_poll_interval: DEFAULT_POOL_POLL_INTERVAL,
            kill_switch: DEFAULT_KILL_SWITCH,
            interrupt_grace_period: DEFAULT_INTERRUPT_GRACE_PERIOD,
            min_tx_gas: MIN_TRANSACTION_GAS,
            noempty: true,
        }
    }
}

impl MiningExecConfig {
    /// Sets the batch size.
    pub const fn with_batch_size(mut self, batch_size: u16) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the poll ceiling.
    pub const fn with_max_pool_polls(mut self, max_pool_polls: u32) -> Self {
        self.max_pool_polls = max_pool_polls;
        self
    }

    /// Sets the pause between incomplete pool answers.
    pub const fn with_pool_poll_interval(mut self, interval: Duration) -> Self {
        self.pool_poll_interval = interval;
        self
    }

    /// Sets the kill switch.
    pub const fn with_kill_switch(mut self, kill_switch: u32) -> Self {
        self.kill_switch = kill_switch;
        self
    }

    /// Sets the interrupt grace period.
    pub const fn with_interrupt_grace_period(mut self, grace_period: Duration) -> Self {
        self.interrupt_grace_period = grace_period;
        self
    }

    /// Sets the admission threshold on remaining gas.
    pub const fn with_min_tx_gas(mut self, min_tx_gas: u64) -> Self {
        self.min_tx_gas = min_tx_gas;
        self
    }

    /// Enables or disables transaction application.
    pub const fn with_noempty(mut self, noempty: bool) -> Self {
        self.noempty = noempty;
        self
    }
}

/// (De)serializes a [`Duration`] as whole milliseconds.
mod millis {
    use core::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Writes `duration` as milliseconds.
    pub(super) fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis().try_into().unwrap_or(u64::MAX))
    }

    /// Reads milliseconds into a [`Duration`].
    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MiningExecConfig::default();

        assert_eq!(config.batch_size, 50);
        assert_eq!(config.max_pool_polls, 1000);
        assert_eq!(config.pool_poll_interval, Duration::from_millis(1));
        assert_eq!(config.kill_switch, 1000);
        assert_eq!(config.interrupt_grace_period, Duration::from_millis(500));
        assert_eq!(config.min_tx_gas, 21_000);
        assert!(config.noempty);
    }

    #[test]
    fn test_config_builder_pattern() {
        let config = MiningExecConfig::default()
            .with_batch_size(10)
            .with_kill_switch(3)
            .with_interrupt_grace_period(Duration::ZERO)
            .with_noempty(false);

        assert_eq!(config.batch_size, 10);
        assert_eq!(config.kill_switch, 3);
        assert_eq!(config.interrupt_grace_period, Duration::ZERO);
        assert!(!config.noempty);
        assert_eq!(config.max_pool_polls, DEFAULT_MAX_POOL_POLLS);
    }

    #[test]
    fn test_deserialize_fills_missing_fields() {
        let config: MiningExecConfig =
            serde_json::from_str(r#"{"batchSize": 25, "interruptGracePeriod": 250}"#).unwrap();

        assert_eq!(config.batch_size, 25);
        assert_eq!(config.interrupt_grace_period, Duration::from_millis(250));
        assert_eq!(config.pool_poll_interval, DEFAULT_POOL_POLL_INTERVAL);
        assert_eq!(config.kill_switch, DEFAULT_KILL_SWITCH);

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["poolPollInterval"], 1);
    }
}
