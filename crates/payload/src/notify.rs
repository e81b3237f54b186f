//! Pending logs notification.

use alloy_primitives::Log;
use tracing::debug;

/// Receives the logs of a freshly built block, e.g. to feed `eth_subscribe` pending-log filters.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait PendingLogsNotifier {
    /// Delivers one batch of logs. Fire and forget.
    fn on_new_pending_logs(&self, logs: &[Log]);
}

/// Hands `logs` to `notifier` as a single batch.
///
/// Does nothing for an empty batch or when no notifier is configured.
pub fn notify_pending_logs<N: PendingLogsNotifier + ?Sized>(notifier: Option<&N>, logs: &[Log]) {
    if logs.is_empty() {
        return;
    }
    let Some(notifier) = notifier else {
        debug!(target: "payload_builder", logs = logs.len(), "no pending logs notifier set, skipping notification");
        return;
    };
    notifier.on_new_pending_logs(logs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, LogData};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<usize>>);

    impl PendingLogsNotifier for Recorder {
        fn on_new_pending_logs(&self, logs: &[Log]) {
            self.0.lock().unwrap().push(logs.len());
        }
    }

    fn log() -> Log {
        Log { address: Address::repeat_byte(1), data: LogData::default() }
    }

    #[test]
    fn test_notifies_once_per_batch() {
        let recorder = Recorder::default();

        notify_pending_logs(Some(&recorder), &[log(), log()]);
        notify_pending_logs(Some(&recorder), &[]);
        notify_pending_logs(None::<&Recorder>, &[log()]);

        assert_eq!(*recorder.0.lock().unwrap(), vec![2]);
    }
}
