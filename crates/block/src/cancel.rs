//! Cooperative cancellation of a building cycle.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicI32, Ordering},
    },
    time::{Duration, Instant},
};

use tracing::debug;

use crate::error::BlockBuildError;

/// Default time transactions keep being added after an interrupt.
pub const DEFAULT_INTERRUPT_GRACE_PERIOD: Duration = Duration::from_millis(500);

/// Stop request raised by whoever waits for the block, e.g. a `getPayload` call.
///
/// Zero means running, any other value means stop requested. The builder only reads the flag.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicI32>);

impl Interrupt {
    /// Creates a flag in the running state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the builder to wrap up.
    pub fn request_stop(&self) {
        self.0.store(1, Ordering::Release);
    }

    /// Returns `true` once a stop was requested.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire) != 0
    }
}

/// Process shutdown signal. Observing it aborts the cycle with [`BlockBuildError::Stopped`].
#[derive(Debug, Clone, Default)]
pub struct QuitSignal(Arc<AtomicBool>);

impl QuitSignal {
    /// Creates an unset signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals shutdown.
    pub fn quit(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns `true` once shutdown was signalled.
    pub fn is_quit(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Answer of [`CancellationController::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCheck {
    /// Keep going.
    Continue,
    /// The grace period after an interrupt elapsed, stop adding transactions.
    Expired,
}

/// Turns the interrupt flag and the quit signal into loop decisions.
///
/// The first poll that observes the interrupt starts a deadline `grace_period` ahead. Later polls
/// report [`CancelCheck::Expired`] once it has passed. The deadline lives as long as the
/// controller, one building cycle.
#[derive(Debug, Clone)]
pub struct CancellationController {
    /// Stop request of the block consumer.
    interrupt: Option<Interrupt>,
    /// Process shutdown signal.
    quit: Option<QuitSignal>,
    /// Time allowed between the interrupt and termination.
    grace_period: Duration,
    /// Deadline started by the first observed interrupt.
    deadline: Option<Instant>,
}

impl Default for CancellationController {
    fn default() -> Self {
        Self::new(DEFAULT_INTERRUPT_GRACE_PERIOD)
    }
}

impl CancellationController {
    /// Creates a controller that never cancels until signals are attached.
    pub const fn new(grace_period: Duration) -> Self {
        Self { interrupt: None, quit: None, grace_period, deadline: None }
    }

    /// Attaches the interrupt flag.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// Attaches the shutdown signal.
    pub fn with_quit(mut self, quit: QuitSignal) -> Self {
        self.quit = Some(quit);
        self
    }

    /// Returns the grace period.
    pub const fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Returns `true` once an interrupt was observed.
    pub const fn is_interrupted(&self) -> bool {
        self.deadline.is_some()
    }

    /// Checks the signals at a loop boundary.
    pub fn poll(&mut self) -> Result<CancelCheck, BlockBuildError> {
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Ok(CancelCheck::Expired);
        }

        if self.quit.as_ref().is_some_and(QuitSignal::is_quit) {
            return Err(BlockBuildError::Stopped);
        }

        if self.deadline.is_none() && self.interrupt.as_ref().is_some_and(Interrupt::is_set) {
            debug!(target: "tx_selection", grace_period = ?self.grace_period, "transaction adding was requested to stop");
            let deadline = Instant::now() + self.grace_period;
            self.deadline = Some(deadline);
            if self.grace_period.is_zero() {
                return Ok(CancelCheck::Expired);
            }
        }

        Ok(CancelCheck::Continue)
    }
}
