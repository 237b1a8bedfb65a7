//! Periodic reconnection.
//!
//! While the controller is active, every tick reopens closed devices and
//! flushes pending writes on ready ones. The scheduler calls
//! [`BlindsController::tick`] at a fixed interval until it is cancelled.
//!
//! A panic inside one tick is caught and logged; the schedule keeps going.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::controller::BlindsController;
use crate::error::{Error, Result};

/// Default delay between reconnection ticks.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(3000);

/// Options for the reconnection scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectOptions {
    /// Delay before the first tick and between subsequent ticks.
    pub interval: Duration,
}

impl Default for ReconnectOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RECONNECT_INTERVAL,
        }
    }
}

impl ReconnectOptions {
    /// Create new reconnect options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create options with a fixed interval.
    pub fn fixed_interval(interval: Duration) -> Self {
        Self { interval }
    }

    /// Set the tick interval.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::InvalidConfig("interval must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Spawn the reconnection loop for `controller`.
///
/// The first tick fires one interval after the call. Ticks on an inactive
/// controller are no-ops, so the task can be started once and left running
/// across activate/passivate cycles.
pub fn spawn_reconnect_task(
    controller: BlindsController,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    let period = controller.config().reconnect.interval;

    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    info!("Reconnect scheduler cancelled, shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    debug!("Reconnect tick");
                    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| controller.tick())) {
                        error!("Reconnect tick panicked: {}", panic_message(panic.as_ref()));
                    }
                }
            }
        }
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_options_default() {
        let opts = ReconnectOptions::default();
        assert_eq!(opts.interval, Duration::from_millis(3000));
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_reconnect_options_builder() {
        let opts = ReconnectOptions::new().interval(Duration::from_millis(250));
        assert_eq!(opts, ReconnectOptions::fixed_interval(Duration::from_millis(250)));
    }

    #[test]
    fn test_reconnect_options_rejects_zero_interval() {
        let opts = ReconnectOptions::fixed_interval(Duration::ZERO);
        assert!(matches!(opts.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");

        let boxed: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic payload");
    }
}
