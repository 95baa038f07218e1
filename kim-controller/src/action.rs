use std::time::Duration;

use crate::config::ControllerConfig;
use crate::error::Error;

/// What the runtime should do with a key after a reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action {
    requeue_after: Option<Duration>,
}

impl Action {
    /// Reconcile the key again after `duration`.
    pub fn requeue(duration: Duration) -> Self {
        Self {
            requeue_after: Some(duration),
        }
    }

    /// Wait for the next change event (or the periodic resync).
    pub fn await_change() -> Self {
        Self {
            requeue_after: None,
        }
    }

    pub fn requeue_after(&self) -> Option<Duration> {
        self.requeue_after
    }
}

/// Exponential backoff: `requeue_base * 2^(failures - 1)`, capped at
/// `requeue_max`.
pub fn backoff(config: &ControllerConfig, failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(20);
    config
        .requeue_base
        .saturating_mul(1u32 << exponent)
        .min(config.requeue_max)
}

/// Requeue policy for a failed reconcile.
///
/// Retryable failures back off exponentially. Invalid specs are retried at
/// the slowest rate only; the watch event for the corrected spec is what
/// normally fixes them.
pub fn error_policy(error: &Error, failures: u32, config: &ControllerConfig) -> Action {
    if error.is_retryable() {
        Action::requeue(backoff(config, failures))
    } else {
        Action::requeue(config.requeue_max)
    }
}
