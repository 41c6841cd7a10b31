// In: src/pipeline/backoff.rs

//! Bounded exponential backoff for transient transport conditions.

use std::thread;
use std::time::Duration;

use crate::config::BackoffConfig;
use crate::transport::TransportError;

/// A retry streak this long is reported once at `warn` level.
const WARN_AFTER_ATTEMPTS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    attempts: u64,
}

impl Backoff {
    pub fn new(config: &BackoffConfig) -> Self {
        let initial = Duration::from_micros(config.initial_us);
        Self {
            initial,
            max: Duration::from_micros(config.max_us),
            current: initial,
            attempts: 0,
        }
    }

    /// Sleeps for the current delay, then doubles it up to the ceiling.
    /// A zero delay yields the thread instead.
    pub fn snooze(&mut self) {
        self.attempts += 1;
        if self.current.is_zero() {
            thread::yield_now();
        } else {
            thread::sleep(self.current);
        }
        self.current = self.current.saturating_mul(2).min(self.max);
    }

    /// Starts a new streak.
    pub fn reset(&mut self) {
        self.current = self.initial;
        self.attempts = 0;
    }

    /// Snoozes taken since the last `reset`.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn current_delay(&self) -> Duration {
        self.current
    }
}

/// Runs `op` until it returns something other than a transient error.
///
/// The backoff is reset first, so `backoff.attempts()` afterwards is the number
/// of retries this call needed.
pub fn retry_transient<T, F>(backoff: &mut Backoff, what: &str, mut op: F) -> Result<T, TransportError>
where
    F: FnMut() -> Result<T, TransportError>,
{
    backoff.reset();
    loop {
        match op() {
            Err(err) if err.is_transient() => {
                if backoff.attempts() + 1 == WARN_AFTER_ATTEMPTS {
                    log::warn!("{} still reports '{}' after {} attempts", what, err, WARN_AFTER_ATTEMPTS);
                }
                backoff.snooze();
            }
            other => return other,
        }
    }
}
