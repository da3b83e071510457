//! Bounded polling for device operations that complete asynchronously.

use std::time::Duration;

use crate::error::{Error, Result};

/// Interval and iteration bound for a blocking device poll.
///
/// The default matches the historical 10 ms x 500 loop, giving a ceiling of
/// roughly five seconds before a wait is declared timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Sleep between poll attempts.
    pub interval: Duration,
    /// Maximum number of attempts before giving up.
    pub attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(10),
            attempts: 500,
        }
    }
}

impl PollConfig {
    pub fn new(interval: Duration, attempts: u32) -> Self {
        Self { interval, attempts }
    }
}

/// Repeatedly evaluate `check` until it yields a value or the bound elapses.
///
/// `check` returns `Ok(Some(v))` on completion, `Ok(None)` to keep waiting,
/// or an error to abort immediately. A device that never completes makes
/// this return [`Error::Timeout`] after `attempts` iterations; it never
/// hangs.
pub fn poll_until<T>(
    config: PollConfig,
    what: &'static str,
    mut check: impl FnMut() -> Result<Option<T>>,
) -> Result<T> {
    for attempt in 0..config.attempts {
        if let Some(value) = check()? {
            return Ok(value);
        }
        // Sleep after the check so a ready device costs no wait at all.
        if attempt + 1 < config.attempts {
            std::thread::sleep(config.interval);
        }
    }
    Err(Error::Timeout {
        what,
        attempts: config.attempts,
    })
}
