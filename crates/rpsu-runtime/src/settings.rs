//! Process-wide polling settings.
//!
//! The supervisor owns the only [`watch::Sender`][tokio::sync::watch::Sender];
//! every poller holds a receiver and reads the current value when it needs
//! it. A new interval therefore applies to the next sleep of each poller and
//! never shortens or stretches a sleep already in progress.

use std::time::Duration;

use rpsu_types::RpsuError;

/// Polling intervals an operator may choose, in minutes.
pub const ALLOWED_INTERVAL_MINUTES: [u64; 6] = [1, 5, 10, 15, 30, 60];

/// Interval used when nothing else is configured.
pub const DEFAULT_INTERVAL_MINUTES: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Full wait between the end of one cycle and the start of the next.
    pub interval: Duration,
    /// Also write the shifted journal.
    pub shifted_journal: bool,
}

impl PollSettings {
    pub fn new(interval: Duration, shifted_journal: bool) -> Self {
        Self {
            interval,
            shifted_journal,
        }
    }

    /// Settings from an operator-chosen interval.
    ///
    /// # Errors
    ///
    /// [`RpsuError::Config`] unless `minutes` is one of
    /// [`ALLOWED_INTERVAL_MINUTES`].
    pub fn from_minutes(minutes: u64, shifted_journal: bool) -> Result<Self, RpsuError> {
        Ok(Self::new(interval_from_minutes(minutes)?, shifted_journal))
    }

    /// The interval in whole minutes, rounded down.
    pub fn interval_minutes(&self) -> u64 {
        self.interval.as_secs() / 60
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_INTERVAL_MINUTES * 60), false)
    }
}

/// Validate an operator-chosen interval.
pub fn interval_from_minutes(minutes: u64) -> Result<Duration, RpsuError> {
    if ALLOWED_INTERVAL_MINUTES.contains(&minutes) {
        Ok(Duration::from_secs(minutes * 60))
    } else {
        Err(RpsuError::Config(format!(
            "polling interval must be one of {ALLOWED_INTERVAL_MINUTES:?} minutes, got {minutes}"
        )))
    }
}
