//! Restart time-of-day parsing and countdown calculation.
//!
//! All calculations use local wall-clock time as a `NaiveDateTime`. Daylight
//! saving transitions are not modelled: a day is always 24 hours.

use std::fmt;
use std::time::Duration;

use chrono::{NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

// ============================================================================
// Restart Time
// ============================================================================

/// A validated daily restart time (hour and minute, 24-hour clock).
///
/// Seconds are always zero; `"03:50:30"` is accepted but treated as `03:50`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RestartTime(NaiveTime);

impl RestartTime {
    /// Creates a restart time from an hour and minute.
    pub fn new(hour: u32, minute: u32) -> DomainResult<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(Self)
            .ok_or_else(|| DomainError::InvalidRestartTime {
                value: format!("{hour:02}:{minute:02}"),
            })
    }

    /// Parses `"HH:MM"` (or `"HH:MM:SS"`) into a restart time.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidRestartTime` for anything that is not a
    /// valid 24-hour time, e.g. `"25:99"` or `"noon"`.
    pub fn parse(value: &str) -> DomainResult<Self> {
        let trimmed = value.trim();
        let invalid = || DomainError::InvalidRestartTime {
            value: value.to_string(),
        };

        let parsed = NaiveTime::parse_from_str(trimmed, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
            .map_err(|_| invalid())?;

        Self::new(parsed.hour(), parsed.minute()).map_err(|_| invalid())
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    pub fn as_naive_time(&self) -> NaiveTime {
        self.0
    }
}

impl fmt::Display for RestartTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl TryFrom<String> for RestartTime {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RestartTime> for String {
    fn from(time: RestartTime) -> Self {
        time.to_string()
    }
}

// ============================================================================
// Time Calculator
// ============================================================================

/// Converts wall-clock time into the countdown until the next daily restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeCalculator {
    restart_time: RestartTime,
}

impl TimeCalculator {
    pub fn new(restart_time: RestartTime) -> Self {
        Self { restart_time }
    }

    /// Builds a calculator from the raw configuration value.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidRestartTime` when the value cannot be
    /// parsed. No countdown can be computed in that case.
    pub fn from_config_value(value: &str) -> DomainResult<Self> {
        RestartTime::parse(value).map(Self::new)
    }

    pub fn restart_time(&self) -> RestartTime {
        self.restart_time
    }

    /// Returns the next moment the restart time occurs, strictly after `now`.
    ///
    /// Today's occurrence is used while `now` is before it; once `now` is at
    /// or past it, the occurrence moves to tomorrow.
    pub fn next_occurrence(&self, now: NaiveDateTime) -> NaiveDateTime {
        let candidate = now.date().and_time(self.restart_time.as_naive_time());
        if now >= candidate {
            candidate + chrono::Duration::days(1)
        } else {
            candidate
        }
    }

    /// Returns the time remaining until the next occurrence.
    ///
    /// The result is always positive and never longer than one day.
    pub fn until_next(&self, now: NaiveDateTime) -> Duration {
        (self.next_occurrence(now) - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}
