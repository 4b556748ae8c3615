//! User-facing message catalog and countdown formatting.

use std::time::Duration;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Format of the absolute restart timestamp embedded in notifications.
pub const RESTART_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Placeholder replaced by the relative countdown ("5 minutes").
pub const COUNTDOWN_PLACEHOLDER: &str = "{countdown}";

/// Placeholder replaced by the absolute restart timestamp.
pub const RESTART_AT_PLACEHOLDER: &str = "{restart_at}";

// ============================================================================
// Countdown
// ============================================================================

/// Display unit of a countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownUnit {
    Minutes,
    Seconds,
}

/// A countdown reduced to one whole number and a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    pub value: u64,
    pub unit: CountdownUnit,
}

impl Countdown {
    /// Minutes from one full minute upward, seconds below that. Both floor.
    pub fn from_remaining(remaining: Duration) -> Self {
        let seconds = remaining.as_secs();
        if seconds / 60 >= 1 {
            Self {
                value: seconds / 60,
                unit: CountdownUnit::Minutes,
            }
        } else {
            Self {
                value: seconds,
                unit: CountdownUnit::Seconds,
            }
        }
    }

    #[must_use]
    pub fn is_plural(&self) -> bool {
        self.value > 1
    }
}

// ============================================================================
// Message Catalog
// ============================================================================

/// Every string shown to session holders.
///
/// Loaded from the `[messages]` table of the configuration; missing entries
/// keep their English defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Messages {
    pub prefix: String,
    pub restart_notification: String,
    pub minute_label: String,
    pub second_label: String,
    pub plural_suffix: String,
    pub cannot_calculate: String,
    /// Sent right before sessions are disconnected for the restart.
    pub restart_imminent: String,
    pub kick_reason: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            prefix: "[AutoRestart]".to_string(),
            restart_notification:
                "The server will restart in {countdown}. Server will restart at {restart_at}."
                    .to_string(),
            minute_label: "minute".to_string(),
            second_label: "second".to_string(),
            plural_suffix: "s".to_string(),
            cannot_calculate: "Unable to calculate the time of the next server restart."
                .to_string(),
            restart_imminent: "The server is restarting now.".to_string(),
            kick_reason: "Due to server restart, the server is now restarting.".to_string(),
        }
    }
}

impl Messages {
    /// Renders a countdown such as "1 minute" or "59 seconds".
    pub fn countdown(&self, countdown: Countdown) -> String {
        let label = match countdown.unit {
            CountdownUnit::Minutes => &self.minute_label,
            CountdownUnit::Seconds => &self.second_label,
        };
        let suffix = if countdown.is_plural() {
            self.plural_suffix.as_str()
        } else {
            ""
        };
        format!("{} {label}{suffix}", countdown.value)
    }

    /// Composes the advance-warning message for one session.
    pub fn restart_notification(&self, remaining: Duration, restart_at: NaiveDateTime) -> String {
        let body = self
            .restart_notification
            .replace(
                COUNTDOWN_PLACEHOLDER,
                &self.countdown(Countdown::from_remaining(remaining)),
            )
            .replace(
                RESTART_AT_PLACEHOLDER,
                &restart_at.format(RESTART_AT_FORMAT).to_string(),
            );
        self.with_prefix(&body)
    }

    /// Message sent instead of a notification when no countdown exists.
    pub fn cannot_calculate(&self) -> String {
        self.with_prefix(&self.cannot_calculate)
    }

    /// Final warning sent just before the kick.
    pub fn restart_imminent(&self) -> String {
        self.with_prefix(&self.restart_imminent)
    }

    fn with_prefix(&self, body: &str) -> String {
        if self.prefix.is_empty() {
            body.to_string()
        } else {
            format!("{} {body}", self.prefix)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn render(seconds: u64) -> String {
        Messages::default().countdown(Countdown::from_remaining(Duration::from_secs(seconds)))
    }

    #[test]
    fn test_countdown_units() {
        assert_eq!(render(1), "1 second");
        assert_eq!(render(59), "59 seconds");
        assert_eq!(render(60), "1 minute");
        assert_eq!(render(119), "1 minute");
        assert_eq!(render(120), "2 minutes");
        assert_eq!(render(3600), "60 minutes");
    }

    #[test]
    fn test_countdown_zero_is_singular() {
        assert_eq!(render(0), "0 second");
    }

    #[test]
    fn test_countdown_floors_fractions() {
        let c = Countdown::from_remaining(Duration::from_millis(59_900));
        assert_eq!(
            c,
            Countdown {
                value: 59,
                unit: CountdownUnit::Seconds
            }
        );
    }

    #[test]
    fn test_restart_notification_embeds_both_times() {
        let restart_at = NaiveDate::from_ymd_opt(2026, 10, 17)
            .unwrap()
            .and_hms_opt(3, 50, 0)
            .unwrap();
        let msg = Messages::default().restart_notification(Duration::from_secs(300), restart_at);
        assert_eq!(
            msg,
            "[AutoRestart] The server will restart in 5 minutes. Server will restart at 2026-10-17 03:50:00."
        );
    }

    #[test]
    fn test_custom_catalog() {
        let messages = Messages {
            prefix: String::new(),
            restart_notification: "Neustart in {countdown}".to_string(),
            minute_label: "Minute".to_string(),
            plural_suffix: "n".to_string(),
            ..Messages::default()
        };
        let restart_at = NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(
            messages.restart_notification(Duration::from_secs(180), restart_at),
            "Neustart in 3 Minuten"
        );
    }

    #[test]
    fn test_restart_imminent() {
        assert_eq!(
            Messages::default().restart_imminent(),
            "[AutoRestart] The server is restarting now."
        );

        let messages = Messages {
            prefix: "[Wartung]".to_string(),
            restart_imminent: "Neustart jetzt.".to_string(),
            ..Messages::default()
        };
        assert_eq!(messages.restart_imminent(), "[Wartung] Neustart jetzt.");
    }

    #[test]
    fn test_cannot_calculate_is_prefixed() {
        assert_eq!(
            Messages::default().cannot_calculate(),
            "[AutoRestart] Unable to calculate the time of the next server restart."
        );
    }
}
