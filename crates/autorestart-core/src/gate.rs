//! Population-based admission policy for disruptive restarts.

use serde::{Deserialize, Serialize};

/// Decides whether a disruptive shutdown may proceed right now.
///
/// The gate is permissive-biased: a low absolute population admits the
/// shutdown even when the percentage threshold alone would not.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RestartGate {
    /// Populations at or below this count always admit a shutdown.
    pub min_sessions_instant_shutdown: i32,

    /// Populations whose fill ratio is below this fraction admit a shutdown.
    pub min_session_percentage_shutdown_allowed: f32,
}

impl RestartGate {
    pub fn new(min_sessions_instant_shutdown: i32, min_session_percentage_shutdown_allowed: f32) -> Self {
        Self {
            min_sessions_instant_shutdown,
            min_session_percentage_shutdown_allowed,
        }
    }

    /// Returns true when shutdown is admitted for `active` sessions out of
    /// `capacity` slots.
    ///
    /// A capacity of zero reports a fill ratio of zero.
    pub fn admit_shutdown(&self, active: usize, capacity: u32) -> bool {
        let ratio = if capacity == 0 {
            0.0
        } else {
            active as f32 / capacity as f32
        };

        let instant = i64::from(self.min_sessions_instant_shutdown) >= active as i64;

        ratio < self.min_session_percentage_shutdown_allowed || instant
    }
}

/// Resolves the capacity used by the gate.
///
/// The host-reported visible capacity wins; a negative value (the `-1`
/// "unset" sentinel) falls back to the configured maximum.
pub fn effective_capacity(visible_capacity: i32, max_capacity: u32) -> u32 {
    u32::try_from(visible_capacity).unwrap_or(max_capacity)
}
