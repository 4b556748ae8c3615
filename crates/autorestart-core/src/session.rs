//! Host session snapshots and eligibility rules.
//!
//! The engine never holds host session objects. Hosts hand out
//! `SessionInfo` snapshots and accept commands keyed by `SlotId`.

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Slot a session occupies on the host (e.g. a player slot).
///
/// Slots are reused: a new session may take over the slot of one that left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(u32);

impl SlotId {
    pub const fn new(slot: u32) -> Self {
        Self(slot)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SlotId {
    fn from(slot: u32) -> Self {
        Self(slot)
    }
}

// ============================================================================
// Session State
// ============================================================================

/// Connection state reported by the host for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    NeverConnected,
    Connecting,
    Connected,
    Reconnecting,
    Disconnecting,
    Disconnected,
}

impl ConnectionState {
    /// Returns true for sessions that must be disconnected before shutdown.
    #[must_use]
    pub fn needs_disconnect(&self) -> bool {
        matches!(self, Self::Connected | Self::Connecting | Self::Reconnecting)
    }
}

/// Team membership of a session.
///
/// Only sessions on a playing team receive spawn-time notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    #[default]
    Unassigned,
    Spectator,
    Playing,
}

/// Point-in-time view of one host session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub slot: SlotId,

    /// Whether the host still considers the session object usable.
    pub valid: bool,

    /// Bot-controlled sessions are never notified or kicked.
    pub bot: bool,

    /// Broadcast relays and other observer-only identities.
    pub observer: bool,

    pub team: Team,

    pub connection: ConnectionState,
}

impl SessionInfo {
    /// Creates a valid, connected human session on the playing team.
    pub fn human(slot: u32) -> Self {
        Self {
            slot: SlotId::new(slot),
            valid: true,
            bot: false,
            observer: false,
            team: Team::Playing,
            connection: ConnectionState::Connected,
        }
    }

    /// Creates a connected bot session.
    pub fn bot(slot: u32) -> Self {
        Self {
            bot: true,
            ..Self::human(slot)
        }
    }

    /// Creates a connected observer (relay) session.
    pub fn observer(slot: u32) -> Self {
        Self {
            observer: true,
            team: Team::Spectator,
            ..Self::human(slot)
        }
    }

    #[must_use]
    pub fn with_team(mut self, team: Team) -> Self {
        self.team = team;
        self
    }

    #[must_use]
    pub fn with_connection(mut self, connection: ConnectionState) -> Self {
        self.connection = connection;
        self
    }

    /// A valid human session: counted by the gate, tracked and kicked.
    #[must_use]
    pub fn is_human(&self) -> bool {
        self.valid && !self.bot && !self.observer
    }

    /// Eligible for the opportunistic notification sent when it spawns.
    #[must_use]
    pub fn is_eligible_for_notification(&self) -> bool {
        self.is_human() && self.team == Team::Playing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_display() {
        assert_eq!(SlotId::new(7).to_string(), "7");
        assert_eq!(SlotId::from(3).get(), 3);
    }

    #[test]
    fn test_needs_disconnect() {
        assert!(ConnectionState::Connected.needs_disconnect());
        assert!(ConnectionState::Connecting.needs_disconnect());
        assert!(ConnectionState::Reconnecting.needs_disconnect());
        assert!(!ConnectionState::Disconnecting.needs_disconnect());
        assert!(!ConnectionState::Disconnected.needs_disconnect());
        assert!(!ConnectionState::NeverConnected.needs_disconnect());
    }

    #[test]
    fn test_human_eligibility() {
        let human = SessionInfo::human(1);
        assert!(human.is_human());
        assert!(human.is_eligible_for_notification());

        let spectator = SessionInfo::human(2).with_team(Team::Spectator);
        assert!(spectator.is_human());
        assert!(!spectator.is_eligible_for_notification());

        let unassigned = SessionInfo::human(3).with_team(Team::Unassigned);
        assert!(!unassigned.is_eligible_for_notification());
    }

    #[test]
    fn test_bots_and_observers_are_excluded() {
        assert!(!SessionInfo::bot(1).is_human());
        assert!(!SessionInfo::bot(1).is_eligible_for_notification());
        assert!(!SessionInfo::observer(2).is_human());

        let invalid = SessionInfo {
            valid: false,
            ..SessionInfo::human(3)
        };
        assert!(!invalid.is_human());
    }
}
