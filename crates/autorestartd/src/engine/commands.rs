//! Engine actor commands, errors, and events.
//!
//! This module defines the message types for communicating with the `EngineActor`:
//! - `EngineCommand`: host callbacks and queries sent to the actor
//! - `EngineError`: errors returned through the `EngineHandle`
//! - `EngineEvent`: events published by the engine for subscribers
//!
//! All types are designed for async message passing and follow the panic-free policy.

use chrono::NaiveDateTime;
use thiserror::Error;
use tokio::sync::oneshot;

use autorestart_core::{DomainError, RestartConfig, SlotId};

use crate::sequencer::{SequencerPhase, TerminateCause};

// ============================================================================
// Engine Commands
// ============================================================================

/// Commands sent to the engine actor.
///
/// Host lifecycle callbacks are fire-and-forget; queries and reconfiguration
/// carry a oneshot channel for the response.
#[derive(Debug)]
pub enum EngineCommand {
    /// A session connected to the host.
    SessionJoined { slot: SlotId },

    /// A session disconnected from the host.
    SessionLeft { slot: SlotId },

    /// A session spawned into the game. Triggers the one-per-epoch warning.
    SessionSpawned { slot: SlotId },

    /// A new epoch (map/level) finished loading.
    EpochStarted { name: String },

    /// The current epoch ended; the next one is loading.
    EpochEnded,

    /// The host entered or left hibernation.
    HibernationChanged { hibernating: bool },

    /// Replace the configuration.
    ///
    /// The countdown is recomputed only if the restart time or the
    /// notification flag changed.
    ReloadConfig {
        /// New configuration (boxed for size optimization)
        config: Box<RestartConfig>,
        respond_to: oneshot::Sender<ReloadReport>,
    },

    /// Recompute and re-arm the countdown from the current configuration.
    Reschedule {
        respond_to: oneshot::Sender<Result<NaiveDateTime, DomainError>>,
    },

    /// Get a snapshot of the engine state.
    GetStatus {
        respond_to: oneshot::Sender<EngineStatus>,
    },

    /// Cancel the countdown and stop the actor.
    Unload { respond_to: oneshot::Sender<()> },
}

/// Outcome of a configuration reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadReport {
    /// The countdown was recomputed.
    pub rescheduled: bool,

    /// The new configuration carries an older `config_version`.
    pub version_downgrade: bool,

    /// When the armed countdown fires, if one is armed.
    pub next_restart: Option<NaiveDateTime>,
}

/// Point-in-time view of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    pub phase: SequencerPhase,
    pub pending_restart: bool,
    pub epoch_loading: bool,
    pub epoch_name: Option<String>,
    pub hibernating: bool,
    pub next_restart: Option<NaiveDateTime>,
    pub config_version: u32,
    /// Tracked sessions of the current epoch and whether each was notified.
    pub notified: Vec<(SlotId, bool)>,
}

impl EngineStatus {
    /// Notified flag of one session; `None` if it is not tracked.
    pub fn notified(&self, slot: SlotId) -> Option<bool> {
        self.notified
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, notified)| *notified)
    }
}

// ============================================================================
// Engine Errors
// ============================================================================

/// Errors returned by `EngineHandle` operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The actor has stopped and no longer accepts commands.
    #[error("engine channel closed")]
    ChannelClosed,

    /// The countdown could not be computed from the configuration.
    #[error(transparent)]
    Schedule(#[from] DomainError),
}

// ============================================================================
// Engine Events
// ============================================================================

/// Events published by the engine to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The shutdown sequencer moved to another phase.
    PhaseChanged {
        from: SequencerPhase,
        to: SequencerPhase,
    },

    /// A countdown was armed.
    RestartScheduled { at: NaiveDateTime },

    /// No countdown could be armed; restarts are suspended.
    ScheduleSuspended { reason: DomainError },

    /// A session received a restart warning.
    SessionNotified { slot: SlotId },

    /// A session was disconnected for the restart.
    SessionKicked { slot: SlotId },

    /// The terminate primitive was invoked.
    Terminated { cause: TerminateCause },

    /// A terminate request found no pending restart.
    TerminateSkipped { cause: TerminateCause },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_display() {
        assert_eq!(EngineError::ChannelClosed.to_string(), "engine channel closed");

        let err = EngineError::from(DomainError::InvalidRestartTime {
            value: "25:99".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Invalid restart time format: 25:99 (expected HH:MM)"
        );
    }

    #[test]
    fn test_status_notified_lookup() {
        let status = EngineStatus {
            phase: SequencerPhase::Idle,
            pending_restart: false,
            epoch_loading: false,
            epoch_name: None,
            hibernating: false,
            next_restart: None,
            config_version: 1,
            notified: vec![(SlotId::new(1), true), (SlotId::new(2), false)],
        };
        assert_eq!(status.notified(SlotId::new(1)), Some(true));
        assert_eq!(status.notified(SlotId::new(2)), Some(false));
        assert_eq!(status.notified(SlotId::new(3)), None);
    }
}
