//! Shutdown sequencing state machine.
//!
//! ```text
//! Idle ──setup──▶ CountdownArmed ──fire──▶ Triggered ──▶ NotifyPending ──▶ Kicking
//!  ▲                                           │                             │
//!  │                                           └─────────────────────────────┤
//!  └────────────── terminate (flag still set) ◀── Terminating ◀──────────────┘
//! ```
//!
//! The pending-restart flag is set on every trigger that gets past the
//! countdown recomputation and is cleared only right after the terminate
//! primitive ran. Whoever reaches `terminate` second finds the flag clear and
//! does nothing.

use std::fmt;
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use autorestart_core::{DomainError, RestartConfig, SessionInfo};

use crate::dispatch::NotificationDispatcher;
use crate::engine::EngineEvent;
use crate::host::Host;
use crate::registry::SessionRegistry;

/// Delay between disconnecting sessions and terminating the service.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(1);

/// How early the countdown may fire before it is considered clock drift.
pub const DRIFT_TOLERANCE: Duration = Duration::from_secs(5);

/// Phase of the restart cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequencerPhase {
    #[default]
    Idle,
    CountdownArmed,
    Triggered,
    NotifyPending,
    Kicking,
    Terminating,
}

impl SequencerPhase {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CountdownArmed => "countdown_armed",
            Self::Triggered => "triggered",
            Self::NotifyPending => "notify_pending",
            Self::Kicking => "kicking",
            Self::Terminating => "terminating",
        }
    }
}

impl fmt::Display for SequencerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why the terminate primitive was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateCause {
    /// Grace delay after kicking elapsed.
    Scheduled,
    /// An epoch ended while a restart was pending.
    EpochBoundary,
}

impl fmt::Display for TerminateCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::EpochBoundary => write!(f, "epoch boundary"),
        }
    }
}

/// Result of a countdown trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The countdown could not be recomputed; no restart happens.
    Aborted(DomainError),
    /// The countdown fired well before the restart time; arm it again.
    Rearm { remaining: Duration },
    /// Sessions were kicked; terminate after the delay.
    Terminating { after: Duration },
}

/// Everything a trigger needs besides the sequencer itself.
pub struct SequencerContext<'a, H: Host> {
    pub host: &'a mut H,
    pub registry: &'a mut SessionRegistry,
    pub config: &'a RestartConfig,
    pub now: NaiveDateTime,
    /// Wall-clock time the fired countdown was armed for.
    pub target: NaiveDateTime,
    pub events: &'a broadcast::Sender<EngineEvent>,
}

/// Owns the restart phase and the pending-restart flag.
#[derive(Debug, Default)]
pub struct ShutdownSequencer {
    phase: SequencerPhase,
    pending_restart: bool,
}

impl ShutdownSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SequencerPhase {
        self.phase
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending_restart
    }

    /// A countdown was armed. In-flight shutdowns keep their phase.
    pub fn countdown_armed(&mut self, events: &broadcast::Sender<EngineEvent>) {
        if matches!(self.phase, SequencerPhase::Idle) {
            self.transition(SequencerPhase::CountdownArmed, events);
        }
    }

    /// The countdown was cancelled without firing.
    pub fn countdown_disarmed(&mut self, events: &broadcast::Sender<EngineEvent>) {
        if matches!(self.phase, SequencerPhase::CountdownArmed) {
            self.transition(SequencerPhase::Idle, events);
        }
    }

    /// Runs one restart cycle up to the terminate delay.
    ///
    /// Sessions are pre-notified only when the population gate is closed or
    /// an epoch is loading; the restart itself proceeds regardless of the
    /// gate.
    pub fn trigger<H: Host>(&mut self, ctx: SequencerContext<'_, H>) -> TriggerOutcome {
        let SequencerContext {
            host,
            registry,
            config,
            now,
            target,
            events,
        } = ctx;

        info!(at = %now, "Restart timer triggered, checking conditions for restart");
        self.transition(SequencerPhase::Triggered, events);

        if let Err(e) = config.calculator() {
            warn!(error = %e, "Cannot recompute restart countdown, aborting restart");
            self.transition(SequencerPhase::Idle, events);
            return TriggerOutcome::Aborted(e);
        }

        // Firing late (suspended host, clock moved forward) still restarts
        let remaining = (target - now).to_std().unwrap_or(Duration::ZERO);
        if remaining > DRIFT_TOLERANCE {
            warn!(
                target = %target,
                remaining_secs = remaining.as_secs(),
                "Restart timer fired early, re-arming"
            );
            self.transition(SequencerPhase::Idle, events);
            return TriggerOutcome::Rearm { remaining };
        }

        let sessions: Vec<SessionInfo> = host
            .sessions()
            .into_iter()
            .filter(SessionInfo::is_human)
            .collect();
        let capacity = host.capacity();
        let admitted = config.gate().admit_shutdown(sessions.len(), capacity);
        let loading = registry.epoch_loading();

        debug!(
            active = sessions.len(),
            capacity,
            admitted,
            loading,
            "Evaluated restart gate"
        );

        if config.notify_before_restart && !sessions.is_empty() && (loading || !admitted) {
            self.transition(SequencerPhase::NotifyPending, events);
            let dispatcher = NotificationDispatcher::new(&config.messages);
            for slot in dispatcher.notify_all(host, registry, &sessions, None, now) {
                let _ = events.send(EngineEvent::SessionNotified { slot });
            }
        }

        self.pending_restart = true;
        self.transition(SequencerPhase::Kicking, events);

        for session in sessions.iter().filter(|s| s.connection.needs_disconnect()) {
            host.disconnect(session.slot, &config.messages.kick_reason);
            let _ = events.send(EngineEvent::SessionKicked {
                slot: session.slot,
            });
        }

        self.transition(SequencerPhase::Terminating, events);
        TriggerOutcome::Terminating {
            after: TERMINATE_GRACE,
        }
    }

    /// Invokes the terminate primitive if a restart is still pending.
    ///
    /// Returns true if the primitive was invoked.
    pub fn terminate<H: Host>(
        &mut self,
        host: &mut H,
        cause: TerminateCause,
        events: &broadcast::Sender<EngineEvent>,
    ) -> bool {
        if !self.pending_restart {
            debug!(cause = %cause, "No restart pending, skipping terminate");
            let _ = events.send(EngineEvent::TerminateSkipped { cause });
            return false;
        }

        info!(cause = %cause, "Server shutdown initiated");
        host.terminate();
        self.pending_restart = false;
        let _ = events.send(EngineEvent::Terminated { cause });
        self.transition(SequencerPhase::Idle, events);
        true
    }

    fn transition(&mut self, to: SequencerPhase, events: &broadcast::Sender<EngineEvent>) {
        if self.phase == to {
            return;
        }
        let from = self.phase;
        self.phase = to;
        debug!(from = %from, to = %to, "Sequencer phase changed");
        let _ = events.send(EngineEvent::PhaseChanged { from, to });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use autorestart_core::{ConnectionState, SlotId, Team};
    use chrono::NaiveDate;

    fn at(hour: u32, minute: u32, second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 16)
            .unwrap()
            .and_hms_opt(hour, minute, second)
            .unwrap()
    }

    fn phases(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<SequencerPhase> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let EngineEvent::PhaseChanged { to, .. } = event {
                out.push(to);
            }
        }
        out
    }

    struct Fixture {
        host: MemoryHost,
        registry: SessionRegistry,
        config: RestartConfig,
        events: broadcast::Sender<EngineEvent>,
        rx: broadcast::Receiver<EngineEvent>,
        sequencer: ShutdownSequencer,
    }

    impl Fixture {
        fn new(max_capacity: u32) -> Self {
            let (events, rx) = broadcast::channel(64);
            let mut sequencer = ShutdownSequencer::new();
            sequencer.countdown_armed(&events);
            Self {
                host: MemoryHost::new(max_capacity),
                registry: SessionRegistry::new(),
                config: RestartConfig::default(),
                events,
                rx,
                sequencer,
            }
        }

        fn join(&mut self, session: SessionInfo) {
            self.registry.on_session_join(&session);
            self.host.add_session(session);
        }

        /// Fires the countdown armed for today's 03:50.
        fn trigger(&mut self, now: NaiveDateTime) -> TriggerOutcome {
            let ctx = SequencerContext {
                host: &mut self.host,
                registry: &mut self.registry,
                config: &self.config,
                now,
                target: at(3, 50, 0),
                events: &self.events,
            };
            self.sequencer.trigger(ctx)
        }
    }

    #[test]
    fn test_full_cycle_on_busy_server_notifies_then_kicks() {
        let mut f = Fixture::new(4);
        for slot in 0..3 {
            f.join(SessionInfo::human(slot));
        }

        let outcome = f.trigger(at(3, 50, 0));

        assert_eq!(outcome, TriggerOutcome::Terminating { after: TERMINATE_GRACE });
        assert!(f.sequencer.is_pending());
        assert_eq!(f.host.messages().len(), 3);
        assert_eq!(f.host.disconnects().len(), 3);
        assert!(f.registry.is_notified(SlotId::new(0)));
        assert_eq!(
            phases(&mut f.rx),
            vec![
                SequencerPhase::CountdownArmed,
                SequencerPhase::Triggered,
                SequencerPhase::NotifyPending,
                SequencerPhase::Kicking,
                SequencerPhase::Terminating,
            ]
        );
    }

    #[test]
    fn test_open_gate_skips_notification_but_still_kicks() {
        let mut f = Fixture::new(64);
        f.join(SessionInfo::human(1));

        f.trigger(at(3, 50, 0));

        assert!(f.host.messages().is_empty());
        assert_eq!(f.host.disconnects().len(), 1);
        assert!(!phases(&mut f.rx).contains(&SequencerPhase::NotifyPending));
    }

    #[test]
    fn test_loading_epoch_forces_notification() {
        let mut f = Fixture::new(64);
        f.join(SessionInfo::human(1));
        f.registry.on_epoch_end(false, true);

        f.trigger(at(3, 50, 0));

        let sent = f.host.messages_for(SlotId::new(1));
        assert_eq!(sent.len(), 1);
        assert_eq!(sent, vec![f.config.messages.restart_imminent()]);
    }

    #[test]
    fn test_notification_disabled() {
        let mut f = Fixture::new(2);
        f.config.notify_before_restart = false;
        f.join(SessionInfo::human(0));
        f.join(SessionInfo::human(1));

        f.trigger(at(3, 50, 0));

        assert!(f.host.messages().is_empty());
        assert_eq!(f.host.disconnects().len(), 2);
    }

    #[test]
    fn test_kick_only_connected_humans() {
        let mut f = Fixture::new(64);
        f.join(SessionInfo::human(1));
        f.join(SessionInfo::human(2).with_connection(ConnectionState::Reconnecting));
        f.join(SessionInfo::human(3).with_connection(ConnectionState::Disconnecting));
        f.join(SessionInfo::human(4).with_team(Team::Spectator));
        f.host.add_session(SessionInfo::bot(5));
        f.host.add_session(SessionInfo::observer(6));

        f.trigger(at(3, 50, 0));

        let kicked: Vec<u32> = f.host.disconnects().iter().map(|(s, _)| s.get()).collect();
        assert_eq!(kicked, vec![1, 2, 4]);
        assert!(f
            .host
            .disconnects()
            .iter()
            .all(|(_, reason)| reason == &f.config.messages.kick_reason));
    }

    #[test]
    fn test_invalid_config_aborts_without_pending() {
        let mut f = Fixture::new(64);
        f.config.restart_time = "25:99".to_string();
        f.join(SessionInfo::human(1));

        let outcome = f.trigger(at(3, 50, 0));

        assert!(matches!(outcome, TriggerOutcome::Aborted(DomainError::InvalidRestartTime { .. })));
        assert!(!f.sequencer.is_pending());
        assert_eq!(f.sequencer.phase(), SequencerPhase::Idle);
        assert!(f.host.disconnects().is_empty());
    }

    #[test]
    fn test_early_fire_rearms() {
        let mut f = Fixture::new(64);
        f.join(SessionInfo::human(1));

        let outcome = f.trigger(at(3, 40, 0));

        assert_eq!(
            outcome,
            TriggerOutcome::Rearm {
                remaining: Duration::from_secs(600)
            }
        );
        assert!(!f.sequencer.is_pending());
        assert!(f.host.disconnects().is_empty());
    }

    #[test]
    fn test_late_fire_still_restarts() {
        let mut f = Fixture::new(64);
        f.join(SessionInfo::human(1));

        let outcome = f.trigger(at(16, 50, 0));

        assert_eq!(outcome, TriggerOutcome::Terminating { after: TERMINATE_GRACE });
        assert!(f.sequencer.is_pending());
        assert_eq!(f.host.disconnects().len(), 1);
    }

    #[test]
    fn test_slightly_early_fire_proceeds() {
        let mut f = Fixture::new(64);
        let outcome = f.trigger(at(3, 49, 58));
        assert!(matches!(outcome, TriggerOutcome::Terminating { .. }));
    }

    #[test]
    fn test_terminate_once() {
        let mut f = Fixture::new(64);
        f.trigger(at(3, 50, 0));

        assert!(f.sequencer.terminate(&mut f.host, TerminateCause::EpochBoundary, &f.events));
        assert!(!f.sequencer.terminate(&mut f.host, TerminateCause::Scheduled, &f.events));

        assert_eq!(f.host.terminations(), 1);
        assert!(!f.sequencer.is_pending());
        assert_eq!(f.sequencer.phase(), SequencerPhase::Idle);
    }

    #[test]
    fn test_disarm_only_from_armed() {
        let (events, _rx) = broadcast::channel(8);
        let mut sequencer = ShutdownSequencer::new();

        sequencer.countdown_disarmed(&events);
        assert_eq!(sequencer.phase(), SequencerPhase::Idle);

        sequencer.countdown_armed(&events);
        assert_eq!(sequencer.phase(), SequencerPhase::CountdownArmed);
        sequencer.countdown_disarmed(&events);
        assert_eq!(sequencer.phase(), SequencerPhase::Idle);
    }
}
