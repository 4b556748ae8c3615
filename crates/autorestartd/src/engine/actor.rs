//! Engine actor - owns all scheduler state and processes host callbacks.
//!
//! The EngineActor is the single owner of the notified set, the epoch and
//! pending-restart flags, the configuration and the countdown. It receives
//! commands via an mpsc channel, runs deferred tasks when they come due, and
//! publishes events via broadcast.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel send failures are ignored; a missing subscriber is not an error

use std::future;
use std::ops::ControlFlow;

use chrono::NaiveDateTime;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use autorestart_core::{DomainResult, RestartConfig, SlotId};

use super::commands::{EngineCommand, EngineEvent, EngineStatus, ReloadReport};
use crate::clock::Clock;
use crate::dispatch::NotificationDispatcher;
use crate::host::Host;
use crate::registry::{EpochBoundary, SessionRegistry};
use crate::sequencer::{SequencerContext, ShutdownSequencer, TerminateCause, TriggerOutcome};
use crate::timer::{Deferred, Fired, ScheduleTimer};

/// The engine actor.
///
/// Runs in a single task: commands and deferred tasks are processed one at a
/// time, so no scheduler state needs locking.
pub struct EngineActor<H: Host, C: Clock> {
    /// Command receiver
    receiver: mpsc::Receiver<EngineCommand>,

    /// Event publisher for hosts and tests
    event_publisher: broadcast::Sender<EngineEvent>,

    host: H,
    clock: C,
    config: RestartConfig,

    /// Notified-once-per-epoch set and epoch loading flag
    registry: SessionRegistry,

    /// Restart phase and pending-restart flag
    sequencer: ShutdownSequencer,

    /// Countdown and other deferred tasks
    timer: ScheduleTimer,

    hibernating: bool,
}

impl<H: Host, C: Clock> EngineActor<H, C> {
    pub fn new(
        receiver: mpsc::Receiver<EngineCommand>,
        event_publisher: broadcast::Sender<EngineEvent>,
        config: RestartConfig,
        host: H,
        clock: C,
    ) -> Self {
        Self {
            receiver,
            event_publisher,
            host,
            clock,
            config,
            registry: SessionRegistry::new(),
            sequencer: ShutdownSequencer::new(),
            timer: ScheduleTimer::new(),
            hibernating: false,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Arms the countdown, then processes commands and due tasks until
    /// `Unload` arrives or every handle is dropped.
    pub async fn run(mut self) {
        info!(restart_time = %self.config.restart_time, "Restart engine starting");
        let _ = self.setup_restart_timer();

        loop {
            let deadline = self.timer.next_deadline();

            tokio::select! {
                biased;

                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else { break };
                    if self.handle_command(cmd).is_break() {
                        break;
                    }
                }
                () = wait_for(deadline) => {
                    self.run_due_tasks();
                }
            }
        }

        self.timer.cancel();
        info!(phase = %self.sequencer.phase(), "Restart engine stopped");
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: EngineCommand) -> ControlFlow<()> {
        match cmd {
            EngineCommand::SessionJoined { slot } => self.handle_session_joined(slot),
            EngineCommand::SessionLeft { slot } => {
                if self.registry.on_session_leave(slot) {
                    debug!(slot = %slot, "Session left");
                }
            }
            EngineCommand::SessionSpawned { slot } => self.handle_session_spawned(slot),
            EngineCommand::EpochStarted { name } => self.registry.on_epoch_start(&name),
            EngineCommand::EpochEnded => self.handle_epoch_ended(),
            EngineCommand::HibernationChanged { hibernating } => {
                if hibernating {
                    warn!("Server is hibernating, the restart timer may not fire until it wakes up");
                }
                self.hibernating = hibernating;
            }
            EngineCommand::ReloadConfig { config, respond_to } => {
                let report = self.handle_reload(*config);
                let _ = respond_to.send(report);
            }
            EngineCommand::Reschedule { respond_to } => {
                let result = self.setup_restart_timer();
                let _ = respond_to.send(result);
            }
            EngineCommand::GetStatus { respond_to } => {
                let _ = respond_to.send(self.status());
            }
            EngineCommand::Unload { respond_to } => {
                if self.timer.cancel() {
                    self.sequencer.countdown_disarmed(&self.event_publisher);
                }
                info!("Restart engine unloading");
                let _ = respond_to.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_session_joined(&mut self, slot: SlotId) {
        let Some(session) = self.host.session(slot) else {
            debug!(slot = %slot, "Joined session unknown to host, ignoring");
            return;
        };
        if self.registry.on_session_join(&session) {
            debug!(slot = %slot, "Session joined");
        }
    }

    /// Warns a freshly spawned session once per epoch.
    fn handle_session_spawned(&mut self, slot: SlotId) {
        if !self.config.notify_before_restart {
            return;
        }

        let Some(session) = self.host.session(slot) else {
            debug!(slot = %slot, "Spawned session unknown to host, ignoring");
            return;
        };
        if !session.is_eligible_for_notification() || self.registry.is_notified(slot) {
            return;
        }

        self.registry.mark_notified(slot);

        let now = self.clock.now();
        let dispatcher = NotificationDispatcher::new(&self.config.messages);
        match self.config.calculator() {
            Ok(calculator) => {
                dispatcher.notify_one(&mut self.host, slot, calculator.until_next(now), now);
            }
            Err(e) => {
                warn!(slot = %slot, error = %e, "Cannot calculate restart time for notification");
                dispatcher.notify_unavailable(&mut self.host, slot);
            }
        }

        let _ = self.event_publisher.send(EngineEvent::SessionNotified { slot });
    }

    fn handle_epoch_ended(&mut self) {
        let boundary = self.registry.on_epoch_end(
            self.sequencer.is_pending(),
            self.config.shutdown_on_epoch_boundary_if_pending,
        );

        if boundary == EpochBoundary::ForceShutdown {
            info!("Restart pending at epoch boundary, shutting down now");
            self.terminate(TerminateCause::EpochBoundary);
        }
    }

    fn handle_reload(&mut self, config: RestartConfig) -> ReloadReport {
        let version_downgrade = self.config.is_downgraded_by(&config);
        if version_downgrade {
            warn!(
                current = self.config.config_version,
                new = config.config_version,
                "Loaded configuration has an older version than the current one"
            );
        }

        if !self.config.schedule_changed(&config) {
            info!("No change in restart schedule, keeping current countdown");
            self.config = config;
            return ReloadReport {
                rescheduled: false,
                version_downgrade,
                next_restart: self.timer.next_restart(),
            };
        }

        info!(
            old = %self.config.restart_time,
            new = %config.restart_time,
            "Restart configuration changed, rescheduling"
        );
        self.config = config;
        let next_restart = self.setup_restart_timer().ok();

        ReloadReport {
            rescheduled: true,
            version_downgrade,
            next_restart,
        }
    }

    fn status(&self) -> EngineStatus {
        EngineStatus {
            phase: self.sequencer.phase(),
            pending_restart: self.sequencer.is_pending(),
            epoch_loading: self.registry.epoch_loading(),
            epoch_name: self.registry.epoch_name().map(str::to_string),
            hibernating: self.hibernating,
            next_restart: self.timer.next_restart(),
            config_version: self.config.config_version,
            notified: self.registry.snapshot(),
        }
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Recomputes and arms the countdown from the current configuration.
    fn setup_restart_timer(&mut self) -> DomainResult<NaiveDateTime> {
        match self.timer.setup(&self.config, self.clock.now(), Instant::now()) {
            Ok(at) => {
                self.sequencer.countdown_armed(&self.event_publisher);
                let _ = self.event_publisher.send(EngineEvent::RestartScheduled { at });
                Ok(at)
            }
            Err(e) => {
                self.sequencer.countdown_disarmed(&self.event_publisher);
                let _ = self
                    .event_publisher
                    .send(EngineEvent::ScheduleSuspended { reason: e.clone() });
                Err(e)
            }
        }
    }

    /// Runs every deferred task that is due, in deadline order.
    fn run_due_tasks(&mut self) {
        while let Some(task) = self.timer.pop_due(Instant::now()) {
            match task {
                Fired::Countdown { target } => self.handle_countdown_fired(target),
                Fired::Terminate => self.terminate(TerminateCause::Scheduled),
            }
        }
    }

    fn handle_countdown_fired(&mut self, target: NaiveDateTime) {
        let ctx = SequencerContext {
            host: &mut self.host,
            registry: &mut self.registry,
            config: &self.config,
            now: self.clock.now(),
            target,
            events: &self.event_publisher,
        };

        match self.sequencer.trigger(ctx) {
            TriggerOutcome::Aborted(e) => {
                warn!(error = %e, "Restart cycle aborted, restarts suspended until reconfigured");
                let _ = self
                    .event_publisher
                    .send(EngineEvent::ScheduleSuspended { reason: e });
            }
            TriggerOutcome::Rearm { .. } => {
                let _ = self.setup_restart_timer();
            }
            TriggerOutcome::Terminating { after } => {
                self.timer.defer(after, Instant::now(), Deferred::Terminate);
            }
        }
    }

    fn terminate(&mut self, cause: TerminateCause) {
        if self
            .sequencer
            .terminate(&mut self.host, cause, &self.event_publisher)
        {
            // The host may outlive the terminated service; arm the next cycle.
            let _ = self.setup_restart_timer();
        }
    }
}

/// Sleeps until `deadline`, or forever when there is none.
async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}
