//! Client interface for interacting with the EngineActor.
//!
//! The `EngineHandle` is what a host adapter holds: it forwards lifecycle
//! callbacks to the actor and offers reconfiguration and status queries.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `EngineError::ChannelClosed`

use chrono::NaiveDateTime;
use tokio::sync::{broadcast, mpsc, oneshot};

use autorestart_core::{RestartConfig, SlotId};

use super::commands::{EngineCommand, EngineError, EngineEvent, EngineStatus, ReloadReport};

// ============================================================================
// Engine Handle
// ============================================================================

/// Handle for interacting with the engine actor.
///
/// Cheap to clone; every clone talks to the same actor.
///
/// # Usage
///
/// ```ignore
/// let handle = spawn_engine(config, host, SystemClock);
///
/// handle.session_joined(SlotId::new(3)).await?;
/// handle.epoch_started("de_dust2").await?;
///
/// let status = handle.status().await?;
/// println!("next restart at {:?}", status.next_restart);
/// ```
#[derive(Clone)]
pub struct EngineHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<EngineCommand>,

    /// Event broadcaster for subscribing to engine events
    event_sender: broadcast::Sender<EngineEvent>,
}

impl EngineHandle {
    pub fn new(sender: mpsc::Sender<EngineCommand>, event_sender: broadcast::Sender<EngineEvent>) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// A session connected to the host.
    pub async fn session_joined(&self, slot: SlotId) -> Result<(), EngineError> {
        self.send(EngineCommand::SessionJoined { slot }).await
    }

    /// A session disconnected from the host.
    pub async fn session_left(&self, slot: SlotId) -> Result<(), EngineError> {
        self.send(EngineCommand::SessionLeft { slot }).await
    }

    /// A session spawned into the game.
    ///
    /// The first spawn of an eligible session in an epoch sends it the
    /// restart warning, if notifications are enabled.
    pub async fn session_spawned(&self, slot: SlotId) -> Result<(), EngineError> {
        self.send(EngineCommand::SessionSpawned { slot }).await
    }

    /// A new epoch finished loading. Clears the notified set.
    pub async fn epoch_started(&self, name: impl Into<String>) -> Result<(), EngineError> {
        self.send(EngineCommand::EpochStarted { name: name.into() })
            .await
    }

    /// The current epoch ended.
    ///
    /// Completes a pending restart immediately when
    /// `shutdown_on_epoch_boundary_if_pending` is set.
    pub async fn epoch_ended(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::EpochEnded).await
    }

    pub async fn hibernation_changed(&self, hibernating: bool) -> Result<(), EngineError> {
        self.send(EngineCommand::HibernationChanged { hibernating })
            .await
    }

    /// Replaces the configuration.
    ///
    /// # Errors
    ///
    /// - `EngineError::ChannelClosed` if the actor has shut down
    pub async fn reload_config(&self, config: RestartConfig) -> Result<ReloadReport, EngineError> {
        let (tx, rx) = oneshot::channel();

        self.send(EngineCommand::ReloadConfig {
            config: Box::new(config),
            respond_to: tx,
        })
        .await?;

        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Recomputes and re-arms the countdown.
    ///
    /// # Errors
    ///
    /// - `EngineError::Schedule` if the configured restart time is invalid;
    ///   the previous countdown is cancelled in that case
    /// - `EngineError::ChannelClosed` if the actor has shut down
    pub async fn reschedule(&self) -> Result<NaiveDateTime, EngineError> {
        let (tx, rx) = oneshot::channel();

        self.send(EngineCommand::Reschedule { respond_to: tx })
            .await?;

        Ok(rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    /// Snapshot of the engine state.
    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        let (tx, rx) = oneshot::channel();

        self.send(EngineCommand::GetStatus { respond_to: tx })
            .await?;

        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Cancels the countdown and stops the actor.
    ///
    /// Returns once the actor acknowledged; no deferred task runs afterwards.
    pub async fn unload(&self) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();

        self.send(EngineCommand::Unload { respond_to: tx }).await?;

        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Subscribe to engine events.
    ///
    /// Receivers that fall behind get `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_sender.subscribe()
    }

    /// Check if the actor is still accepting commands.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }

    async fn send(&self, cmd: EngineCommand) -> Result<(), EngineError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| EngineError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closed_channel_maps_to_error() {
        let (tx, rx) = mpsc::channel(1);
        let (event_tx, _) = broadcast::channel(1);
        drop(rx);

        let handle = EngineHandle::new(tx, event_tx);

        assert!(!handle.is_connected());
        assert_eq!(
            handle.session_joined(SlotId::new(1)).await,
            Err(EngineError::ChannelClosed)
        );
        assert_eq!(handle.status().await, Err(EngineError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_dropped_responder_maps_to_error() {
        let (tx, mut rx) = mpsc::channel(1);
        let (event_tx, _) = broadcast::channel(1);
        let handle = EngineHandle::new(tx, event_tx);

        // Receive the command and drop its responder
        tokio::spawn(async move {
            let _ = rx.recv().await;
        });

        assert_eq!(handle.reschedule().await, Err(EngineError::ChannelClosed));
    }
}
