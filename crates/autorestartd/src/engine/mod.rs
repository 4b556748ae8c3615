//! Restart engine using the Actor pattern.
//!
//! The engine owns every piece of scheduler state. Host callbacks arrive as
//! commands on an mpsc channel; the countdown and the terminate grace delay
//! are deferred tasks the actor waits on next to that channel, so commands
//! and timers never run concurrently.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │  Host adapter   │────▶│   EngineActor   │────▶│ Broadcast Channel│
//! └─────────────────┘     └─────────────────┘     └──────────────────┘
//!         │                       │                        │
//!         │   EngineCommand       │   deadline reached     │   EngineEvent
//!         │   (mpsc channel)      ▼                        ▼
//!    join/leave/spawn      ScheduleTimer ──▶        subscribers, tests
//!    epoch/reload          ShutdownSequencer
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use tokio::sync::{broadcast, mpsc};

use autorestart_core::RestartConfig;

use crate::clock::Clock;
use crate::host::Host;

mod actor;
mod commands;
mod handle;

pub use actor::EngineActor;
pub use commands::{EngineCommand, EngineError, EngineEvent, EngineStatus, ReloadReport};
pub use handle::EngineHandle;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 100;
const EVENT_BUFFER: usize = 256;

/// Spawn the engine actor and return a handle for interaction.
///
/// The countdown is armed as soon as the actor starts. If the configured
/// restart time is invalid, the actor logs the error and waits for a valid
/// configuration.
///
/// # Example
///
/// ```no_run
/// use autorestart_core::RestartConfig;
/// use autorestartd::clock::SystemClock;
/// use autorestartd::engine::spawn_engine;
/// use autorestartd::host::MemoryHost;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_engine(RestartConfig::default(), MemoryHost::default(), SystemClock);
///     let status = handle.status().await;
/// }
/// ```
pub fn spawn_engine<H: Host, C: Clock>(config: RestartConfig, host: H, clock: C) -> EngineHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = EngineActor::new(cmd_rx, event_tx.clone(), config, host, clock);
    tokio::spawn(actor.run());

    EngineHandle::new(cmd_tx, event_tx)
}
