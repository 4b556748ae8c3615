//! autorestart engine - daily restart scheduling for multiplayer servers
//!
//! This crate drives the restart cycle against an abstract host:
//! - `engine` - actor that owns all scheduler state and processes host callbacks
//! - `timer` - the daily countdown and other deferred tasks
//! - `sequencer` - restart phases: notify, kick, terminate exactly once
//! - `registry` - who has been warned during the current epoch
//! - `dispatch` - formatting and delivery of restart warnings
//! - `host` - the `Host` capability trait plus in-memory and signal adapters
//! - `clock` - wall-clock source, swappable for tests
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      autorestartd                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │  EngineHandle   │────▶│        EngineActor          │   │
//! │  │ (host adapter)  │     │  (scheduler state owner)    │   │
//! │  └─────────────────┘     └──────────────┬──────────────┘   │
//! │                                         │                   │
//! │                           ┌─────────────┼─────────────┐     │
//! │                           ▼             ▼             ▼     │
//! │                    ScheduleTimer  ShutdownSequencer  Host   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod clock;
pub mod dispatch;
pub mod engine;
pub mod host;
pub mod registry;
pub mod sequencer;
pub mod timer;
