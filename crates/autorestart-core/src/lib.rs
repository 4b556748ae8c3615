//! autorestart Core - Shared types for daily restart scheduling
//!
//! This crate provides the pure domain logic shared by the engine
//! (autorestartd) and any host adapter:
//! - `time` - restart time-of-day parsing and countdown calculation
//! - `gate` - population-based admission policy for disruptive restarts
//! - `session` - host session snapshots and eligibility rules
//! - `message` - user-facing message catalog and countdown formatting
//! - `config` - the TOML configuration record
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod config;
pub mod error;
pub mod gate;
pub mod message;
pub mod session;
pub mod time;

// Re-exports for convenience
pub use config::{RestartConfig, StandaloneHostConfig, CURRENT_CONFIG_VERSION};
pub use error::{ConfigError, DomainError, DomainResult};
pub use gate::{effective_capacity, RestartGate};
pub use message::{Countdown, CountdownUnit, Messages};
pub use session::{ConnectionState, SessionInfo, SlotId, Team};
pub use time::{RestartTime, TimeCalculator};
