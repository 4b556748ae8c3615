//! Host environment abstraction.
//!
//! The engine talks to the game server (or whatever hosts the sessions)
//! exclusively through `Host`. Adapters translate host session objects into
//! `SessionInfo` snapshots and execute the message, disconnect and terminate
//! primitives.
//!
//! Two adapters ship with the crate:
//! - `MemoryHost` - in-memory session table that records every primitive call
//! - `SignalHost` - standalone adapter that restarts a process by signal

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use autorestart_core::{effective_capacity, SessionInfo, SlotId};

/// Capabilities the engine needs from its host.
///
/// All methods are called from the engine task; none of them may block for
/// long.
pub trait Host: Send + 'static {
    /// Snapshot of every session the host currently knows about.
    fn sessions(&self) -> Vec<SessionInfo>;

    /// Looks up a single session by slot.
    fn session(&self, slot: SlotId) -> Option<SessionInfo> {
        self.sessions().into_iter().find(|s| s.slot == slot)
    }

    /// Host-reported visible capacity, `-1` when unset.
    fn visible_capacity(&self) -> i32;

    /// Configured maximum number of sessions.
    fn max_capacity(&self) -> u32;

    /// Capacity used by the restart gate.
    fn capacity(&self) -> u32 {
        effective_capacity(self.visible_capacity(), self.max_capacity())
    }

    /// Sends text to the session's chat/notification channel.
    fn send_message(&mut self, slot: SlotId, text: &str);

    /// Force-disconnects the session.
    fn disconnect(&mut self, slot: SlotId, reason: &str);

    /// Irreversibly shuts the hosted service down.
    fn terminate(&mut self);
}

// ============================================================================
// Memory Host
// ============================================================================

/// Recorded state of a `MemoryHost`.
#[derive(Debug, Default)]
pub struct MemoryHostState {
    pub sessions: BTreeMap<SlotId, SessionInfo>,
    pub visible_capacity: i32,
    pub max_capacity: u32,
    pub messages: Vec<(SlotId, String)>,
    pub disconnects: Vec<(SlotId, String)>,
    pub terminations: usize,
}

/// In-memory host that records every primitive call.
///
/// Cloning shares the underlying state, so a test can keep one clone while
/// the engine owns another.
#[derive(Debug, Clone)]
pub struct MemoryHost {
    state: Arc<Mutex<MemoryHostState>>,
}

impl MemoryHost {
    /// Creates a host with `max_capacity` slots and no visible capacity set.
    pub fn new(max_capacity: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryHostState {
                visible_capacity: -1,
                max_capacity,
                ..MemoryHostState::default()
            })),
        }
    }

    /// Adds or replaces a session.
    pub fn add_session(&self, session: SessionInfo) {
        self.lock().sessions.insert(session.slot, session);
    }

    pub fn remove_session(&self, slot: SlotId) -> Option<SessionInfo> {
        self.lock().sessions.remove(&slot)
    }

    pub fn set_visible_capacity(&self, visible: i32) {
        self.lock().visible_capacity = visible;
    }

    pub fn messages(&self) -> Vec<(SlotId, String)> {
        self.lock().messages.clone()
    }

    pub fn messages_for(&self, slot: SlotId) -> Vec<String> {
        self.lock()
            .messages
            .iter()
            .filter(|(s, _)| *s == slot)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn disconnects(&self) -> Vec<(SlotId, String)> {
        self.lock().disconnects.clone()
    }

    pub fn terminations(&self) -> usize {
        self.lock().terminations
    }

    fn lock(&self) -> MutexGuard<'_, MemoryHostState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Host for MemoryHost {
    fn sessions(&self) -> Vec<SessionInfo> {
        self.lock().sessions.values().cloned().collect()
    }

    fn session(&self, slot: SlotId) -> Option<SessionInfo> {
        self.lock().sessions.get(&slot).cloned()
    }

    fn visible_capacity(&self) -> i32 {
        self.lock().visible_capacity
    }

    fn max_capacity(&self) -> u32 {
        self.lock().max_capacity
    }

    fn send_message(&mut self, slot: SlotId, text: &str) {
        self.lock().messages.push((slot, text.to_string()));
    }

    fn disconnect(&mut self, slot: SlotId, reason: &str) {
        let mut state = self.lock();
        state.disconnects.push((slot, reason.to_string()));
        state.sessions.remove(&slot);
    }

    fn terminate(&mut self) {
        self.lock().terminations += 1;
    }
}

// ============================================================================
// Signal Host
// ============================================================================

/// Errors raised while building a `SignalHost`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("unknown signal: {0}")]
    UnknownSignal(String),
}

/// Parses a signal name such as `"SIGTERM"` or `"term"`.
///
/// # Errors
///
/// Returns `HostError::UnknownSignal` for names outside the supported set.
pub fn parse_signal(name: &str) -> Result<i32, HostError> {
    let upper = name.trim().to_ascii_uppercase();
    let bare = upper.strip_prefix("SIG").unwrap_or(&upper);
    match bare {
        "TERM" => Ok(libc::SIGTERM),
        "INT" => Ok(libc::SIGINT),
        "HUP" => Ok(libc::SIGHUP),
        "QUIT" => Ok(libc::SIGQUIT),
        "KILL" => Ok(libc::SIGKILL),
        "USR1" => Ok(libc::SIGUSR1),
        "USR2" => Ok(libc::SIGUSR2),
        _ => Err(HostError::UnknownSignal(name.to_string())),
    }
}

/// Standalone host: no sessions, terminate signals a supervised process.
///
/// The PID is read from `pid_file` when termination happens, so the file may
/// be rewritten by whatever restarts the service.
#[derive(Debug, Clone)]
pub struct SignalHost {
    pid_file: Option<PathBuf>,
    signal: i32,
}

impl SignalHost {
    pub fn new(pid_file: Option<PathBuf>, signal: i32) -> Self {
        Self { pid_file, signal }
    }

    /// Builds the host from the `[host]` configuration table.
    pub fn from_config(config: &autorestart_core::StandaloneHostConfig) -> Result<Self, HostError> {
        Ok(Self::new(config.pid_file.clone(), parse_signal(&config.signal)?))
    }

    fn read_pid(&self) -> Option<i32> {
        let path = self.pid_file.as_ref()?;
        match fs::read_to_string(path) {
            Ok(contents) => contents.trim().parse().ok().filter(|pid| *pid > 0),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read PID file");
                None
            }
        }
    }
}

impl Host for SignalHost {
    fn sessions(&self) -> Vec<SessionInfo> {
        Vec::new()
    }

    fn visible_capacity(&self) -> i32 {
        -1
    }

    fn max_capacity(&self) -> u32 {
        0
    }

    fn send_message(&mut self, slot: SlotId, text: &str) {
        debug!(slot = %slot, text, "Standalone host has no sessions, dropping message");
    }

    fn disconnect(&mut self, slot: SlotId, reason: &str) {
        debug!(slot = %slot, reason, "Standalone host has no sessions, ignoring disconnect");
    }

    fn terminate(&mut self) {
        let Some(pid) = self.read_pid() else {
            warn!("No target PID available, nothing to terminate");
            return;
        };

        #[cfg(unix)]
        {
            let result = unsafe { libc::kill(pid, self.signal) };
            if result == 0 {
                info!(pid, signal = self.signal, "Sent restart signal");
            } else {
                error!(
                    pid,
                    signal = self.signal,
                    error = %std::io::Error::last_os_error(),
                    "Failed to send restart signal"
                );
            }
        }
        #[cfg(not(unix))]
        {
            error!(pid, "Signal delivery is only supported on Unix systems");
        }
    }
}
