//! Per-epoch notification bookkeeping.
//!
//! The registry remembers which sessions were already warned about the
//! upcoming restart during the current epoch (one map/level), and whether an
//! epoch is currently loading.

use std::collections::HashMap;

use tracing::debug;

use autorestart_core::{SessionInfo, SlotId};

/// What the engine must do after an epoch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochBoundary {
    /// A restart is pending and must be completed now.
    ForceShutdown,
    Continue,
}

/// Tracks the notified-once-per-epoch set and the epoch loading flag.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    notified: HashMap<SlotId, bool>,
    epoch_loading: bool,
    epoch_name: Option<String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new epoch started: nobody has been notified in it yet.
    pub fn on_epoch_start(&mut self, name: &str) {
        debug!(epoch = name, cleared = self.notified.len(), "Epoch started");
        self.notified.clear();
        self.epoch_loading = false;
        self.epoch_name = Some(name.to_string());
    }

    /// The current epoch ended and the next one is loading.
    ///
    /// Returns `EpochBoundary::ForceShutdown` when a restart is pending and
    /// the configuration asks for shutdown at the boundary.
    pub fn on_epoch_end(&mut self, restart_pending: bool, shutdown_if_pending: bool) -> EpochBoundary {
        self.epoch_loading = true;

        if restart_pending && shutdown_if_pending {
            EpochBoundary::ForceShutdown
        } else {
            EpochBoundary::Continue
        }
    }

    /// Starts tracking a joining session. Bots, observers and invalid
    /// sessions are ignored.
    ///
    /// Returns true if the session is now tracked.
    pub fn on_session_join(&mut self, session: &SessionInfo) -> bool {
        if !session.is_human() {
            debug!(slot = %session.slot, "Ignoring join of non-human session");
            return false;
        }
        self.notified.insert(session.slot, false);
        true
    }

    /// Stops tracking a session that left. Returns true if it was tracked.
    pub fn on_session_leave(&mut self, slot: SlotId) -> bool {
        self.notified.remove(&slot).is_some()
    }

    pub fn mark_notified(&mut self, slot: SlotId) {
        self.notified.insert(slot, true);
    }

    #[must_use]
    pub fn is_notified(&self, slot: SlotId) -> bool {
        self.notified.get(&slot).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn is_tracked(&self, slot: SlotId) -> bool {
        self.notified.contains_key(&slot)
    }

    #[must_use]
    pub fn epoch_loading(&self) -> bool {
        self.epoch_loading
    }

    pub fn epoch_name(&self) -> Option<&str> {
        self.epoch_name.as_deref()
    }

    /// Tracked sessions sorted by slot, with their notified flag.
    pub fn snapshot(&self) -> Vec<(SlotId, bool)> {
        let mut entries: Vec<_> = self.notified.iter().map(|(s, n)| (*s, *n)).collect();
        entries.sort_unstable_by_key(|(slot, _)| *slot);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_starts_unnotified() {
        let mut registry = SessionRegistry::new();
        assert!(registry.on_session_join(&SessionInfo::human(3)));
        assert!(registry.is_tracked(SlotId::new(3)));
        assert!(!registry.is_notified(SlotId::new(3)));
    }

    #[test]
    fn test_join_ignores_bots_and_observers() {
        let mut registry = SessionRegistry::new();
        assert!(!registry.on_session_join(&SessionInfo::bot(1)));
        assert!(!registry.on_session_join(&SessionInfo::observer(2)));
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_rejoin_resets_notified() {
        let mut registry = SessionRegistry::new();
        registry.on_session_join(&SessionInfo::human(1));
        registry.mark_notified(SlotId::new(1));
        assert!(registry.is_notified(SlotId::new(1)));

        registry.on_session_join(&SessionInfo::human(1));
        assert!(!registry.is_notified(SlotId::new(1)));
    }

    #[test]
    fn test_leave_removes_entry() {
        let mut registry = SessionRegistry::new();
        registry.on_session_join(&SessionInfo::human(1));
        assert!(registry.on_session_leave(SlotId::new(1)));
        assert!(!registry.on_session_leave(SlotId::new(1)));
        assert!(!registry.is_tracked(SlotId::new(1)));
    }

    #[test]
    fn test_epoch_start_clears_everything() {
        let mut registry = SessionRegistry::new();
        registry.on_session_join(&SessionInfo::human(1));
        registry.mark_notified(SlotId::new(1));
        registry.on_epoch_end(false, true);
        assert!(registry.epoch_loading());

        registry.on_epoch_start("de_dust2");
        assert!(registry.snapshot().is_empty());
        assert!(!registry.epoch_loading());
        assert_eq!(registry.epoch_name(), Some("de_dust2"));
    }

    #[test]
    fn test_epoch_end_forces_shutdown_only_when_pending_and_enabled() {
        let mut registry = SessionRegistry::new();
        assert_eq!(registry.on_epoch_end(true, true), EpochBoundary::ForceShutdown);
        assert_eq!(registry.on_epoch_end(true, false), EpochBoundary::Continue);
        assert_eq!(registry.on_epoch_end(false, true), EpochBoundary::Continue);
        assert!(registry.epoch_loading());
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let mut registry = SessionRegistry::new();
        for slot in [5, 1, 3] {
            registry.on_session_join(&SessionInfo::human(slot));
        }
        registry.mark_notified(SlotId::new(3));
        assert_eq!(
            registry.snapshot(),
            vec![
                (SlotId::new(1), false),
                (SlotId::new(3), true),
                (SlotId::new(5), false)
            ]
        );
    }
}
