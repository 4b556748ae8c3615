//! Advance-warning delivery.

use std::time::Duration;

use chrono::NaiveDateTime;
use tracing::debug;

use autorestart_core::{Messages, SessionInfo, SlotId};

use crate::host::Host;
use crate::registry::SessionRegistry;

/// Formats restart warnings from the message catalog and hands them to the
/// host's message primitive.
#[derive(Debug, Clone, Copy)]
pub struct NotificationDispatcher<'a> {
    messages: &'a Messages,
}

impl<'a> NotificationDispatcher<'a> {
    pub fn new(messages: &'a Messages) -> Self {
        Self { messages }
    }

    /// Warns one session that the restart happens in `remaining`.
    ///
    /// The message carries both the relative countdown and the absolute
    /// restart timestamp (`now + remaining`).
    pub fn notify_one<H: Host>(&self, host: &mut H, slot: SlotId, remaining: Duration, now: NaiveDateTime) {
        let restart_at = now + chrono::Duration::from_std(remaining).unwrap_or_else(|_| chrono::Duration::zero());
        let text = self.messages.restart_notification(remaining, restart_at);
        debug!(slot = %slot, remaining_secs = remaining.as_secs(), "Sending restart notification");
        host.send_message(slot, &text);
    }

    /// Tells one session that no restart time can be computed.
    pub fn notify_unavailable<H: Host>(&self, host: &mut H, slot: SlotId) {
        host.send_message(slot, &self.messages.cannot_calculate());
    }

    /// Warns every given session and marks each as notified.
    ///
    /// With `remaining` set each session gets the countdown notification;
    /// `None` means the disconnect follows immediately and the catalog's
    /// imminent-restart message is sent instead.
    ///
    /// Returns the slots that were notified, in order.
    pub fn notify_all<H: Host>(
        &self,
        host: &mut H,
        registry: &mut SessionRegistry,
        sessions: &[SessionInfo],
        remaining: Option<Duration>,
        now: NaiveDateTime,
    ) -> Vec<SlotId> {
        let imminent = self.messages.restart_imminent();
        sessions
            .iter()
            .map(|session| {
                match remaining {
                    Some(remaining) => self.notify_one(host, session.slot, remaining, now),
                    None => host.send_message(session.slot, &imminent),
                }
                registry.mark_notified(session.slot);
                session.slot
            })
            .collect()
    }
}
