//! Cooperative deferred tasks and the daily countdown timer.
//!
//! Nothing here sleeps. The engine actor asks for the earliest deadline,
//! waits for it alongside its command channel, then pops due tasks in
//! deadline order (ties in scheduling order) and runs them itself.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::time::Instant;
use tracing::{error, info};

use autorestart_core::{DomainResult, RestartConfig};

/// Identifier of a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

/// Work the engine defers to a later point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferred {
    /// The daily countdown elapsed.
    Countdown,
    /// The grace delay after kicking elapsed.
    Terminate,
}

/// A deferred task that came due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fired {
    /// The daily countdown elapsed; `target` is the wall-clock time it was
    /// armed for.
    Countdown { target: NaiveDateTime },
    Terminate,
}

// ============================================================================
// Deferred Queue
// ============================================================================

/// Deadline-ordered queue of deferred tasks with cancellation.
///
/// Cancelled entries stay in the heap and are skipped lazily.
#[derive(Debug, Default)]
pub struct DeferredQueue {
    heap: BinaryHeap<Reverse<(Instant, TaskId)>>,
    live: HashMap<TaskId, Deferred>,
    next_id: u64,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, at: Instant, task: Deferred) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.heap.push(Reverse((at, id)));
        self.live.insert(id, task);
        id
    }

    /// Cancels a task. Returns false if it already ran or was cancelled.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        self.live.remove(&id).is_some()
    }

    /// Deadline of the earliest live task.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.purge_cancelled();
        self.heap.peek().map(|Reverse((at, _))| *at)
    }

    /// Removes and returns the earliest task if it is due at `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<(TaskId, Deferred)> {
        self.purge_cancelled();
        let Reverse((at, _)) = self.heap.peek()?;
        if *at > now {
            return None;
        }
        let Reverse((_, id)) = self.heap.pop()?;
        self.live.remove(&id).map(|task| (id, task))
    }

    /// Number of live tasks of the given kind.
    pub fn count(&self, task: Deferred) -> usize {
        self.live.values().filter(|t| **t == task).count()
    }

    fn purge_cancelled(&mut self) {
        while let Some(Reverse((_, id))) = self.heap.peek() {
            if self.live.contains_key(id) {
                break;
            }
            self.heap.pop();
        }
    }
}

// ============================================================================
// Schedule Timer
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct ArmedCountdown {
    id: TaskId,
    fires_at: NaiveDateTime,
}

/// Owns the single daily countdown plus the other deferred engine tasks.
///
/// At most one countdown is armed at any time: arming always cancels the
/// previous one first.
#[derive(Debug, Default)]
pub struct ScheduleTimer {
    queue: DeferredQueue,
    countdown: Option<ArmedCountdown>,
}

impl ScheduleTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes the countdown from `config` and arms it.
    ///
    /// On a configuration error the current countdown is cancelled as well,
    /// leaving restarts disabled until a valid configuration arrives.
    ///
    /// Returns the wall-clock time the countdown fires at.
    pub fn setup(
        &mut self,
        config: &RestartConfig,
        wall_now: NaiveDateTime,
        now: Instant,
    ) -> DomainResult<NaiveDateTime> {
        let calculator = match config.calculator() {
            Ok(calculator) => calculator,
            Err(e) => {
                error!(
                    restart_time = %config.restart_time,
                    error = %e,
                    "Invalid restart time format in configuration, restarts suspended"
                );
                self.cancel();
                return Err(e);
            }
        };

        let remaining = calculator.until_next(wall_now);
        let fires_at = calculator.next_occurrence(wall_now);
        self.arm(remaining, fires_at, now);

        info!(
            restart_at = %fires_at,
            remaining_secs = remaining.as_secs(),
            "Server restart scheduled"
        );
        Ok(fires_at)
    }

    /// Arms the countdown for `remaining`, replacing any armed one.
    pub fn arm(&mut self, remaining: Duration, fires_at: NaiveDateTime, now: Instant) {
        self.cancel();
        let id = self.queue.schedule(now + remaining, Deferred::Countdown);
        self.countdown = Some(ArmedCountdown { id, fires_at });
    }

    /// Cancels the armed countdown. Returns true if one was armed.
    pub fn cancel(&mut self) -> bool {
        match self.countdown.take() {
            Some(armed) => self.queue.cancel(armed.id),
            None => false,
        }
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.countdown.is_some()
    }

    /// Wall-clock time of the armed countdown.
    pub fn next_restart(&self) -> Option<NaiveDateTime> {
        self.countdown.map(|armed| armed.fires_at)
    }

    /// Defers a one-shot task by `after`.
    pub fn defer(&mut self, after: Duration, now: Instant, task: Deferred) -> TaskId {
        self.queue.schedule(now + after, task)
    }

    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.queue.next_deadline()
    }

    /// Pops the next task due at `now`. A popped countdown is disarmed.
    pub fn pop_due(&mut self, now: Instant) -> Option<Fired> {
        loop {
            let (id, task) = self.queue.pop_due(now)?;
            match task {
                Deferred::Terminate => return Some(Fired::Terminate),
                Deferred::Countdown => match self.countdown {
                    Some(armed) if armed.id == id => {
                        self.countdown = None;
                        return Some(Fired::Countdown {
                            target: armed.fires_at,
                        });
                    }
                    _ => continue,
                },
            }
        }
    }

    /// Number of live tasks of the given kind.
    pub fn pending(&self, task: Deferred) -> usize {
        self.queue.count(task)
    }
}
