//! Cancellable, owner-scoped timers.
//!
//! The scheduler is the only source of time-deferred execution in the kernel.
//! Timers are wall-clock and host-driven; callbacks run on later turns of the
//! host loop and must re-validate any state they captured, since arbitrary
//! commits may have happened in between.
//!
//! Every task names an owner (by convention the plugin id that created it) so
//! a plugin's `stop` phase can guarantee no dangling timers outlive it with
//! one [`Scheduler::cancel_all_for_owner`] call. Cancellation is checked
//! immediately before every firing, so a bulk cancel wins the race against a
//! firing that was already due.

use crate::error::SchedulerError;
use crate::trace::{ErrorLog, ErrorOrigin};
use crate::utils::panic_message;
use dashmap::DashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

/// Unique id of a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(Uuid);

impl TaskId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

type TaskCallback = Arc<dyn Fn() -> Result<(), SchedulerError> + Send + Sync>;

struct TaskHandle {
    owner: String,
    cancelled: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

/// Timer registry backed by the host's tokio runtime.
pub struct Scheduler {
    tasks: Arc<DashMap<TaskId, TaskHandle>>,
    errors: Arc<ErrorLog>,
}

impl Scheduler {
    pub fn new(errors: Arc<ErrorLog>) -> Self {
        Self {
            tasks: Arc::new(DashMap::new()),
            errors,
        }
    }

    /// Schedules a one-shot callback to fire once after `delay`.
    pub fn after<F>(&self, delay: Duration, owner: &str, callback: F) -> TaskId
    where
        F: Fn() -> Result<(), SchedulerError> + Send + Sync + 'static,
    {
        let id = TaskId::new();
        let cancelled = Arc::new(AtomicBool::new(false));
        let callback: TaskCallback = Arc::new(callback);

        let tasks = self.tasks.clone();
        let errors = self.errors.clone();
        let owner_name = owner.to_string();
        let flag = cancelled.clone();

        let join = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !flag.load(Ordering::SeqCst) {
                fire(&errors, &owner_name, &callback);
            }
            tasks.remove(&id);
        });

        self.tasks.insert(
            id,
            TaskHandle {
                owner: owner.to_string(),
                cancelled,
                join,
            },
        );
        // The task may already have finished between spawn and insert; drop
        // the stale entry so active_count stays honest.
        if let Some(entry) = self.tasks.get(&id) {
            if entry.join.is_finished() {
                drop(entry);
                self.tasks.remove(&id);
            }
        }
        debug!("⏲️ Scheduled one-shot {id} for owner `{owner}` in {delay:?}");
        id
    }

    /// Schedules a recurring callback firing every `interval` until the task
    /// is cancelled. A failing firing is logged and does not cancel the task.
    pub fn every<F>(&self, interval: Duration, owner: &str, callback: F) -> TaskId
    where
        F: Fn() -> Result<(), SchedulerError> + Send + Sync + 'static,
    {
        let id = TaskId::new();
        let cancelled = Arc::new(AtomicBool::new(false));
        let callback: TaskCallback = Arc::new(callback);

        let tasks = self.tasks.clone();
        let errors = self.errors.clone();
        let owner_name = owner.to_string();
        let flag = cancelled.clone();

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // tokio's first tick completes immediately; the contract is
            // "first firing after one interval".
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                fire(&errors, &owner_name, &callback);
            }
            tasks.remove(&id);
        });

        self.tasks.insert(
            id,
            TaskHandle {
                owner: owner.to_string(),
                cancelled,
                join,
            },
        );
        debug!("⏲️ Scheduled recurring {id} for owner `{owner}` every {interval:?}");
        id
    }

    /// Cancels one task. Cancelling an unknown or already-fired id is a
    /// no-op; returns whether a live task was cancelled.
    pub fn cancel(&self, id: TaskId) -> bool {
        match self.tasks.remove(&id) {
            Some((_, handle)) => {
                handle.cancelled.store(true, Ordering::SeqCst);
                handle.join.abort();
                debug!("🛑 Cancelled {id} (owner `{}`)", handle.owner);
                true
            }
            None => false,
        }
    }

    /// Cancels every task belonging to `owner`. Returns how many were
    /// cancelled.
    pub fn cancel_all_for_owner(&self, owner: &str) -> usize {
        let ids: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|entry| entry.value().owner == owner)
            .map(|entry| *entry.key())
            .collect();
        let mut cancelled = 0;
        for id in ids {
            if self.cancel(id) {
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            debug!("🛑 Cancelled {cancelled} tasks for owner `{owner}`");
        }
        cancelled
    }

    /// Number of live tasks.
    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    /// Number of live tasks for one owner.
    pub fn active_count_for_owner(&self, owner: &str) -> usize {
        self.tasks
            .iter()
            .filter(|entry| entry.value().owner == owner)
            .count()
    }
}

/// Runs one callback firing, converting errors and panics to error records.
fn fire(errors: &ErrorLog, owner: &str, callback: &TaskCallback) {
    match catch_unwind(AssertUnwindSafe(|| callback())) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => errors.record(
            ErrorOrigin::ScheduledTask {
                owner: owner.to_string(),
            },
            e.to_string(),
        ),
        Err(panic_info) => errors.record(
            ErrorOrigin::ScheduledTask {
                owner: owner.to_string(),
            },
            panic_message(panic_info),
        ),
    }
}
