//! Reminder scheduler: one supervised tokio task per reminder.
//!
//! Each task sleeps until its next fire time, delivers through the channel,
//! records progress in the store, and removes itself from the registry
//! after the last delivery. Persisted tasks are respawned by `restore`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::TimeDelta;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::model::{delay_until, next_occurrence, parse_time_of_day};
use crate::channels::{Channel, OutgoingResponse};
use crate::clock::{Clock, system_clock};
use crate::dialog::texts;
use crate::error::SchedulerError;
use crate::store::{RecordStore, ReminderTask, UserId};

/// Gap between repeated deliveries.
const REPEAT_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// A running reminder and the latest view of its progress.
struct TrackedReminder {
    task: ReminderTask,
    handle: JoinHandle<()>,
}

type Registry = Arc<RwLock<HashMap<Uuid, TrackedReminder>>>;

/// Spawns and supervises reminder tasks.
pub struct ReminderScheduler {
    channel: Arc<dyn Channel>,
    store: Arc<dyn RecordStore>,
    clock: Clock,
    tasks: Registry,
    closed: AtomicBool,
}

impl ReminderScheduler {
    pub fn new(channel: Arc<dyn Channel>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            channel,
            store,
            clock: system_clock(),
            tasks: Arc::new(RwLock::new(HashMap::new())),
            closed: AtomicBool::new(false),
        }
    }

    /// Use a different wall-clock source for fire-time arithmetic.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Schedule `message` for `time_label` every day, `repeat_count` times.
    ///
    /// The task is persisted before it is spawned. Nothing is spawned when
    /// the label or count is invalid.
    pub async fn schedule(
        &self,
        user_id: UserId,
        message: &str,
        time_label: &str,
        repeat_count: u32,
    ) -> Result<ReminderTask, SchedulerError> {
        if repeat_count == 0 {
            return Err(SchedulerError::InvalidRepeatCount {
                count: repeat_count,
            });
        }
        let fire_at = parse_time_of_day(time_label)?;
        if self.closed.load(Ordering::SeqCst) {
            return Err(SchedulerError::ShutDown);
        }

        let now = (self.clock)();
        let task = ReminderTask {
            id: Uuid::new_v4(),
            user_id,
            message: message.to_string(),
            time_label: time_label.to_string(),
            fire_at,
            remaining: repeat_count,
            next_fire_at: next_occurrence(now, fire_at),
        };
        self.store.save_reminder(&task).await?;

        let delay = delay_until(now, task.next_fire_at);
        tracing::info!(
            reminder_id = %task.id,
            user_id,
            next_fire_at = %task.next_fire_at,
            repeat_count,
            "Reminder scheduled"
        );
        self.spawn(task.clone(), delay).await;
        Ok(task)
    }

    /// Respawn every persisted reminder that is not already running.
    /// Overdue reminders fire immediately. Returns how many were respawned.
    pub async fn restore(&self) -> Result<usize, SchedulerError> {
        let pending = self.store.list_reminders().await?;
        let now = (self.clock)();
        let mut restored = 0;

        for task in pending {
            if self.closed.load(Ordering::SeqCst) {
                return Err(SchedulerError::ShutDown);
            }
            if self.tasks.read().await.contains_key(&task.id) {
                continue;
            }
            let delay = delay_until(now, task.next_fire_at);
            self.spawn(task, delay).await;
            restored += 1;
        }

        if restored > 0 {
            tracing::info!(count = restored, "Restored pending reminders");
        }
        Ok(restored)
    }

    /// Snapshot of every reminder that still owes deliveries.
    pub async fn active(&self) -> Vec<ReminderTask> {
        let tasks = self.tasks.read().await;
        let mut active: Vec<ReminderTask> = tasks.values().map(|t| t.task.clone()).collect();
        active.sort_by_key(|t| t.next_fire_at);
        active
    }

    /// Abort and await every outstanding task. Persisted reminders resume on
    /// the next `restore`.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let drained: Vec<TrackedReminder> = {
            let mut tasks = self.tasks.write().await;
            tasks.drain().map(|(_, tracked)| tracked).collect()
        };

        let count = drained.len();
        for tracked in drained {
            tracked.handle.abort();
            if let Err(e) = tracked.handle.await {
                if !e.is_cancelled() {
                    tracing::warn!(reminder_id = %tracked.task.id, "Reminder task failed: {e}");
                }
            }
        }
        tracing::info!(count, "Reminder scheduler shut down");
    }

    /// Spawn the task while holding the registry lock, so its own removal
    /// can never run before the insert.
    async fn spawn(&self, task: ReminderTask, first_delay: Duration) {
        let mut tasks = self.tasks.write().await;
        let handle = tokio::spawn(run_reminder(
            Arc::clone(&self.channel),
            Arc::clone(&self.clock),
            Arc::clone(&self.store),
            Arc::clone(&self.tasks),
            task.clone(),
            first_delay,
        ));
        tasks.insert(task.id, TrackedReminder { task, handle });
    }
}

/// The body of one reminder task.
///
/// After every delivery the next fire time is one interval from the moment
/// it actually fired, so a late (restored) delivery never leaves an overdue
/// time behind in the store.
async fn run_reminder(
    channel: Arc<dyn Channel>,
    clock: Clock,
    store: Arc<dyn RecordStore>,
    registry: Registry,
    mut task: ReminderTask,
    first_delay: Duration,
) {
    let mut delay = first_delay;

    while task.remaining > 0 {
        tokio::time::sleep(delay).await;

        let content = format!("{}\n{}", texts::REMINDER_HEADER, task.message);
        match channel
            .send(task.user_id, OutgoingResponse::text(content))
            .await
        {
            Ok(()) => tracing::info!(
                reminder_id = %task.id,
                user_id = task.user_id,
                remaining = task.remaining - 1,
                "Reminder delivered"
            ),
            Err(e) => tracing::warn!(
                reminder_id = %task.id,
                user_id = task.user_id,
                "Reminder delivery failed: {e}"
            ),
        }

        task.remaining -= 1;
        task.next_fire_at = clock() + TimeDelta::days(1);

        let persisted = if task.remaining == 0 {
            store.delete_reminder(task.id).await.map(|_| ())
        } else {
            store
                .update_reminder_progress(task.id, task.remaining, task.next_fire_at)
                .await
        };
        if let Err(e) = persisted {
            tracing::warn!(reminder_id = %task.id, "Failed to record reminder progress: {e}");
        }

        if let Some(tracked) = registry.write().await.get_mut(&task.id) {
            tracked.task = task.clone();
        }
        delay = REPEAT_INTERVAL;
    }

    registry.write().await.remove(&task.id);
    tracing::debug!(reminder_id = %task.id, "Reminder finished");
}
