use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::notify::{NotifyError, NotifySink, ReminderNote};
use crate::settings::{Settings, SettingsStore};
use crate::task::{Task, TaskId};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

struct TimerSlot {
    epoch: u64,
    handle: JoinHandle<()>,
}

struct SchedulerInner {
    settings: Arc<SettingsStore>,
    sink: Arc<dyn NotifySink>,
    clock: Arc<dyn Clock>,
    timers: Mutex<HashMap<TaskId, TimerSlot>>,
    epochs: AtomicU64,
    active: bool,
}

/// One-shot reminder timers, at most one per task. Arming a task that
/// already holds a timer aborts the previous one; cancelling aborts and
/// forgets it. Must be used from within a tokio runtime.
#[derive(Clone)]
pub struct ReminderScheduler {
    inner: Arc<SchedulerInner>,
}

impl ReminderScheduler {
    pub fn new(
        settings: Arc<SettingsStore>,
        sink: Arc<dyn NotifySink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                settings,
                sink,
                clock,
                timers: Mutex::new(HashMap::new()),
                epochs: AtomicU64::new(0),
                active: true,
            }),
        }
    }

    /// Scheduler that accepts every call but never arms a timer. Lets
    /// synchronous callers run without a runtime.
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                settings: Arc::new(SettingsStore::ephemeral(Settings::default())),
                sink: Arc::new(NullSink),
                clock: Arc::new(SystemClock),
                timers: Mutex::new(HashMap::new()),
                epochs: AtomicU64::new(0),
                active: false,
            }),
        }
    }

    /// Arms a timer that fires `lead-minutes` before the task's due date.
    /// Returns false when there is nothing to arm: no due date, the window
    /// has already passed, or the scheduler is disabled.
    #[instrument(skip(self, task), fields(id = %task.id))]
    pub fn schedule(&self, task: &Task) -> bool {
        let Some(due) = task.due_date else {
            debug!("task has no due date; nothing to arm");
            return false;
        };

        let lead_minutes = self.inner.settings.snapshot().notifications.lead_minutes;
        let lead =
            chrono::Duration::try_minutes(lead_minutes).unwrap_or_else(chrono::Duration::zero);
        let fire_at = due - lead;
        let now = self.inner.clock.now();

        if fire_at <= now {
            debug!(fire_at = %fire_at, "reminder window already passed");
            return false;
        }
        if !self.inner.active {
            debug!("scheduler disabled; dropping reminder");
            return false;
        }

        let delay = (fire_at - now).to_std().unwrap_or(StdDuration::ZERO);
        let epoch = self.inner.epochs.fetch_add(1, Ordering::Relaxed) + 1;
        let id = task.id;
        let snapshot = task.clone();
        let inner = Arc::clone(&self.inner);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.fire(&snapshot);

            // self-cleanup, but only if our slot was not replaced meanwhile
            let mut timers = inner.timers.lock();
            if timers.get(&id).is_some_and(|slot| slot.epoch == epoch) {
                timers.remove(&id);
            }
        });

        let mut timers = self.inner.timers.lock();
        if let Some(stale) = timers.insert(id, TimerSlot { epoch, handle }) {
            debug!(epoch, "replacing armed reminder");
            stale.handle.abort();
        } else {
            debug!(epoch, delay_ms = delay.as_millis() as u64, "armed reminder");
        }
        true
    }

    /// Aborts and forgets the timer for `id`, if one is armed.
    #[instrument(skip(self))]
    pub fn cancel(&self, id: TaskId) -> bool {
        let Some(slot) = self.inner.timers.lock().remove(&id) else {
            return false;
        };
        slot.handle.abort();
        debug!(id = %id, "cancelled reminder");
        true
    }

    /// Re-arms reminders for every open task; used after bulk replacement.
    #[instrument(skip(self, tasks))]
    pub fn reschedule_all(&self, tasks: &[Task]) -> usize {
        let mut armed = 0;
        for task in tasks {
            if task.completed {
                continue;
            }
            if self.schedule(task) {
                armed += 1;
            }
        }
        debug!(armed, total = tasks.len(), "rescheduled reminders");
        armed
    }

    pub fn pending_count(&self) -> usize {
        self.inner.timers.lock().len()
    }

    pub fn is_active(&self) -> bool {
        self.inner.active
    }
}

impl SchedulerInner {
    /// Delivery gate, evaluated at fire time so settings changes made after
    /// arming still apply. Delivery failures are logged, never raised.
    fn fire(&self, task: &Task) {
        let settings = self.settings.snapshot();
        if !settings.notifications.enabled {
            debug!(id = %task.id, "notifications disabled; dropping reminder");
            return;
        }
        if !self.sink.permission() {
            debug!(id = %task.id, sink = self.sink.name(), "no permission; dropping reminder");
            return;
        }

        let note = ReminderNote::for_task(task);
        if let Err(err) = self.sink.deliver(&note) {
            warn!(id = %task.id, error = %err, "failed to deliver reminder");
            return;
        }
        if settings.notifications.sound
            && let Err(err) = self.sink.play_sound()
        {
            warn!(id = %task.id, error = %err, "failed to play reminder sound");
        }
    }
}

struct NullSink;

impl NotifySink for NullSink {
    fn name(&self) -> &'static str {
        "null"
    }

    fn permission(&self) -> bool {
        false
    }

    fn deliver(&self, _note: &ReminderNote) -> Result<(), NotifyError> {
        Ok(())
    }
}
